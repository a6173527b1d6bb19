use crate::model::{account::AccountId, role::Role};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

/// The caller, as established by `auth_middleware` from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub account_id: AccountId,
    pub email: String,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing token")),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> actix_web::Result<()> {
        self.require(&[Role::Admin])
    }

    pub fn require(&self, roles: &[Role]) -> actix_web::Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden(format!(
                "{} accounts may not do this",
                self.role
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test::TestRequest};

    fn user(role: Role) -> AuthUser {
        AuthUser {
            account_id: 1,
            email: "a@b.io".to_string(),
            role,
        }
    }

    #[test]
    fn admin_guard_rejects_other_roles() {
        assert!(user(Role::Admin).require_admin().is_ok());
        let err = user(Role::Client).require_admin().unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::FORBIDDEN);
        assert!(user(Role::Client).require(&[Role::Admin, Role::Client]).is_ok());
    }

    #[actix_web::test]
    async fn extractor_needs_the_middleware() {
        let req = TestRequest::default().to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());

        req.extensions_mut().insert(user(Role::Employee));
        let extracted = AuthUser::extract(&req).await.unwrap();
        assert_eq!(extracted.role, Role::Employee);
    }
}
