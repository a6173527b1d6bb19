use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::store::StoreError;

/// Malformed or missing input. Never worth retrying unchanged.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[display(fmt = "at least one participant is required")]
    EmptyParticipants,
    #[display(fmt = "meeting start must be before its end")]
    InvalidWindow,
    #[display(fmt = "{}", _0)]
    Invalid(String),
}

/// The entity exists but is in the wrong state for the requested change.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ConflictError {
    #[display(fmt = "already checked in today")]
    AlreadyCheckedIn,
    #[display(fmt = "attendance already marked for this day")]
    AlreadyMarked,
    #[display(fmt = "already checked out today")]
    AlreadyCheckedOut,
    #[display(fmt = "no check-in found for today")]
    NoCheckInFound,
    #[display(fmt = "a pending leave request already exists for these dates")]
    OverlappingLeaveRequest,
    #[display(fmt = "no pending correction request found")]
    NoPendingCorrection,
    #[display(fmt = "no pending leave request found")]
    NoPendingLeave,
    #[display(fmt = "meeting is already cancelled or completed")]
    MeetingClosed,
    #[display(fmt = "email is already registered")]
    EmailTaken,
    #[display(fmt = "account is not awaiting approval")]
    AccountNotPending,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedError {
    #[display(fmt = "only the organizer or an admin may change this meeting")]
    NotOrganizer,
    #[display(fmt = "account is not a participant in this meeting")]
    NotAParticipant,
    #[display(fmt = "role is not allowed to perform this action")]
    RoleNotAllowed,
    #[display(fmt = "account is not active")]
    InactiveAccount,
    #[display(fmt = "invalid credentials")]
    InvalidCredentials,
}

#[derive(Debug, Display)]
pub enum ServiceError {
    #[display(fmt = "{}", _0)]
    Validation(ValidationError),
    #[display(fmt = "{} {} not found", entity, id)]
    NotFound { entity: &'static str, id: u64 },
    #[display(fmt = "{}", _0)]
    Conflict(ConflictError),
    #[display(fmt = "could not resolve participants {:?}", _0)]
    UnresolvedParticipant(Vec<u64>),
    #[display(fmt = "{}", _0)]
    Unauthorized(UnauthorizedError),
    #[display(fmt = "{}", _0)]
    Store(StoreError),
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        ServiceError::NotFound { entity, id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::Validation(ValidationError::Invalid(message.into()))
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Validation(e)
    }
}

impl From<ConflictError> for ServiceError {
    fn from(e: ConflictError) -> Self {
        ServiceError::Conflict(e)
    }
}

impl From<UnauthorizedError> for ServiceError {
    fn from(e: UnauthorizedError) -> Self {
        ServiceError::Unauthorized(e)
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::UnresolvedParticipant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Unauthorized(UnauthorizedError::InvalidCredentials) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ServiceError::UnresolvedParticipant(ids) => json!({
                "message": self.to_string(),
                "unresolved": ids,
            }),
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                json!({ "message": "Internal Server Error" })
            }
            _ => json!({ "message": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409_and_validation_to_400() {
        assert_eq!(
            ServiceError::from(ConflictError::AlreadyCheckedIn).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::from(ValidationError::InvalidWindow).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::from(UnauthorizedError::NotOrganizer).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn storage_details_are_logged_but_not_returned() {
        let err = ServiceError::Store(StoreError::Backend(anyhow::anyhow!("socket closed")));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("socket closed"));

        let body = actix_web::body::to_bytes(err.error_response().into_body())
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "message": "Internal Server Error" }));
    }
}
