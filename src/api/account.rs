use crate::{
    auth::auth::AuthUser,
    model::{
        account::{Account, AccountStatus},
        role::Role,
    },
    service::{Services, identity::Registration},
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
pub struct AccountFilter {
    #[param(value_type = Option<String>, example = "client")]
    pub role: Option<Role>,
    #[param(value_type = Option<String>, example = "pending")]
    pub status: Option<AccountStatus>,
}

/// Create an account of any role, active immediately
#[utoipa::path(
    post,
    path = "/api/accounts",
    request_body = Registration,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn create_account(
    auth: AuthUser,
    services: web::Data<Services>,
    body: web::Json<Registration>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let account = services
        .identity
        .register(body.into_inner(), Some(auth.role))
        .await?;
    Ok(HttpResponse::Created().json(account))
}

#[utoipa::path(
    get,
    path = "/api/accounts",
    params(AccountFilter),
    responses(
        (status = 200, description = "Accounts", body = [Account]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn list_accounts(
    auth: AuthUser,
    services: web::Data<Services>,
    query: web::Query<AccountFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let accounts = services.identity.list(query.role, query.status).await?;
    Ok(HttpResponse::Ok().json(accounts))
}

#[utoipa::path(
    get,
    path = "/api/accounts/{id}",
    params(("id" = u64, Path, description = "Account id")),
    responses(
        (status = 200, description = "The account", body = Account),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_account(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let account = services.identity.account(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}

#[utoipa::path(
    put,
    path = "/api/accounts/{id}/approve",
    params(("id" = u64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Client approved and notified", body = Account),
        (status = 409, description = "Account is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn approve_account(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let account = services
        .identity
        .approve(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(account))
}

#[utoipa::path(
    put,
    path = "/api/accounts/{id}/reject",
    params(("id" = u64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Registration rejected", body = Account),
        (status = 409, description = "Account is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn reject_account(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let account = services
        .identity
        .reject(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(account))
}

#[utoipa::path(
    put,
    path = "/api/accounts/{id}/deactivate",
    params(("id" = u64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account deactivated", body = Account),
        (status = 400, description = "Cannot deactivate yourself")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn deactivate_account(
    auth: AuthUser,
    services: web::Data<Services>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let account = services
        .identity
        .deactivate(path.into_inner(), auth.account_id)
        .await?;
    Ok(HttpResponse::Ok().json(account))
}
