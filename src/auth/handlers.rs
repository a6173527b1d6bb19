use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        revocation::RevocationList,
    },
    config::Config,
    model::{account::Account, role::Role},
    models::{Claims, LoginReqDto, SignupReq, TokenResponse, TokenType},
    service::{Services, identity::Registration},
};
use actix_web::{HttpRequest, HttpResponse, Responder, error::ErrorUnauthorized, get, web};
use serde_json::json;
use tracing::{debug, error, info, instrument};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn issue_tokens(account: &Account, config: &Config) -> actix_web::Result<TokenResponse> {
    let signed = generate_access_token(account, &config.jwt_secret, config.access_token_ttl)
        .and_then(|access| {
            generate_refresh_token(account, &config.jwt_secret, config.refresh_token_ttl)
                .map(|(refresh, _)| (access, refresh))
        });

    match signed {
        Ok((access_token, refresh_token)) => Ok(TokenResponse {
            access_token,
            refresh_token,
        }),
        Err(e) => {
            error!(error = %e, account_id = account.id, "Failed to sign tokens");
            Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ))
        }
    }
}

/// Verifies a refresh token that has not been revoked yet.
async fn refresh_claims(
    req: &HttpRequest,
    config: &Config,
    revocations: &RevocationList,
) -> Option<Claims> {
    let claims = verify_token(bearer(req)?, &config.jwt_secret).ok()?;
    if claims.token_type != TokenType::Refresh || revocations.is_revoked(&claims.jti).await {
        return None;
    }
    Some(claims)
}

/// Client self-registration
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = SignupReq,
    responses(
        (status = 201, description = "Registered, waiting for admin approval", body = Account),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(services, user), fields(email = %user.email))]
pub async fn register(
    user: web::Json<SignupReq>,
    services: web::Data<Services>,
) -> actix_web::Result<impl Responder> {
    let user = user.into_inner();
    let account = services
        .identity
        .register(
            Registration {
                name: user.name,
                email: user.email,
                password: user.password,
                role: Role::Client,
            },
            None,
        )
        .await?;

    info!(account_id = account.id, "Client registered, pending approval");
    Ok(HttpResponse::Created().json(json!({
        "message": "Registration received. An administrator will review your account.",
        "account": account,
    })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account not active")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(services, config, user), fields(email = %user.email))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    services: web::Data<Services>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Email and password are required"
        })));
    }

    let account = services
        .identity
        .authenticate(&user.email, &user.password)
        .await?;
    debug!(account_id = account.id, "Credentials verified");

    let tokens = issue_tokens(&account, &config)?;
    info!(account_id = account.id, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotates a refresh token. The presented token is revoked.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    services: web::Data<Services>,
    config: web::Data<Config>,
    revocations: web::Data<RevocationList>,
) -> actix_web::Result<impl Responder> {
    let claims = refresh_claims(&req, &config, &revocations)
        .await
        .ok_or_else(|| ErrorUnauthorized("Invalid refresh token"))?;

    // the account may have been deactivated since the token was issued
    let account = services
        .identity
        .account(claims.account_id)
        .await
        .map_err(|_| ErrorUnauthorized("Invalid refresh token"))?;
    if !account.is_active() {
        return Err(ErrorUnauthorized("Account is not active"));
    }

    revocations.revoke(&claims.jti).await;
    Ok(HttpResponse::Ok().json(issue_tokens(&account, &config)?))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    config: web::Data<Config>,
    revocations: web::Data<RevocationList>,
) -> impl Responder {
    if let Some(claims) = refresh_claims(&req, &config, &revocations).await {
        revocations.revoke(&claims.jti).await;
        info!(account_id = claims.account_id, "Refresh token revoked");
    }
    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The signed-in account", body = Account),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[get("/me")]
pub async fn me(auth: AuthUser, services: web::Data<Services>) -> actix_web::Result<impl Responder> {
    let account = services.identity.account(auth.account_id).await?;
    Ok(HttpResponse::Ok().json(account))
}
