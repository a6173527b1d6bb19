use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Public sign-up. Always creates a client account awaiting approval.
#[derive(Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Acme Ltd",
    "email": "ops@acme.io",
    "password": "s3cret-pass"
}))]
pub struct SignupReq {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({
    "email": "jane@officesphere.io",
    "password": "s3cret-pass"
}))]
pub struct LoginReqDto {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub account_id: u64,
    /// Email address of the account
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
