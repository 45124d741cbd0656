//! Extractor for authenticated API users. Accepts the `access_token`
//! cookie set by login, or a bearer `Authorization` header.

use crate::startup::AppState;
use crate::utils::jwt::decode_access_token;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use service_core::error::AppError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == ACCESS_TOKEN_COOKIE).then(|| value.to_string())
    })
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_token(parts)
            .or_else(|| bearer_token(parts))
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("not authenticated")))?;

        let claims = decode_access_token(&token, &state.config.auth.secret_key)?;
        Ok(AuthUser {
            username: claims.sub,
        })
    }
}
