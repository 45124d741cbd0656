use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub fn create_access_token(
    username: &str,
    secret: &Secret<String>,
    expire_minutes: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: username.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(expire_minutes)).timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )?)
}

pub fn decode_access_token(token: &str, secret: &Secret<String>) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let secret = Secret::new("test-secret".to_string());
        let token = create_access_token("alice", &secret, 60).unwrap();
        let claims = decode_access_token(&token, &secret).unwrap();
        assert_eq!(claims.sub, "alice");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = Secret::new("test-secret".to_string());
        let token = create_access_token("alice", &secret, 60).unwrap();
        let other = Secret::new("other-secret".to_string());
        assert!(decode_access_token(&token, &other).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = Secret::new("test-secret".to_string());
        let token = create_access_token("alice", &secret, -5).unwrap();
        assert!(decode_access_token(&token, &secret).is_err());
    }
}
