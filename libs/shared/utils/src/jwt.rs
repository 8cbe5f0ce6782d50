use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{Claims, CurrentUser, Role};
use shared_models::error::AppError;

pub const EXPIRED_TOKEN_MESSAGE: &str = "Token has expired";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
    MissingSecret,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::InvalidCredential(EXPIRED_TOKEN_MESSAGE.to_string()),
            TokenError::Invalid => AppError::InvalidCredential(INVALID_TOKEN_MESSAGE.to_string()),
            TokenError::MissingSecret => {
                AppError::Internal("JWT secret is not configured".to_string())
            }
        }
    }
}

pub fn issue_token(
    user_id: Uuid,
    email: &str,
    name: &str,
    role: Role,
    secret: &str,
    expires_in: Duration,
) -> Result<String, AppError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret.into());
    }

    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        role,
        iat: now,
        exp: now + expires_in.as_secs() as i64,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

pub fn validate_token(token: &str, secret: &str) -> Result<CurrentUser, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                debug!("Token expired");
                TokenError::Expired
            }
            other => {
                debug!("Token rejected: {:?}", other);
                TokenError::Invalid
            }
        })?;

    let claims = data.claims;
    let id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Invalid)?;

    debug!("Token validated successfully for user: {}", id);
    Ok(CurrentUser {
        id,
        email: claims.email,
        name: claims.name,
        role: claims.role,
    })
}
