use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;

/// Which audience a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

pub fn issue_token(
    secret: &str,
    subject: Uuid,
    email: &str,
    name: &str,
    kind: TokenKind,
    expiry_hours: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject,
        email: email.to_string(),
        name: name.to_string(),
        kind,
        iat: now.timestamp(),
        exp: (now + Duration::hours(expiry_hours)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("token signing failed: {e}")))
}

/// Verifies signature, expiry and audience. Any failure is `Unauthorized`.
pub fn verify_token(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        debug!("Rejected token: {e}");
        AppError::Unauthorized
    })?;

    if data.claims.kind != expected {
        debug!("Rejected token of type {:?}, expected {:?}", data.claims.kind, expected);
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issue_and_verify() {
        let id = Uuid::new_v4();
        let token = issue_token(SECRET, id, "a@b.com", "Ada", TokenKind::Admin, 1).unwrap();
        let claims = verify_token(SECRET, &token, TokenKind::Admin).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email, "a@b.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "u@b.com", "U", TokenKind::User, 1).unwrap();
        assert!(matches!(
            verify_token(SECRET, &token, TokenKind::Admin),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "u@b.com", "U", TokenKind::User, 1).unwrap();
        assert!(verify_token("other", &token, TokenKind::User).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "u@b.com", "U", TokenKind::User, -2).unwrap();
        assert!(verify_token(SECRET, &token, TokenKind::User).is_err());
    }

    #[test]
    fn test_type_claim_serialized_lowercase() {
        let token = issue_token(SECRET, Uuid::nil(), "u@b.com", "U", TokenKind::Admin, 1).unwrap();
        let claims = verify_token(SECRET, &token, TokenKind::Admin).unwrap();
        assert_eq!(serde_json::to_value(&claims).unwrap()["type"], "admin");
    }
}
