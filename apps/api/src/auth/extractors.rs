use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::tokens::{verify_token, Claims, TokenKind};
use crate::errors::AppError;
use crate::state::AppState;

/// Claims of a verified admin bearer token.
#[derive(Debug, Clone)]
pub struct AdminClaims(pub Claims);

/// Claims of a verified expert (user) bearer token.
#[derive(Debug, Clone)]
pub struct UserClaims(pub Claims);

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn claims_from_parts(parts: &Parts, state: &AppState, kind: TokenKind) -> Result<Claims, AppError> {
    let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
    verify_token(&state.config.jwt_secret, token, kind)
}

#[async_trait]
impl FromRequestParts<AppState> for AdminClaims {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        claims_from_parts(parts, state, TokenKind::Admin).map(AdminClaims)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for UserClaims {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        claims_from_parts(parts, state, TokenKind::User).map(UserClaims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts(Some("bearer   xyz "))), Some("xyz"));
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }
}
