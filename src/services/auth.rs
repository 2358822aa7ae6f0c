//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the caller's user id.

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Issuer stamped into and required on every access token.
pub const TOKEN_ISSUER: &str = "video-ingest-access";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingToken,
    #[error("authorization header malformed")]
    MalformedHeader,
    #[error("token rejected: {0}")]
    InvalidToken(String),
}

pub trait Authenticator: Send + Sync {
    /// Resolve the caller's user id from the request headers.
    fn validate_bearer_token(&self, headers: &HeaderMap) -> Result<Uuid, AuthError>;
}

pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn validate_bearer_token(&self, headers: &HeaderMap) -> Result<Uuid, AuthError> {
        let token = bearer_token(headers)?;
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AuthError::InvalidToken("subject is not a user id".into()))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Mint an access token; used by tests to drive authenticated requests.
#[cfg(test)]
pub fn issue_token(secret: &str, user_id: Uuid, ttl: chrono::Duration) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iss: TOKEN_ISSUER.into(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_valid_token() {
        let user = Uuid::new_v4();
        let token = issue_token("secret", user, chrono::Duration::minutes(5));
        let auth = JwtAuthenticator::new("secret");
        let got = auth
            .validate_bearer_token(&headers_with(&format!("Bearer {token}")))
            .unwrap();
        assert_eq!(got, user);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_token("secret", Uuid::new_v4(), chrono::Duration::minutes(5));
        let auth = JwtAuthenticator::new("other-secret");
        assert!(matches!(
            auth.validate_bearer_token(&headers_with(&format!("Bearer {token}"))),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue_token("secret", Uuid::new_v4(), chrono::Duration::hours(-2));
        let auth = JwtAuthenticator::new("secret");
        assert!(auth
            .validate_bearer_token(&headers_with(&format!("Bearer {token}")))
            .is_err());
    }

    #[test]
    fn header_shape_is_checked() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingToken)));
        assert!(matches!(
            bearer_token(&headers_with("Basic abc")),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer")),
            Err(AuthError::MalformedHeader)
        ));
        assert_eq!(bearer_token(&headers_with("bearer  abc.def ")).unwrap(), "abc.def");
    }
}
