//! Bearer credential gate for the statistics endpoints
//!
//! Issuing and validating credentials belongs to the site's auth service;
//! this module only asks a [`TokenVerifier`] whether a bearer is acceptable.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

pub type SharedTokenVerifier = Arc<dyn TokenVerifier>;

/// Accepts exactly one shared token. An empty token accepts nothing.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl TokenVerifier for StaticToken {
    fn verify(&self, token: &str) -> bool {
        if self.token.is_empty() || self.token.len() != token.len() {
            return false;
        }
        // Compare every byte regardless of where the first mismatch is
        self.token
            .bytes()
            .zip(token.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Extractor that succeeds only for an accepted bearer credential
pub struct Authorized;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::MissingToken)?;

        if state.verifier.verify(bearer.token()) {
            Ok(Authorized)
        } else {
            tracing::warn!("Rejected statistics request with invalid token");
            Err(ApiError::InvalidToken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_matches_exactly() {
        let verifier = StaticToken::new("s3cret");
        assert!(verifier.verify("s3cret"));
        assert!(!verifier.verify("s3cre"));
        assert!(!verifier.verify("s3creT"));
        assert!(!verifier.verify(""));
    }

    #[test]
    fn empty_token_rejects_everything() {
        let verifier = StaticToken::new("");
        assert!(!verifier.verify(""));
        assert!(!verifier.verify("anything"));
    }
}
