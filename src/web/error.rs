use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors visible to callers of the statistics endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Access denied. Token not provided.")]
    MissingToken,
    #[error("Invalid or expired token.")]
    InvalidToken,
    #[error("Visit statistics are unavailable")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingToken | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(e) = &self {
            tracing::error!("Statistics request failed: {}", e);
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
