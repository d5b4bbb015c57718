/// HTTP error mapping
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::core::AddressError;
use crate::metrics::AnalyticsError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::UnknownSlug(slug) => ApiError::NotFound(format!("unknown metric '{}'", slug)),
            AnalyticsError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(msg) => {
                error!("❌ Request failed: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
