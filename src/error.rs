use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::analysis::{AnalysisError, ValidationError};
use crate::store::StoreError;

/// Failure of an API call. Analysis outcomes such as `blocked` are not
/// errors and never pass through here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Infrastructure(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                json!({ "kind": "validation_error", "reason": reason }),
            ),
            ApiError::NotFound(reason) => (
                StatusCode::NOT_FOUND,
                json!({ "kind": "not_found", "reason": reason }),
            ),
            ApiError::Infrastructure(detail) => {
                error!(%detail, "request failed on infrastructure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "kind": "infra_error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserNotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::Database(_) => ApiError::Infrastructure(e.to_string()),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Validation(v @ ValidationError::UnknownUser(_)) => {
                ApiError::NotFound(v.to_string())
            }
            AnalysisError::Validation(v) => ApiError::Validation(v.to_string()),
            AnalysisError::Infrastructure(detail) => ApiError::Infrastructure(detail),
        }
    }
}
