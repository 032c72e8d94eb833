use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use bloom_db::StoreError;

/// API failure taxonomy. Each variant maps 1:1 to a status code; the detail
/// string becomes the JSON `detail` field. Internal errors are logged and
/// never leak their cause to the caller.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Gone(String),
    ServiceUnavailable(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, detail),
            Self::Forbidden(detail) => (StatusCode::FORBIDDEN, detail),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            Self::Conflict(detail) => (StatusCode::CONFLICT, detail),
            Self::Gone(detail) => (StatusCode::GONE, detail),
            Self::ServiceUnavailable(detail) => (StatusCode::SERVICE_UNAVAILABLE, detail),
            Self::BadGateway(detail) => (StatusCode::BAD_GATEWAY, detail),
            Self::Internal(err) => {
                error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::FlowerNotFound => Self::NotFound(err.to_string()),
            StoreError::FlowerAlreadySent
            | StoreError::DeliveryExists
            | StoreError::AlreadyWateredToday
            | StoreError::FlowerNotReady => Self::Conflict(err.to_string()),
            StoreError::GiftNotFound => Self::NotFound(err.to_string()),
            StoreError::GiftRevoked | StoreError::GiftExpired => Self::Gone(err.to_string()),
            StoreError::GiftNotYetAvailable => Self::Forbidden(err.to_string()),
            StoreError::LockPoisoned | StoreError::Sqlite(_) => {
                Self::Internal(anyhow::Error::new(err))
            }
        }
    }
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> ApiError {
    ApiError::Internal(anyhow::anyhow!("blocking task failed: {err}"))
}
