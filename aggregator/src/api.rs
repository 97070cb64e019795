use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Queued,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishResponse {
    pub status: PublishStatus,
    pub count: usize,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatsResponse {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicate_dropped: u64,
    pub topics: Vec<String>,
    pub uptime: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("request holds no event")]
    EmptyBatch,
    #[error("request body is too large")]
    PayloadTooLarge,

    #[error("failed to enqueue events, please retry")]
    QueueUnavailable(#[source] QueueError),
    #[error("event store is unavailable")]
    StoreUnavailable(#[source] StoreError),
}

impl From<JsonRejection> for ApiError {
    /// Anything wrong with the body other than its size is an invalid event.
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::InvalidEvent(rejection.body_text())
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        ApiError::QueueUnavailable(error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::StoreUnavailable(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidEvent(_) | ApiError::EmptyBatch => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ApiError::QueueUnavailable(source) => {
                error!("queue error: {source}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::StoreUnavailable(source) => {
                error!("store error: {source}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_unprocessable() {
        assert_eq!(
            ApiError::EmptyBatch.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::InvalidEvent("missing field `topic`".to_owned())
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn dependency_errors_are_server_errors() {
        assert_eq!(
            ApiError::from(QueueError::Unavailable)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn publish_status_is_lowercase() {
        let response = PublishResponse {
            status: PublishStatus::Queued,
            count: 2,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"status": "queued", "count": 2})
        );
    }
}
