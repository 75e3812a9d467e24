//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lumen_core::Error as CoreError;
use lumen_eye::VisionError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self);
        }
        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownRoom(_) => ApiError::NotFound("Room not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::SourceUnavailable(_) => {
                ApiError::BadGateway("Could not connect to camera".to_string())
            }
            VisionError::ShutdownTimeout { .. } => {
                ApiError::ServiceUnavailable("Camera is still shutting down".to_string())
            }
            VisionError::Core(core) => core.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Background task failed: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: ApiError = CoreError::UnknownRoom("Attic".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let gateway: ApiError = VisionError::SourceUnavailable("rtsp".to_string()).into();
        assert_eq!(gateway.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(gateway.to_string(), "Could not connect to camera");

        let nested: ApiError = VisionError::Core(CoreError::UnknownRoom("x".to_string())).into();
        assert_eq!(nested.status(), StatusCode::NOT_FOUND);

        let busy: ApiError = VisionError::ShutdownTimeout {
            room_id: "Lab".to_string(),
            timeout: std::time::Duration::from_millis(100),
        }
        .into();
        assert_eq!(busy.status(), StatusCode::SERVICE_UNAVAILABLE);

        let internal: ApiError = VisionError::Detector("boom".to_string()).into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
