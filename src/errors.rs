use crate::services::{
    auth::AuthError, thumbnail_ingestor::ThumbnailError, upload_pipeline::PipelineError,
    video_store::StoreError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
///
/// `message` is what the client sees; dependency failures are logged where
/// they are converted and replaced by a generic message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// 401 with no detail beyond the word itself.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn payload_too_large(limit: u64) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("upload exceeds the {} byte limit", limit),
        )
    }

    /// Log `err` server-side and return a 500 carrying only `public`.
    pub fn dependency(public: &str, err: &dyn std::error::Error) -> Self {
        tracing::error!(error = %err, "{}", public);
        Self::internal(public)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "unhandled error");
        AppError::internal("internal server error")
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        tracing::debug!(error = %err, "rejected credentials");
        AppError::unauthorized()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::not_found("video not found"),
            StoreError::Sqlx(ref inner) => AppError::dependency("database error", inner),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnsupportedMediaType(_) => {
                AppError::bad_request("invalid media type for video")
            }
            PipelineError::TooLarge { limit } => AppError::payload_too_large(limit),
            PipelineError::Body(ref inner) => {
                tracing::debug!(error = %inner, "upload body aborted");
                AppError::bad_request("unable to read upload body")
            }
            PipelineError::Staging(_) => AppError::dependency("error staging upload", &err),
            PipelineError::Probe(_) => AppError::dependency("error determining aspect ratio", &err),
            PipelineError::Remux(_) => AppError::dependency("error processing video", &err),
            PipelineError::Upload(_) => AppError::dependency("error uploading video", &err),
        }
    }
}

impl From<ThumbnailError> for AppError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::UnsupportedMediaType(_) => {
                AppError::bad_request("invalid media type for thumbnail")
            }
            ThumbnailError::Storage(ref inner) => {
                AppError::dependency("error storing thumbnail", inner)
            }
            ThumbnailError::Record(inner) => inner.into(),
        }
    }
}
