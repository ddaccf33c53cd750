use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::{ImageError, InferenceError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid multipart request: {0}")]
    Multipart(String),

    #[error("No file provided")]
    MissingFile,

    #[error(transparent)]
    InvalidImage(#[from] ImageError),

    #[error("Prediction failed: {0}")]
    Inference(InferenceError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub status_code: u16,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidImage(ImageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Multipart(_) | ApiError::MissingFile | ApiError::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Inference(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used as the `outcome` metric attribute.
    pub fn outcome(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "rejected"
        } else {
            "error"
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Image(image_err) => ApiError::InvalidImage(image_err),
            other => ApiError::Inference(other),
        }
    }
}

impl ApiError {
    /// Classify a multipart failure; body limit hits become 413.
    pub fn from_multipart(err: MultipartError, max_file_size: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::InvalidImage(ImageError::TooLarge {
                size: max_file_size + 1,
                max: max_file_size,
            });
        }
        ApiError::Multipart(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
