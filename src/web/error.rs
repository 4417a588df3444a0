//! Error responses for the HTTP layer

use crate::error::BgRemovalError;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failures of the HTML routes, rendered as plain text
#[derive(Error, Debug)]
pub enum WebError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Uploaded data exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("Not Found")]
    NotFound,
    #[error("Error processing image: {0}")]
    Processing(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WebError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a multipart read failure, keeping the body limit as 413
    pub fn from_multipart(err: &MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(limit)
        } else {
            Self::BadRequest(format!("Malformed upload: {}", err.body_text()))
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Processing(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BgRemovalError> for WebError {
    fn from(err: BgRemovalError) -> Self {
        Self::Processing(err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Failure of a JSON route, rendered as `{"error": message}`
#[derive(Error, Debug)]
#[error("{message}")]
pub struct JsonError {
    pub status: StatusCode,
    pub message: String,
}

impl JsonError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<WebError> for JsonError {
    fn from(err: WebError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl From<BgRemovalError> for JsonError {
    fn from(err: BgRemovalError) -> Self {
        Self::internal(err.to_string())
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "JSON request failed");
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}
