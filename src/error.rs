use std::fmt::Display;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    background::RemovalError, editor::EditError, imagepig::VendorError, upload::UploadError,
};

/// Error returned by every route handler. Rendered as `{"error": ...}` with the
/// status code of its class.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>, err: impl Display) -> Self {
        Self::Internal {
            message: message.into(),
            details: Some(err.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = ?self, "request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "request rejected");
        }
        let details = match &self {
            Self::Internal { details, .. } => details.clone(),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            UploadError::Io(io) => Self::internal("Failed to store uploaded file", io),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<RemovalError> for ApiError {
    fn from(err: RemovalError) -> Self {
        Self::Internal {
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<VendorError> for ApiError {
    fn from(err: VendorError) -> Self {
        match err {
            VendorError::MissingApiKey => {
                tracing::error!(error = %err, "vendor request not sent");
                Self::Internal {
                    message: "Internal Server Error".to_string(),
                    details: None,
                }
            }
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<EditError> for ApiError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::InvalidSettings(_) | EditError::InvalidSource(_) | EditError::Decode(_) => {
                Self::BadRequest(err.to_string())
            }
            EditError::SourceNotFound(_) => Self::BadRequest(err.to_string()),
            EditError::Fetch(_) | EditError::Encode(_) => Self::Internal {
                message: err.to_string(),
                details: None,
            },
        }
    }
}
