//! HTTP error responses

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::session::SendError;

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotReady(String),

    #[error("{0}")]
    Validation(String),

    #[error("failed to deliver message")]
    ExternalFailure,

    #[error("{0}")]
    Internal(String),
}

/// Error body: `{"error": ..., "code": ...}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotReady(_) => "not_ready",
            Self::Validation(_) => "validation_error",
            Self::ExternalFailure => "external_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ExternalFailure | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::NotConnected => Self::NotReady("session is not connected".to_string()),
            SendError::InvalidAddress(to) => {
                Self::Validation(format!("destination {:?} has no digits", to))
            }
            SendError::Client(e) => {
                // Cause stays server-side
                tracing::error!("Message forwarding failed: {}", e);
                Self::ExternalFailure
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry = matches!(self, Self::NotReady(_));
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        let mut response = (status, Json(body)).into_response();
        if retry {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("3"));
        }
        response
    }
}
