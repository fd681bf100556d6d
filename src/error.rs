//! Error types for the gateway.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use crate::handlers::USER_ID_HEADER;
use crate::models::MessageBody;

/// Rejections produced by the message pipeline.
///
/// `Display` is the text sent to the caller, so variants never carry
/// internal detail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("must provide header {}", USER_ID_HEADER)]
    MissingIdentity,

    #[error("{} header must contain a valid utf-8 value", USER_ID_HEADER)]
    InvalidIdentity,

    #[error("quota for user exceeded")]
    QuotaExceeded,

    #[error("error fetching message, try again later")]
    Upstream,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MissingIdentity => StatusCode::UNAUTHORIZED,
            ApiError::InvalidIdentity => StatusCode::BAD_REQUEST,
            ApiError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_response(self.status(), &MessageBody::new(self.to_string()))
    }
}

/// Render `body` as JSON under `status`.
///
/// If encoding fails the failure is logged and the status goes out without a body.
pub fn json_response(status: StatusCode, body: &MessageBody) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "error encoding response");
            status.into_response()
        }
    }
}

/// Failures talking to the message provider.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream answered with status {0}")]
    Status(u16),

    #[error("error decoding response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

/// Process-level errors; these are the only ones allowed to stop the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
