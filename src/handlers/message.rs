use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::USER_ID_HEADER;
use crate::error::{ApiError, UpstreamError, json_response};
use crate::metrics::{REQUEST_TOTAL, RESPONSES};
use crate::models::MessageBody;
use crate::state::AppState;

/// Single pass through the admission pipeline.
///
/// Every step either rejects and stops or hands over to the next one:
/// method, identity present, identity is utf-8, limiter admits, provider
/// answers in time. Only the limiter step mutates shared state.
pub async fn handle_message(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
) -> Result<String, ApiError> {
    if *method != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }

    let raw = match headers.get(USER_ID_HEADER) {
        Some(value) if !value.is_empty() => value.as_bytes(),
        _ => return Err(ApiError::MissingIdentity),
    };

    let identity = std::str::from_utf8(raw).map_err(|_| ApiError::InvalidIdentity)?;

    if !state.limiter.allow_request_from(identity) {
        debug!(identity, "request rejected by limiter");
        return Err(ApiError::QuotaExceeded);
    }

    // the token stays consumed even if the caller goes away from here on
    let fetched = tokio::time::timeout(
        state.upstream_timeout,
        state.provider.get_message_for(identity),
    )
    .await
    .unwrap_or(Err(UpstreamError::Timeout(state.upstream_timeout)));

    match fetched {
        Ok(upstream) => Ok(upstream.message),
        Err(e) => {
            error!(identity, error = %e, "error getting message");
            Err(ApiError::Upstream)
        }
    }
}

// GET /message
pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    REQUEST_TOTAL.inc();

    // past the drain period the pipeline is dropped mid-flight
    let outcome = tokio::select! {
        outcome = handle_message(&state, &method, &headers) => outcome,
        _ = state.hard_stopped() => {
            warn!("request cut off by shutdown");
            Err(ApiError::Upstream)
        }
    };

    let response = match outcome {
        Ok(message) => json_response(StatusCode::OK, &MessageBody::new(message)),
        Err(rejection) => rejection.into_response(),
    };

    RESPONSES
        .with_label_values(&[response.status().as_str()])
        .inc();
    response
}
