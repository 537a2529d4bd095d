//! Error responses of the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use mediabroker_broker_core::BrokerError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors returned by route handlers, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself is unusable
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// - Bad request / invalid input: 400
    /// - Precondition (e.g. unforced port reset): 409
    /// - Port pool exhausted, gateway session expired: 503
    /// - Everything else: 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Broker(err) if err.is_session_expired() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Broker(BrokerError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            Self::Broker(BrokerError::Precondition { .. }) => StatusCode::CONFLICT,
            Self::Broker(BrokerError::ResourceExhausted { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Broker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn envelope(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Broker(err) => err.envelope(),
            Self::BadRequest(_) => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Broker(err) if err.is_session_expired())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            match self.envelope() {
                Some(envelope) => error!("Request failed: {} (gateway reply: {})", self, envelope),
                None => error!("Request failed: {}", self),
            }
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = if self.is_retryable() {
            json!({"error": self.to_string(), "retry": true})
        } else {
            json!({"error": self.to_string()})
        };
        (status, Json(body)).into_response()
    }
}
