//! Error types for the broker

use mediabroker_gateway_core::GatewayError;
use serde_json::Value;
use thiserror::Error;

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors surfaced by domain services, port allocation and orchestration
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Gateway failure that is not tied to a specific domain request
    /// (transport, session expiry, handle preconditions)
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The gateway rejected a domain request; `envelope` is the raw reply
    #[error("{operation} failed: {reason}")]
    OperationFailed {
        operation: &'static str,
        reason: String,
        envelope: Value,
    },

    /// The port pool is full
    #[error("Port pool exhausted: all {capacity} port pairs are allocated")]
    ResourceExhausted { capacity: u32 },

    /// Operation invoked in a state that does not allow it
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// Caller supplied an unusable value
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// An ingest/egress endpoint collaborator failed
    #[error("Endpoint error: {message}")]
    Endpoint { message: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl BrokerError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn endpoint(message: impl Into<String>) -> Self {
        Self::Endpoint {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a gateway error raised while running `operation`.
    ///
    /// Protocol rejections become [`BrokerError::OperationFailed`]; everything
    /// else (notably session expiry, which callers retry on) stays a
    /// [`BrokerError::Gateway`].
    pub fn from_gateway(operation: &'static str, err: GatewayError) -> Self {
        match err {
            GatewayError::Protocol {
                reason, envelope, ..
            } => Self::OperationFailed {
                operation,
                reason,
                envelope,
            },
            other => Self::Gateway(other),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Gateway(err) if err.is_session_expired())
    }

    /// Raw gateway envelope kept for diagnostics
    pub fn envelope(&self) -> Option<&Value> {
        match self {
            Self::OperationFailed { envelope, .. } => Some(envelope),
            Self::Gateway(err) => err.envelope(),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for BrokerError {
    fn from(err: config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}
