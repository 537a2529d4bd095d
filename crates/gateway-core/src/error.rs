//! Error types for the gateway control-plane client
//!
//! Every reply coming back from the gateway is decoded into one of these
//! variants at the protocol boundary. Raw envelopes only travel further as
//! diagnostic payload.

use serde_json::Value;
use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while talking to the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached, or answered with something that is not an envelope
    #[error("Gateway transport error: {message}")]
    Transport { message: String },

    /// Non-success envelope with a code other than session expiry
    #[error("Gateway protocol error{}: {reason}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
    Protocol {
        code: Option<i64>,
        reason: String,
        envelope: Value,
    },

    /// The gateway no longer knows the session (code 458); retry the whole operation
    #[error("Gateway session expired, please retry")]
    SessionExpired { envelope: Value },

    /// Operation invoked before the required session/handle state was reached
    #[error("Precondition failed: {message}")]
    Precondition { message: String },
}

impl GatewayError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error carrying the offending envelope
    pub fn protocol(code: Option<i64>, reason: impl Into<String>, envelope: Value) -> Self {
        Self::Protocol {
            code,
            reason: reason.into(),
            envelope,
        }
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// Raw envelope attached to the error, if the gateway produced one
    pub fn envelope(&self) -> Option<&Value> {
        match self {
            Self::Protocol { envelope, .. } | Self::SessionExpired { envelope } => Some(envelope),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport(format!("request timed out: {}", err))
        } else {
            Self::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_error_display_includes_code() {
        let err = GatewayError::protocol(Some(456), "Missing mandatory element", json!({}));
        assert_eq!(
            err.to_string(),
            "Gateway protocol error 456: Missing mandatory element"
        );

        let err = GatewayError::protocol(None, "unexpected reply", json!({}));
        assert_eq!(err.to_string(), "Gateway protocol error: unexpected reply");
    }

    #[test]
    fn test_envelope_accessor() {
        let envelope = json!({"janus": "error", "error": {"code": 458}});
        let err = GatewayError::SessionExpired {
            envelope: envelope.clone(),
        };
        assert!(err.is_session_expired());
        assert_eq!(err.envelope(), Some(&envelope));
        assert!(GatewayError::precondition("no handle").envelope().is_none());
    }
}
