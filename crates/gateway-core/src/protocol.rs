//! Gateway control protocol: request envelopes, paths and reply decoding
//!
//! Requests are JSON envelopes of the form
//! `{"janus": <command>, "transaction": <id>, ...}` POSTed to
//! `/janus`, `/janus/{session}` or `/janus/{session}/{handle}`.
//! Replies are decoded here into either a [`Reply`] or a typed
//! [`GatewayError`]; nothing past this module looks at the `janus` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{GatewayError, Result};
use crate::transaction::TransactionId;

/// Error code the gateway uses for "no such session"
pub const SESSION_NOT_FOUND: i64 = 458;

/// Gateway-assigned session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

/// Gateway-assigned plugin handle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPath {
    Root,
    Session(SessionId),
    Handle(SessionId, HandleId),
}

impl GatewayPath {
    /// URL path relative to the gateway base URL
    pub fn to_path(&self) -> String {
        match self {
            GatewayPath::Root => "/janus".to_string(),
            GatewayPath::Session(session) => format!("/janus/{}", session),
            GatewayPath::Handle(session, handle) => format!("/janus/{}/{}", session, handle),
        }
    }
}

/// Control-plane commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Create,
    Attach,
    Message,
    Keepalive,
    Destroy,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Attach => "attach",
            Command::Message => "message",
            Command::Keepalive => "keepalive",
            Command::Destroy => "destroy",
        }
    }
}

/// Outbound request envelope
#[derive(Debug, Clone, Serialize)]
pub struct GatewayRequest {
    pub janus: Command,
    pub transaction: TransactionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl GatewayRequest {
    fn new(janus: Command) -> Self {
        Self {
            janus,
            transaction: TransactionId::new(),
            plugin: None,
            body: None,
        }
    }

    pub fn create() -> Self {
        Self::new(Command::Create)
    }

    pub fn attach(plugin: impl Into<String>) -> Self {
        Self {
            plugin: Some(plugin.into()),
            ..Self::new(Command::Attach)
        }
    }

    pub fn message(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Command::Message)
        }
    }

    pub fn keepalive() -> Self {
        Self::new(Command::Keepalive)
    }

    pub fn destroy() -> Self {
        Self::new(Command::Destroy)
    }
}

/// Plugin-scoped payload of a message reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    janus: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    plugindata: Option<PluginData>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: i64,
    #[serde(default)]
    reason: String,
}

/// Kind of non-error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Success,
    Ack,
}

/// Decoded non-error reply
#[derive(Debug, Clone)]
pub struct Reply {
    pub kind: ReplyKind,
    pub data: Option<Value>,
    pub plugindata: Option<PluginData>,
    envelope: Value,
}

impl Reply {
    /// Raw envelope, kept for diagnostics
    pub fn envelope(&self) -> &Value {
        &self.envelope
    }

    /// `data.id` of a create/attach reply
    pub fn created_id(&self) -> Result<u64> {
        self.data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                GatewayError::protocol(None, "reply carries no data.id", self.envelope.clone())
            })
    }

    /// Plugin payload of a message reply
    pub fn into_plugin_data(self) -> Result<PluginData> {
        match self.plugindata {
            Some(plugindata) => Ok(plugindata),
            None => Err(GatewayError::protocol(
                None,
                "reply carries no plugindata",
                self.envelope,
            )),
        }
    }
}

/// Decode a raw gateway reply into a [`Reply`] or a typed error.
///
/// `error` envelopes with code [`SESSION_NOT_FOUND`] become
/// [`GatewayError::SessionExpired`]; every other error code, and any
/// envelope that is neither `success` nor `ack`, becomes
/// [`GatewayError::Protocol`].
pub fn decode_reply(envelope: Value) -> Result<Reply> {
    let raw: RawEnvelope = match serde_json::from_value(envelope.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            return Err(GatewayError::protocol(
                None,
                format!("malformed envelope: {}", e),
                envelope,
            ))
        }
    };

    match raw.janus.as_str() {
        "success" => Ok(Reply {
            kind: ReplyKind::Success,
            data: raw.data,
            plugindata: raw.plugindata,
            envelope,
        }),
        "ack" => Ok(Reply {
            kind: ReplyKind::Ack,
            data: raw.data,
            plugindata: raw.plugindata,
            envelope,
        }),
        "error" => match raw.error {
            Some(error) if error.code == SESSION_NOT_FOUND => {
                Err(GatewayError::SessionExpired { envelope })
            }
            Some(error) => Err(GatewayError::protocol(Some(error.code), error.reason, envelope)),
            None => Err(GatewayError::protocol(None, "error reply without details", envelope)),
        },
        other => Err(GatewayError::protocol(
            None,
            format!("unexpected reply type '{}'", other),
            envelope,
        )),
    }
}
