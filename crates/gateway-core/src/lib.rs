//! # Gateway-Core
//!
//! Control-plane client for Janus-style media gateways.
//!
//! This crate provides:
//! - The request/reply envelope and its decoding into typed errors
//! - [`TransactionId`] generation for the envelope
//! - [`GatewayTransport`], with an HTTP implementation on `reqwest`
//! - [`SessionManager`]: session create, keepalive, expiry and destroy
//! - [`PluginHandle`]: plugin attach with bounded expiry recovery, and
//!   plugin messages
//!
//! ## Architecture
//!
//! ```text
//! PluginHandle ──ensure_active──> SessionManager ──┐
//!      │                              (keepalive)  │
//!      └──────────── send ──────> GatewayTransport <┘
//! ```
//!
//! One `SessionManager` and one `PluginHandle` are expected per gateway
//! service; higher layers construct them once and inject them.

pub mod error;
pub mod handle;
pub mod protocol;
pub mod session;
pub mod transaction;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{GatewayError, Result};
pub use handle::{HandleInfo, HandleState, PluginHandle, DEFAULT_MAX_ATTACH_RETRIES};
pub use protocol::{
    decode_reply, Command, GatewayPath, GatewayRequest, HandleId, PluginData, Reply, ReplyKind,
    SessionId, SESSION_NOT_FOUND,
};
pub use session::{SessionInfo, SessionManager, SessionState, DEFAULT_KEEPALIVE_INTERVAL};
pub use transaction::TransactionId;
pub use transport::{GatewayTransport, HttpTransport, TransportConfig};

/// Plugin serving multi-party rooms
pub const VIDEOROOM_PLUGIN: &str = "janus.plugin.videoroom";

/// Plugin serving RTP mountpoints
pub const STREAMING_PLUGIN: &str = "janus.plugin.streaming";
