//! Plugin handles attached to a gateway session
//!
//! Expiry is handled asymmetrically on purpose:
//! - during [`PluginHandle::attach`] the session is recreated and the attach
//!   retried, bounded by `max_attach_retries`;
//! - during [`PluginHandle::send_message`] the caller gets
//!   [`GatewayError::SessionExpired`] and must retry the whole domain
//!   operation, since replaying a message could duplicate its side effects.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::protocol::{
    decode_reply, GatewayPath, GatewayRequest, HandleId, PluginData, SessionId, SESSION_NOT_FOUND,
};
use crate::session::SessionManager;
use crate::transport::GatewayTransport;

/// Default number of re-attach attempts after a session expiry
pub const DEFAULT_MAX_ATTACH_RETRIES: u32 = 1;

/// Handle attachment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandleState {
    Detached,
    Attached,
}

/// Snapshot of a plugin handle
#[derive(Debug, Clone, Serialize)]
pub struct HandleInfo {
    pub id: Option<HandleId>,
    pub owner_session_id: Option<SessionId>,
    pub plugin: String,
    pub state: HandleState,
}

#[derive(Debug, Clone, Copy)]
struct Attachment {
    handle_id: HandleId,
    session_id: SessionId,
}

/// One plugin attached to a [`SessionManager`]'s session.
///
/// The attachment mutex is held for the whole round trip, so at most one
/// request per handle is ever in flight.
pub struct PluginHandle {
    plugin: String,
    session: SessionManager,
    transport: Arc<dyn GatewayTransport>,
    max_attach_retries: u32,
    attachment: Mutex<Option<Attachment>>,
}

impl PluginHandle {
    pub fn new(
        plugin: impl Into<String>,
        session: SessionManager,
        transport: Arc<dyn GatewayTransport>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            session,
            transport,
            max_attach_retries: DEFAULT_MAX_ATTACH_RETRIES,
            attachment: Mutex::new(None),
        }
    }

    pub fn with_max_attach_retries(mut self, max_attach_retries: u32) -> Self {
        self.max_attach_retries = max_attach_retries;
        self
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Attach the plugin, recovering from session expiry up to the configured
    /// number of retries
    pub async fn attach(&self) -> Result<HandleId> {
        self.attach_with_retries(self.max_attach_retries).await
    }

    /// Attach the plugin, recovering from session expiry up to `max_retries` times
    pub async fn attach_with_retries(&self, max_retries: u32) -> Result<HandleId> {
        let mut slot = self.attachment.lock().await;
        self.attach_locked(&mut slot, max_retries).await
    }

    /// Attach only if not already attached to the current session
    pub async fn ensure_attached(&self) -> Result<HandleId> {
        let mut slot = self.attachment.lock().await;
        if let Some(attachment) = *slot {
            if self.session.current_session().await == Some(attachment.session_id) {
                return Ok(attachment.handle_id);
            }
            debug!(
                "Handle {} for {} outlived session {}, re-attaching",
                attachment.handle_id, self.plugin, attachment.session_id
            );
            *slot = None;
        }
        self.attach_locked(&mut slot, self.max_attach_retries).await
    }

    async fn attach_locked(
        &self,
        slot: &mut Option<Attachment>,
        max_retries: u32,
    ) -> Result<HandleId> {
        let mut attempt = 0;
        loop {
            let session_id = self.session.ensure_active().await?;
            let request = GatewayRequest::attach(self.plugin.as_str());
            let outcome = self
                .transport
                .send(GatewayPath::Session(session_id), &request)
                .await
                .and_then(decode_reply)
                .and_then(|reply| reply.created_id());

            match outcome {
                Ok(id) => {
                    let handle_id = HandleId(id);
                    *slot = Some(Attachment {
                        handle_id,
                        session_id,
                    });
                    info!("Plugin handle created: {} for plugin: {}", handle_id, self.plugin);
                    return Ok(handle_id);
                }
                Err(GatewayError::SessionExpired { envelope }) => {
                    *slot = None;
                    self.session.note_expired(session_id).await;
                    if attempt >= max_retries {
                        return Err(GatewayError::protocol(
                            Some(SESSION_NOT_FOUND),
                            format!(
                                "session kept expiring while attaching {} ({} attempts)",
                                self.plugin,
                                attempt + 1
                            ),
                            envelope,
                        ));
                    }
                    warn!(
                        "Session {} expired while attaching {}, recreating",
                        session_id, self.plugin
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a plugin message and return the plugin payload.
    ///
    /// Never retries. On session expiry the handle is detached and
    /// [`GatewayError::SessionExpired`] is returned.
    pub async fn send_message(&self, body: Value) -> Result<PluginData> {
        let mut slot = self.attachment.lock().await;
        let attachment = match *slot {
            Some(attachment) => attachment,
            None => {
                return Err(GatewayError::precondition(format!(
                    "handle for {} is not attached",
                    self.plugin
                )))
            }
        };

        if self.session.current_session().await != Some(attachment.session_id) {
            *slot = None;
            return Err(GatewayError::precondition(format!(
                "session {} backing the {} handle is no longer active",
                attachment.session_id, self.plugin
            )));
        }

        let request = GatewayRequest::message(body);
        let path = GatewayPath::Handle(attachment.session_id, attachment.handle_id);
        let result = self
            .transport
            .send(path, &request)
            .await
            .and_then(decode_reply);

        match result {
            Ok(reply) => reply.into_plugin_data(),
            Err(GatewayError::SessionExpired { envelope }) => {
                warn!(
                    "Session {} expired during {} message",
                    attachment.session_id, self.plugin
                );
                self.session.note_expired(attachment.session_id).await;
                *slot = None;
                Err(GatewayError::SessionExpired { envelope })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn state(&self) -> HandleState {
        self.info().await.state
    }

    pub async fn info(&self) -> HandleInfo {
        let attachment = *self.attachment.lock().await;
        let current = self.session.current_session().await;
        let state = match attachment {
            Some(attachment) if current == Some(attachment.session_id) => HandleState::Attached,
            _ => HandleState::Detached,
        };
        HandleInfo {
            id: attachment.map(|a| a.handle_id),
            owner_session_id: attachment.map(|a| a.session_id),
            plugin: self.plugin.clone(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::session::{SessionState, DEFAULT_KEEPALIVE_INTERVAL};
    use crate::testing::FakeGateway;
    use serde_json::json;

    const PLUGIN: &str = "janus.plugin.videoroom";

    fn handle(gateway: &Arc<FakeGateway>) -> PluginHandle {
        let session = SessionManager::new("test", gateway.clone(), DEFAULT_KEEPALIVE_INTERVAL);
        PluginHandle::new(PLUGIN, session, gateway.clone())
    }

    fn expired() -> Value {
        FakeGateway::error_envelope(SESSION_NOT_FOUND, "No such session")
    }

    #[tokio::test]
    async fn test_attach_creates_session_lazily() {
        let gateway = FakeGateway::new();
        let handle = handle(&gateway);

        assert_eq!(handle.state().await, HandleState::Detached);
        handle.attach().await.unwrap();

        assert_eq!(handle.state().await, HandleState::Attached);
        assert_eq!(gateway.count(Command::Create), 1);
        assert_eq!(gateway.count(Command::Attach), 1);

        let attach = gateway
            .requests()
            .into_iter()
            .find(|r| r.command == Command::Attach)
            .unwrap();
        assert_eq!(attach.plugin.as_deref(), Some(PLUGIN));
    }

    #[tokio::test]
    async fn test_attach_recovers_from_one_expiry() {
        let gateway = FakeGateway::new();
        gateway.push_reply(Command::Attach, expired());
        let handle = handle(&gateway);

        handle.attach().await.unwrap();

        assert_eq!(handle.state().await, HandleState::Attached);
        assert_eq!(gateway.count(Command::Create), 2);
        assert_eq!(gateway.count(Command::Attach), 2);
    }

    #[tokio::test]
    async fn test_attach_gives_up_after_second_expiry() {
        let gateway = FakeGateway::new();
        gateway.push_reply(Command::Attach, expired());
        gateway.push_reply(Command::Attach, expired());
        let handle = handle(&gateway);

        let err = handle.attach().await.unwrap_err();
        match err {
            GatewayError::Protocol { code, .. } => assert_eq!(code, Some(SESSION_NOT_FOUND)),
            other => panic!("expected Protocol, got {:?}", other),
        }
        assert_eq!(gateway.count(Command::Attach), 2);
        assert_eq!(handle.state().await, HandleState::Detached);
    }

    #[tokio::test]
    async fn test_attach_with_more_retries() {
        let gateway = FakeGateway::new();
        gateway.push_reply(Command::Attach, expired());
        gateway.push_reply(Command::Attach, expired());
        let handle = handle(&gateway);

        handle.attach_with_retries(2).await.unwrap();
        assert_eq!(gateway.count(Command::Attach), 3);
    }

    #[tokio::test]
    async fn test_attach_other_error_is_not_retried() {
        let gateway = FakeGateway::new();
        gateway.push_reply(Command::Attach, FakeGateway::error_envelope(460, "No such plugin"));
        let handle = handle(&gateway);

        let err = handle.attach().await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol { code: Some(460), .. }));
        assert_eq!(gateway.count(Command::Attach), 1);
        assert_eq!(gateway.count(Command::Create), 1);
    }

    #[tokio::test]
    async fn test_send_requires_attachment() {
        let gateway = FakeGateway::new();
        let handle = handle(&gateway);

        let err = handle.send_message(json!({"request": "list"})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Precondition { .. }));
        assert_eq!(gateway.count(Command::Message), 0);
    }

    #[tokio::test]
    async fn test_send_returns_plugin_data() {
        let gateway = FakeGateway::new();
        gateway.set_responder(|_, body| json!({"echo": body["request"].clone()}));
        let handle = handle(&gateway);

        handle.attach().await.unwrap();
        let reply = handle.send_message(json!({"request": "list"})).await.unwrap();

        assert_eq!(reply.plugin, PLUGIN);
        assert_eq!(reply.data, json!({"echo": "list"}));
    }

    #[tokio::test]
    async fn test_send_never_retries_on_expiry() {
        let gateway = FakeGateway::new();
        let handle = handle(&gateway);

        handle.attach().await.unwrap();
        gateway.expire_all_sessions();

        let err = handle.send_message(json!({"request": "list"})).await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(gateway.count(Command::Message), 1);
        assert_eq!(gateway.count(Command::Create), 1);
        assert_eq!(handle.state().await, HandleState::Detached);
        assert_eq!(handle.session().state().await, SessionState::Uninitialized);

        // a second send is a precondition failure until someone re-attaches
        let err = handle.send_message(json!({"request": "list"})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Precondition { .. }));

        handle.ensure_attached().await.unwrap();
        handle.send_message(json!({"request": "list"})).await.unwrap();
        assert_eq!(gateway.count(Command::Create), 2);
    }

    #[tokio::test]
    async fn test_send_protocol_error_carries_envelope() {
        let gateway = FakeGateway::new();
        let handle = handle(&gateway);
        handle.attach().await.unwrap();

        let envelope = FakeGateway::error_envelope(456, "Missing mandatory element (body)");
        gateway.push_reply(Command::Message, envelope.clone());

        let err = handle.send_message(json!({})).await.unwrap_err();
        assert_eq!(err.envelope(), Some(&envelope));
        assert_eq!(handle.state().await, HandleState::Attached);
    }

    #[tokio::test]
    async fn test_handle_detaches_when_session_leaves_active() {
        let gateway = FakeGateway::new();
        let handle = handle(&gateway);

        handle.attach().await.unwrap();
        let session_id = handle.session().current_session().await.unwrap();
        handle.session().note_expired(session_id).await;

        assert_eq!(handle.state().await, HandleState::Detached);
        let err = handle.send_message(json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Precondition { .. }));
    }

    #[tokio::test]
    async fn test_ensure_attached_reuses_handle() {
        let gateway = FakeGateway::new();
        let handle = handle(&gateway);

        let first = handle.ensure_attached().await.unwrap();
        let second = handle.ensure_attached().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.count(Command::Attach), 1);
    }
}
