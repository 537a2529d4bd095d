//! Control-plane session lifecycle
//!
//! A [`SessionManager`] owns exactly one gateway session:
//!
//! ```text
//! UNINITIALIZED --create--> ACTIVE --458--> EXPIRED --cleared--> UNINITIALIZED
//!                              |
//!                              +--destroy--> DESTROYED (terminal)
//! ```
//!
//! Creation is serialized behind the state mutex: concurrent callers of
//! [`SessionManager::ensure_active`] that find no session wait for the one
//! in-flight create instead of issuing their own. While ACTIVE, a keepalive
//! task owned by the manager pings the gateway on a fixed interval; it is
//! cancelled through a [`CancellationToken`] whenever the session leaves
//! ACTIVE.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::protocol::{decode_reply, GatewayPath, GatewayRequest, SessionId};
use crate::transport::GatewayTransport;

/// Default keepalive period
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Uninitialized,
    Active,
    Expired,
    Destroyed,
}

/// Snapshot of a managed session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Option<SessionId>,
    pub created_at: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub keepalive_running: bool,
}

/// Background keepalive; cancelled when dropped
struct KeepaliveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl KeepaliveTask {
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for KeepaliveTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionSlot {
    state: SessionState,
    session_id: Option<SessionId>,
    created_at: Option<DateTime<Utc>>,
    keepalive: Option<KeepaliveTask>,
}

impl SessionSlot {
    fn clear(&mut self, state: SessionState) {
        // dropping the task cancels it
        self.keepalive = None;
        self.session_id = None;
        self.created_at = None;
        self.state = state;
    }
}

struct Shared {
    label: String,
    transport: Arc<dyn GatewayTransport>,
    keepalive_interval: Duration,
    slot: Mutex<SessionSlot>,
}

/// Owner of one gateway session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager for the gateway behind `transport`.
    ///
    /// `label` only shows up in logs (e.g. `"videoroom"`).
    pub fn new(
        label: impl Into<String>,
        transport: Arc<dyn GatewayTransport>,
        keepalive_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                transport,
                keepalive_interval,
                slot: Mutex::new(SessionSlot {
                    state: SessionState::Uninitialized,
                    session_id: None,
                    created_at: None,
                    keepalive: None,
                }),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Return the active session id, creating a session first if needed
    pub async fn ensure_active(&self) -> Result<SessionId> {
        let mut slot = self.shared.slot.lock().await;
        match (slot.state, slot.session_id) {
            (SessionState::Active, Some(session_id)) => Ok(session_id),
            (SessionState::Destroyed, _) => Err(GatewayError::precondition(format!(
                "{} session manager has been destroyed",
                self.shared.label
            ))),
            _ => self.create_locked(&mut slot).await,
        }
    }

    /// Create a new gateway session.
    ///
    /// Fails with a precondition error if a session is already active or the
    /// manager was destroyed; use [`ensure_active`](Self::ensure_active) for
    /// the idempotent variant.
    pub async fn create(&self) -> Result<SessionId> {
        let mut slot = self.shared.slot.lock().await;
        match slot.state {
            SessionState::Active => Err(GatewayError::precondition(format!(
                "{} session is already active",
                self.shared.label
            ))),
            SessionState::Destroyed => Err(GatewayError::precondition(format!(
                "{} session manager has been destroyed",
                self.shared.label
            ))),
            _ => self.create_locked(&mut slot).await,
        }
    }

    async fn create_locked(&self, slot: &mut SessionSlot) -> Result<SessionId> {
        if slot.state == SessionState::Expired {
            slot.clear(SessionState::Uninitialized);
        }

        let request = GatewayRequest::create();
        let envelope = self.shared.transport.send(GatewayPath::Root, &request).await?;
        let session_id = SessionId(decode_reply(envelope)?.created_id()?);

        slot.state = SessionState::Active;
        slot.session_id = Some(session_id);
        slot.created_at = Some(Utc::now());
        slot.keepalive = Some(self.spawn_keepalive(session_id));

        info!("Gateway session created: {} ({})", session_id, self.shared.label);
        Ok(session_id)
    }

    fn spawn_keepalive(&self, session_id: SessionId) -> KeepaliveTask {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(keepalive_loop(
            Arc::downgrade(&self.shared),
            Arc::clone(&self.shared.transport),
            session_id,
            self.shared.keepalive_interval,
            cancel.clone(),
        ));
        KeepaliveTask { cancel, handle }
    }

    /// Record that the gateway reported `expired` as unknown.
    ///
    /// Only acts if `expired` is still the session held; a stale report from
    /// a caller that raced a re-create is ignored. Returns whether local
    /// state was cleared.
    pub async fn note_expired(&self, expired: SessionId) -> bool {
        let mut slot = self.shared.slot.lock().await;
        if slot.session_id != Some(expired) {
            debug!(
                "Ignoring stale expiry of session {} ({})",
                expired, self.shared.label
            );
            return false;
        }

        warn!("Gateway session {} expired ({})", expired, self.shared.label);
        slot.clear(SessionState::Expired);
        slot.state = SessionState::Uninitialized;
        true
    }

    /// Stop the keepalive, destroy the gateway session and mark the manager
    /// destroyed. Gateway errors are logged, never returned.
    pub async fn destroy(&self) {
        let mut slot = self.shared.slot.lock().await;
        slot.keepalive = None;

        if let Some(session_id) = slot.session_id {
            let request = GatewayRequest::destroy();
            let result = self
                .shared
                .transport
                .send(GatewayPath::Session(session_id), &request)
                .await
                .and_then(decode_reply);
            match result {
                Ok(_) => info!("Gateway session destroyed: {} ({})", session_id, self.shared.label),
                Err(e) => warn!(
                    "Error destroying gateway session {} ({}): {}",
                    session_id, self.shared.label, e
                ),
            }
        }

        slot.clear(SessionState::Destroyed);
    }

    pub async fn state(&self) -> SessionState {
        self.shared.slot.lock().await.state
    }

    /// Session id while ACTIVE
    pub async fn current_session(&self) -> Option<SessionId> {
        let slot = self.shared.slot.lock().await;
        match slot.state {
            SessionState::Active => slot.session_id,
            _ => None,
        }
    }

    pub async fn info(&self) -> SessionInfo {
        let slot = self.shared.slot.lock().await;
        SessionInfo {
            id: slot.session_id,
            created_at: slot.created_at,
            state: slot.state,
            keepalive_running: slot.keepalive.as_ref().map_or(false, KeepaliveTask::is_running),
        }
    }
}

async fn keepalive_loop(
    shared: Weak<Shared>,
    transport: Arc<dyn GatewayTransport>,
    session_id: SessionId,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let request = GatewayRequest::keepalive();
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = transport.send(GatewayPath::Session(session_id), &request) => result,
        };

        match result.and_then(decode_reply) {
            Ok(_) => debug!("Keep-alive sent for session: {}", session_id),
            Err(GatewayError::SessionExpired { .. }) => {
                if let Some(shared) = shared.upgrade() {
                    SessionManager { shared }.note_expired(session_id).await;
                }
                break;
            }
            Err(e) => warn!("Keep-alive failed for session {}: {}", session_id, e),
        }
    }

    debug!("Keep-alive stopped for session: {}", session_id);
}
