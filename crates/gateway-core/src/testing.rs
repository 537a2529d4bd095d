//! In-process gateway for tests
//!
//! [`FakeGateway`] implements [`GatewayTransport`] by simulating the
//! gateway's session/handle bookkeeping. Tests can expire every session,
//! queue one-shot replies per command, add latency, make the gateway
//! unreachable, and inspect every request that was sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::protocol::{Command, GatewayPath, GatewayRequest, SESSION_NOT_FOUND};
use crate::transport::GatewayTransport;

/// Error code the fake uses for an unknown handle
pub const HANDLE_NOT_FOUND: i64 = 459;

type Responder = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// A request seen by the fake gateway
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: GatewayPath,
    pub command: Command,
    pub plugin: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    sessions: HashSet<u64>,
    handles: HashMap<u64, (u64, String)>,
    requests: Vec<RecordedRequest>,
    scripted: VecDeque<(Command, Value)>,
    responder: Option<Responder>,
    unreachable: bool,
    latency: Option<Duration>,
}

/// Simulated gateway
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 1000,
                ..Default::default()
            }),
        })
    }

    /// `{"janus": "error", ...}` envelope
    pub fn error_envelope(code: i64, reason: &str) -> Value {
        json!({"janus": "error", "error": {"code": code, "reason": reason}})
    }

    /// Forget every session and handle, as a gateway does after a session timeout
    pub fn expire_all_sessions(&self) {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.handles.clear();
    }

    /// Queue a one-shot reply for the next request carrying `command`
    pub fn push_reply(&self, command: Command, envelope: Value) {
        self.state.lock().scripted.push_back((command, envelope));
    }

    /// Compute `plugindata.data` of message replies from `(plugin, body)`
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        self.state.lock().responder = Some(Arc::new(responder));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay every reply by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Bodies of every message sent to `plugin`
    pub fn message_bodies(&self, plugin: &str) -> Vec<Value> {
        let state = self.state.lock();
        state
            .requests
            .iter()
            .filter(|r| r.command == Command::Message)
            .filter(|r| match r.path {
                GatewayPath::Handle(_, handle) => state
                    .handles
                    .get(&handle.0)
                    .map_or(false, |(_, p)| p == plugin),
                _ => false,
            })
            .filter_map(|r| r.body.clone())
            .collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.command == command)
            .count()
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    fn reply(&self, path: GatewayPath, request: &GatewayRequest) -> Result<Value> {
        let mut state = self.state.lock();
        state.requests.push(RecordedRequest {
            path,
            command: request.janus,
            plugin: request.plugin.clone(),
            body: request.body.clone(),
        });

        if state.unreachable {
            return Err(GatewayError::transport("connection refused"));
        }

        if let Some(pos) = state.scripted.iter().position(|(c, _)| *c == request.janus) {
            if let Some((_, envelope)) = state.scripted.remove(pos) {
                return Ok(envelope);
            }
        }

        let expired = Self::error_envelope(SESSION_NOT_FOUND, "No such session");
        let reply = match (request.janus, path) {
            (Command::Create, GatewayPath::Root) => {
                state.next_id += 1;
                let id = state.next_id;
                state.sessions.insert(id);
                json!({"janus": "success", "data": {"id": id}})
            }
            (_, GatewayPath::Session(session)) | (_, GatewayPath::Handle(session, _))
                if !state.sessions.contains(&session.0) =>
            {
                expired
            }
            (Command::Attach, GatewayPath::Session(session)) => {
                state.next_id += 1;
                let id = state.next_id;
                let plugin = request.plugin.clone().unwrap_or_default();
                state.handles.insert(id, (session.0, plugin));
                json!({"janus": "success", "session_id": session.0, "data": {"id": id}})
            }
            (Command::Keepalive, GatewayPath::Session(session)) => {
                json!({"janus": "ack", "session_id": session.0})
            }
            (Command::Destroy, GatewayPath::Session(session)) => {
                state.sessions.remove(&session.0);
                state.handles.retain(|_, (owner, _)| *owner != session.0);
                json!({"janus": "success", "session_id": session.0})
            }
            (Command::Message, GatewayPath::Handle(_, handle)) => {
                match state.handles.get(&handle.0).map(|(_, plugin)| plugin.clone()) {
                    Some(plugin) => {
                        let body = request.body.clone().unwrap_or(Value::Null);
                        let data = match &state.responder {
                            Some(responder) => responder(&plugin, &body),
                            None => json!({"result": "ok", "request": body.get("request").cloned()}),
                        };
                        json!({
                            "janus": "success",
                            "plugindata": {"plugin": plugin, "data": data}
                        })
                    }
                    None => Self::error_envelope(HANDLE_NOT_FOUND, "No such handle"),
                }
            }
            _ => Self::error_envelope(450, "Unsupported request on this path"),
        };
        Ok(reply)
    }
}

#[async_trait]
impl GatewayTransport for FakeGateway {
    async fn send(&self, path: GatewayPath, request: &GatewayRequest) -> Result<Value> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.reply(path, request)
    }
}
