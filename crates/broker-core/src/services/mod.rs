//! Domain services built on plugin handles
//!
//! Each service owns one gateway session and one plugin handle. Requests are
//! built by layering caller-supplied configuration over a default table
//! (caller wins), sent through the handle, and answered with the plugin's
//! `data` section.

pub mod room;
pub mod streaming;

use mediabroker_gateway_core::{
    GatewayTransport, HandleInfo, PluginHandle, SessionInfo, SessionManager,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{BrokerError, Result};

pub use room::{RoomConfig, RoomDefaults, VideoRoomService};
pub use streaming::{MediaDefaults, MountpointConfig, MountpointDefaults, StreamingService};

/// Key that always names the plugin request and can never be overridden
pub(crate) const RESERVED_REQUEST_KEY: &str = "request";

/// Session/handle settings shared by every service
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub keepalive_interval: Duration,
    pub max_attach_retries: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: mediabroker_gateway_core::DEFAULT_KEEPALIVE_INTERVAL,
            max_attach_retries: mediabroker_gateway_core::DEFAULT_MAX_ATTACH_RETRIES,
        }
    }
}

/// Session and handle snapshot of one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub session: SessionInfo,
    pub handle: HandleInfo,
}

/// Plumbing shared by the room and streaming services
pub struct PluginService {
    name: &'static str,
    handle: PluginHandle,
}

impl PluginService {
    pub fn new(name: &'static str, handle: PluginHandle) -> Self {
        Self { name, handle }
    }

    /// Build the session manager and handle for `plugin` on `transport`
    pub fn connect(
        name: &'static str,
        plugin: &str,
        transport: Arc<dyn GatewayTransport>,
        settings: &ServiceSettings,
    ) -> Self {
        let session = SessionManager::new(name, transport.clone(), settings.keepalive_interval);
        let handle = PluginHandle::new(plugin, session, transport)
            .with_max_attach_retries(settings.max_attach_retries);
        Self::new(name, handle)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn handle(&self) -> &PluginHandle {
        &self.handle
    }

    /// Create the session and attach the plugin eagerly; reports readiness
    pub async fn init(&self) -> bool {
        match self.handle.ensure_attached().await {
            Ok(handle_id) => {
                info!("{} service ready (handle {})", self.name, handle_id);
                true
            }
            Err(e) => {
                error!("{} service init error: {}", self.name, e);
                false
            }
        }
    }

    /// Send one plugin request, attaching first if needed
    pub async fn request(&self, operation: &'static str, body: Value) -> Result<Value> {
        self.handle
            .ensure_attached()
            .await
            .map_err(|e| BrokerError::from_gateway(operation, e))?;

        let reply = self
            .handle
            .send_message(body)
            .await
            .map_err(|e| BrokerError::from_gateway(operation, e))?;

        // plugins report their own failures inside a successful envelope
        if let Some(code) = reply.data.get("error_code") {
            let reason = reply
                .data
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("plugin error {}", code));
            return Err(BrokerError::OperationFailed {
                operation,
                reason,
                envelope: json!({"plugin": reply.plugin, "data": reply.data}),
            });
        }
        Ok(reply.data)
    }

    pub async fn info(&self) -> ServiceInfo {
        ServiceInfo {
            session: self.handle.session().info().await,
            handle: self.handle.info().await,
        }
    }

    /// Destroy the gateway session; errors are logged
    pub async fn shutdown(&self) {
        self.handle.session().destroy().await;
    }
}

/// Overlay `overrides` on `defaults`; keys present in `overrides` always win
pub fn merge_over_defaults(
    defaults: Map<String, Value>,
    overrides: Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = defaults;
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    merged
}

/// Serialize a typed config to a JSON object, skipping unset fields
pub(crate) fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BrokerError::invalid_input(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(BrokerError::invalid_input(e.to_string())),
    }
}

/// Layer two typed configs of the same shape; fields set in `top` win
pub fn layer_configs<T>(base: &T, top: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let merged = merge_over_defaults(to_object(base)?, to_object(top)?);
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| BrokerError::invalid_input(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediabroker_gateway_core::testing::FakeGateway;
    use mediabroker_gateway_core::VIDEOROOM_PLUGIN;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_caller_values_win() {
        let merged = merge_over_defaults(
            object(json!({"publishers": 6, "bitrate": 128000})),
            object(json!({"publishers": 2, "notify_joining": true})),
        );
        assert_eq!(
            Value::Object(merged),
            json!({"publishers": 2, "bitrate": 128000, "notify_joining": true})
        );
    }

    #[test]
    fn test_layer_configs_keeps_unset_fields() {
        let base = RoomConfig {
            room: Some(7),
            description: Some("Session 7".into()),
            ..Default::default()
        };
        let top = RoomConfig {
            description: Some("Custom".into()),
            ..Default::default()
        };

        let layered = layer_configs(&base, &top).unwrap();
        assert_eq!(layered.room, Some(7));
        assert_eq!(layered.description.as_deref(), Some("Custom"));
    }

    #[tokio::test]
    async fn test_plugin_level_error_is_operation_failure() {
        let gateway = FakeGateway::new();
        gateway.set_responder(|_, _| {
            json!({"videoroom": "event", "error_code": 426, "error": "No such room (99)"})
        });
        let service = PluginService::connect(
            "videoroom",
            VIDEOROOM_PLUGIN,
            gateway.clone(),
            &ServiceSettings::default(),
        );

        let err = service
            .request("Participants list", json!({"request": "listparticipants", "room": 99}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Participants list failed: No such room (99)");
        assert_eq!(err.envelope().unwrap()["data"]["error_code"], 426);
    }
}
