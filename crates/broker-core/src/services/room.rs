//! Multi-party room service (videoroom plugin)

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use mediabroker_gateway_core::{GatewayTransport, VIDEOROOM_PLUGIN};

use super::{
    merge_over_defaults, to_object, PluginService, ServiceInfo, ServiceSettings,
    RESERVED_REQUEST_KEY,
};
use crate::error::Result;

/// Secret used for rooms and mountpoints when none is configured
pub const DEFAULT_ADMIN_SECRET: &str = "adminpwd";

/// Caller-supplied room attributes; unset fields fall back to [`RoomDefaults`].
///
/// Unknown keys are collected in `extra` and forwarded to the plugin as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fir_freq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audiocodec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videocodec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Default table for room creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDefaults {
    pub description: String,
    pub secret: String,
    pub publishers: u32,
    pub bitrate: u32,
    pub fir_freq: u32,
    pub audiocodec: String,
    pub videocodec: String,
    pub record: bool,
}

impl Default for RoomDefaults {
    fn default() -> Self {
        Self {
            description: "Video Room".to_string(),
            secret: DEFAULT_ADMIN_SECRET.to_string(),
            publishers: 6,
            bitrate: 128_000,
            fir_freq: 10,
            audiocodec: "opus".to_string(),
            videocodec: "vp8".to_string(),
            record: false,
        }
    }
}

impl RoomDefaults {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }
}

/// Room CRUD on the videoroom plugin
pub struct VideoRoomService {
    service: PluginService,
    defaults: RoomDefaults,
}

impl VideoRoomService {
    pub fn new(service: PluginService, defaults: RoomDefaults) -> Self {
        Self { service, defaults }
    }

    pub fn connect(
        transport: Arc<dyn GatewayTransport>,
        settings: &ServiceSettings,
        defaults: RoomDefaults,
    ) -> Self {
        Self::new(
            PluginService::connect("videoroom", VIDEOROOM_PLUGIN, transport, settings),
            defaults,
        )
    }

    pub fn defaults(&self) -> &RoomDefaults {
        &self.defaults
    }

    /// Build the `create` body: defaults, then `config`, then the request name.
    ///
    /// A random room id in `1..10000` is used when `config` names none.
    pub fn build_create_request(&self, config: &RoomConfig) -> Result<Value> {
        let mut defaults = to_object(&self.defaults)?;
        if config.room.is_none() {
            let room: u64 = rand::thread_rng().gen_range(1..10_000);
            defaults.insert("room".to_string(), json!(room));
        }

        let mut body = merge_over_defaults(defaults, to_object(config)?);
        body.insert(RESERVED_REQUEST_KEY.to_string(), json!("create"));
        Ok(Value::Object(body))
    }

    pub async fn init(&self) -> bool {
        self.service.init().await
    }

    pub async fn create_room(&self, config: RoomConfig) -> Result<Value> {
        let body = self.build_create_request(&config)?;
        self.service.request("Room creation", body).await
    }

    pub async fn list_rooms(&self) -> Result<Value> {
        self.service
            .request("Room list", json!({"request": "list"}))
            .await
    }

    /// Destroy `room`, authenticating with `secret` or the default secret
    pub async fn destroy_room(&self, room: u64, secret: Option<&str>) -> Result<Value> {
        let secret = secret.unwrap_or(&self.defaults.secret);
        self.service
            .request(
                "Room destruction",
                json!({"request": "destroy", "room": room, "secret": secret}),
            )
            .await
    }

    pub async fn room_exists(&self, room: u64) -> Result<Value> {
        self.service
            .request("Room exists check", json!({"request": "exists", "room": room}))
            .await
    }

    pub async fn list_participants(&self, room: u64) -> Result<Value> {
        self.service
            .request(
                "Participants list",
                json!({"request": "listparticipants", "room": room}),
            )
            .await
    }

    pub async fn info(&self) -> ServiceInfo {
        self.service.info().await
    }

    pub async fn shutdown(&self) {
        self.service.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerError;
    use mediabroker_gateway_core::testing::FakeGateway;
    use mediabroker_gateway_core::{Command, HandleState, SESSION_NOT_FOUND};
    use pretty_assertions::assert_eq;

    fn service(gateway: &Arc<FakeGateway>) -> VideoRoomService {
        VideoRoomService::connect(
            gateway.clone(),
            &ServiceSettings::default(),
            RoomDefaults::default(),
        )
    }

    fn default_room_42() -> Value {
        json!({
            "request": "create",
            "room": 42,
            "description": "Video Room",
            "secret": "adminpwd",
            "publishers": 6,
            "bitrate": 128000,
            "fir_freq": 10,
            "audiocodec": "opus",
            "videocodec": "vp8",
            "record": false
        })
    }

    #[tokio::test]
    async fn test_create_room_with_defaults() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);

        rooms
            .create_room(RoomConfig {
                room: Some(42),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(gateway.message_bodies(VIDEOROOM_PLUGIN), vec![default_room_42()]);
    }

    #[tokio::test]
    async fn test_create_room_override_changes_only_that_key() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);

        rooms
            .create_room(RoomConfig {
                room: Some(42),
                publishers: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut expected = default_room_42();
        expected["publishers"] = json!(2);
        assert_eq!(gateway.message_bodies(VIDEOROOM_PLUGIN), vec![expected]);
    }

    #[test]
    fn test_extra_keys_pass_through_but_request_is_reserved() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);

        let config: RoomConfig = serde_json::from_value(json!({
            "room": 42,
            "notify_joining": true,
            "request": "destroy"
        }))
        .unwrap();
        let body = rooms.build_create_request(&config).unwrap();

        assert_eq!(body["request"], "create");
        assert_eq!(body["notify_joining"], true);
    }

    #[test]
    fn test_random_room_id_when_absent() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);

        let body = rooms.build_create_request(&RoomConfig::default()).unwrap();
        let room = body["room"].as_u64().unwrap();
        assert!((1..10_000).contains(&room));
    }

    #[tokio::test]
    async fn test_create_returns_plugin_data() {
        let gateway = FakeGateway::new();
        gateway.set_responder(|_, body| json!({"videoroom": "created", "room": body["room"]}));
        let rooms = service(&gateway);

        let data = rooms
            .create_room(RoomConfig {
                room: Some(42),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(data, json!({"videoroom": "created", "room": 42}));
    }

    #[tokio::test]
    async fn test_reads_and_destroy_bodies() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);

        rooms.list_rooms().await.unwrap();
        rooms.room_exists(42).await.unwrap();
        rooms.list_participants(42).await.unwrap();
        rooms.destroy_room(42, None).await.unwrap();
        rooms.destroy_room(43, Some("other")).await.unwrap();

        assert_eq!(
            gateway.message_bodies(VIDEOROOM_PLUGIN),
            vec![
                json!({"request": "list"}),
                json!({"request": "exists", "room": 42}),
                json!({"request": "listparticipants", "room": 42}),
                json!({"request": "destroy", "room": 42, "secret": "adminpwd"}),
                json!({"request": "destroy", "room": 43, "secret": "other"}),
            ]
        );
        // one session, one handle for all of them
        assert_eq!(gateway.count(Command::Create), 1);
        assert_eq!(gateway.count(Command::Attach), 1);
    }

    #[tokio::test]
    async fn test_rejection_embeds_envelope() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);
        rooms.init().await;

        let envelope = FakeGateway::error_envelope(490, "Plugin error");
        gateway.push_reply(Command::Message, envelope.clone());

        let err = rooms.list_rooms().await.unwrap_err();
        match &err {
            BrokerError::OperationFailed { operation, .. } => assert_eq!(*operation, "Room list"),
            other => panic!("expected OperationFailed, got {:?}", other),
        }
        assert_eq!(err.envelope(), Some(&envelope));
    }

    #[tokio::test]
    async fn test_expiry_surfaces_and_next_call_recovers() {
        let gateway = FakeGateway::new();
        let rooms = service(&gateway);
        rooms.init().await;

        gateway.push_reply(
            Command::Message,
            FakeGateway::error_envelope(SESSION_NOT_FOUND, "No such session"),
        );
        let err = rooms.list_rooms().await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(rooms.info().await.handle.state, HandleState::Detached);

        // retrying the domain operation re-creates session and handle
        rooms.list_rooms().await.unwrap();
        assert_eq!(gateway.count(Command::Create), 2);
        assert_eq!(gateway.count(Command::Attach), 2);
    }

    #[tokio::test]
    async fn test_init_reports_failure() {
        let gateway = FakeGateway::new();
        gateway.set_unreachable(true);
        let rooms = service(&gateway);

        assert!(!rooms.init().await);
    }
}
