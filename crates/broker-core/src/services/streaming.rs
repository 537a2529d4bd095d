//! RTP mountpoint service (streaming plugin)

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use mediabroker_gateway_core::{GatewayTransport, STREAMING_PLUGIN};

use super::room::DEFAULT_ADMIN_SECRET;
use super::{merge_over_defaults, PluginService, ServiceInfo, ServiceSettings, RESERVED_REQUEST_KEY};
use crate::error::Result;

/// Caller-supplied mountpoint attributes.
///
/// The flat `audio*`/`video*` fields describe the two RTP streams and end up
/// in the `media` array of the create request. `audio: false` or
/// `video: false` leaves that stream out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountpointConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audioport: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audiopt: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audiocodec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videoport: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videopt: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videocodec: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Default RTP stream description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDefaults {
    pub mid: String,
    pub port: u16,
    pub pt: u8,
    pub codec: String,
}

/// Default table for mountpoint creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountpointDefaults {
    pub mountpoint_type: String,
    pub description: String,
    /// Secret used by `destroy`/`info` when the caller passes none
    pub admin_secret: String,
    pub audio: MediaDefaults,
    pub video: MediaDefaults,
}

impl Default for MountpointDefaults {
    fn default() -> Self {
        Self {
            mountpoint_type: "rtp".to_string(),
            description: "RTP Stream".to_string(),
            admin_secret: DEFAULT_ADMIN_SECRET.to_string(),
            audio: MediaDefaults {
                mid: "a".to_string(),
                port: 5002,
                pt: 111,
                codec: "opus".to_string(),
            },
            video: MediaDefaults {
                mid: "v".to_string(),
                port: 5004,
                pt: 100,
                codec: "vp8".to_string(),
            },
        }
    }
}

impl MountpointDefaults {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            admin_secret: secret.into(),
            ..Self::default()
        }
    }
}

fn media_entry(
    kind: &str,
    defaults: &MediaDefaults,
    mid: &Option<String>,
    port: Option<u16>,
    pt: Option<u8>,
    codec: &Option<String>,
) -> Value {
    json!({
        "type": kind,
        "mid": mid.as_deref().unwrap_or(&defaults.mid),
        "port": port.unwrap_or(defaults.port),
        "pt": pt.unwrap_or(defaults.pt),
        "codec": codec.as_deref().unwrap_or(&defaults.codec),
    })
}

/// Mountpoint CRUD on the streaming plugin
pub struct StreamingService {
    service: PluginService,
    defaults: MountpointDefaults,
}

impl StreamingService {
    pub fn new(service: PluginService, defaults: MountpointDefaults) -> Self {
        Self { service, defaults }
    }

    pub fn connect(
        transport: Arc<dyn GatewayTransport>,
        settings: &ServiceSettings,
        defaults: MountpointDefaults,
    ) -> Self {
        Self::new(
            PluginService::connect("streaming", STREAMING_PLUGIN, transport, settings),
            defaults,
        )
    }

    pub fn defaults(&self) -> &MountpointDefaults {
        &self.defaults
    }

    /// Build the `create` body for an RTP mountpoint
    pub fn build_create_request(&self, config: &MountpointConfig) -> Value {
        let id = config
            .id
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..10_000));

        let mut media = Vec::with_capacity(2);
        if config.audio != Some(false) {
            media.push(media_entry(
                "audio",
                &self.defaults.audio,
                &config.audio_mid,
                config.audioport,
                config.audiopt,
                &config.audiocodec,
            ));
        }
        if config.video != Some(false) {
            media.push(media_entry(
                "video",
                &self.defaults.video,
                &config.video_mid,
                config.videoport,
                config.videopt,
                &config.videocodec,
            ));
        }

        let mut base = Map::new();
        base.insert("type".into(), json!(self.defaults.mountpoint_type));
        base.insert("id".into(), json!(id));
        base.insert(
            "description".into(),
            json!(config
                .description
                .as_deref()
                .unwrap_or(&self.defaults.description)),
        );
        if let Some(metadata) = &config.metadata {
            base.insert("metadata".into(), json!(metadata));
        }
        if let Some(secret) = &config.secret {
            base.insert("secret".into(), json!(secret));
        }
        if let Some(is_private) = config.is_private {
            base.insert("is_private".into(), json!(is_private));
        }
        base.insert("media".into(), Value::Array(media));

        let mut body = merge_over_defaults(base, config.extra.clone());
        body.insert(RESERVED_REQUEST_KEY.to_string(), json!("create"));
        Value::Object(body)
    }

    pub async fn init(&self) -> bool {
        self.service.init().await
    }

    pub async fn create_mountpoint(&self, config: MountpointConfig) -> Result<Value> {
        let body = self.build_create_request(&config);
        self.service.request("Mountpoint creation", body).await
    }

    pub async fn list_mountpoints(&self) -> Result<Value> {
        self.service
            .request("Mountpoints list", json!({"request": "list"}))
            .await
    }

    pub async fn destroy_mountpoint(&self, id: u64, secret: Option<&str>) -> Result<Value> {
        let secret = secret.unwrap_or(&self.defaults.admin_secret);
        self.service
            .request(
                "Mountpoint destruction",
                json!({"request": "destroy", "id": id, "secret": secret}),
            )
            .await
    }

    /// Mountpoint details; `secret` unlocks the private fields
    pub async fn mountpoint_info(&self, id: u64, secret: Option<&str>) -> Result<Value> {
        let mut body = json!({"request": "info", "id": id});
        if let Some(secret) = secret {
            body["secret"] = json!(secret);
        }
        self.service.request("Mountpoint info", body).await
    }

    pub async fn info(&self) -> ServiceInfo {
        self.service.info().await
    }

    pub async fn shutdown(&self) {
        self.service.shutdown().await
    }
}
