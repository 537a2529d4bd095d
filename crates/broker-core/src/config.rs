//! Configuration for the broker
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, legacy `JANUS_*_WS_URL` variables, then `MEDIABROKER_*` variables
//! with `__` between nested keys (e.g. `MEDIABROKER_PORTS__BASE_PORT=20000`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use mediabroker_gateway_core::TransportConfig;

use crate::error::{BrokerError, Result};
use crate::orchestrator::OrchestratorSettings;
use crate::services::room::DEFAULT_ADMIN_SECRET;
use crate::services::{MountpointDefaults, RoomDefaults, ServiceSettings};

/// Prefix of the environment variables read by [`BrokerConfig::load`]
pub const ENV_PREFIX: &str = "MEDIABROKER";

/// Legacy variable holding the videoroom gateway WebSocket URL
pub const LEGACY_VIDEOROOM_ENV: &str = "JANUS_VIDEOROOM_WS_URL";

/// Legacy variable holding the streaming gateway WebSocket URL
pub const LEGACY_STREAMING_ENV: &str = "JANUS_STREAMING_WS_URL";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub gateway: GatewayConfig,
    pub ports: PortsConfig,
    pub endpoints: EndpointsConfig,
    pub admin_secret: String,
    pub server: ServerConfig,
}

/// Gateway connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub videoroom_url: String,
    pub streaming_url: String,
    pub request_timeout_ms: u64,
    pub keepalive_interval_secs: u64,
    pub max_attach_retries: u32,
}

/// RTP port pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub base_port: u16,
    pub capacity: u32,
}

/// Ingest/egress endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub ingest_base_path: String,
    pub egress_base_path: String,
    pub token: String,
    pub recipient_host: String,
}

/// HTTP API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            ports: PortsConfig::default(),
            endpoints: EndpointsConfig::default(),
            admin_secret: DEFAULT_ADMIN_SECRET.to_string(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            videoroom_url: "http://janus-videoroom:8088".to_string(),
            streaming_url: "http://janus-streaming:8088".to_string(),
            request_timeout_ms: 10_000,
            keepalive_interval_secs: 30,
            max_attach_retries: mediabroker_gateway_core::DEFAULT_MAX_ATTACH_RETRIES,
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            base_port: 10002,
            capacity: 10,
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            ingest_base_path: "/whip".to_string(),
            egress_base_path: "/whep".to_string(),
            token: "verysecret".to_string(),
            recipient_host: "janus-streaming".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7070".to_string(),
        }
    }
}

/// Map a gateway WebSocket URL to its HTTP API URL
/// (`ws://host:8188` becomes `http://host:8088`)
pub fn ws_to_http_url(url: &str) -> String {
    let url = if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        url.to_string()
    };
    url.replacen(":8188", ":8088", 1)
}

impl BrokerConfig {
    /// Load configuration from defaults, `path` and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_legacy_env_from(|key| std::env::var(key).ok());

        // prefixed variables win over legacy ones
        let overrides = Config::builder()
            .add_source(Config::try_from(&config)?)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = overrides.try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Honor the legacy WebSocket URL variables, read through `lookup`
    pub fn apply_legacy_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(LEGACY_VIDEOROOM_ENV).filter(|u| !u.is_empty()) {
            self.gateway.videoroom_url = ws_to_http_url(&url);
        }
        if let Some(url) = lookup(LEGACY_STREAMING_ENV).filter(|u| !u.is_empty()) {
            self.gateway.streaming_url = ws_to_http_url(&url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.capacity == 0 {
            return Err(BrokerError::config("ports.capacity must be at least 1"));
        }
        let last_port = u64::from(self.ports.base_port) + 2 * u64::from(self.ports.capacity) - 1;
        if last_port > u64::from(u16::MAX) {
            return Err(BrokerError::config(format!(
                "ports.base_port {} with capacity {} runs past port 65535",
                self.ports.base_port, self.ports.capacity
            )));
        }
        if self.gateway.request_timeout_ms == 0 {
            return Err(BrokerError::config("gateway.request_timeout_ms must be positive"));
        }
        if self.gateway.keepalive_interval_secs == 0 {
            return Err(BrokerError::config(
                "gateway.keepalive_interval_secs must be positive",
            ));
        }
        if self.gateway.videoroom_url.is_empty() || self.gateway.streaming_url.is_empty() {
            return Err(BrokerError::config("gateway URLs must not be empty"));
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            request_timeout: Duration::from_millis(self.gateway.request_timeout_ms),
            ..TransportConfig::default()
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            keepalive_interval: Duration::from_secs(self.gateway.keepalive_interval_secs),
            max_attach_retries: self.gateway.max_attach_retries,
        }
    }

    pub fn room_defaults(&self) -> RoomDefaults {
        RoomDefaults::with_secret(self.admin_secret.clone())
    }

    pub fn mountpoint_defaults(&self) -> MountpointDefaults {
        MountpointDefaults::with_secret(self.admin_secret.clone())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            admin_secret: self.admin_secret.clone(),
            endpoint_token: self.endpoints.token.clone(),
            recipient_host: self.endpoints.recipient_host.clone(),
        }
    }
}
