//! Transport used to reach the gateway
//!
//! [`GatewayTransport`] is the seam between the control-plane state
//! machines and the wire. [`HttpTransport`] is the production
//! implementation: JSON envelopes POSTed over HTTP with an explicit
//! request timeout.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::protocol::{GatewayPath, GatewayRequest};

/// Sends one request envelope and returns the raw reply envelope.
///
/// Implementations only report transport-level failures; decoding the
/// envelope is left to [`crate::protocol::decode_reply`].
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn send(&self, path: GatewayPath, request: &GatewayRequest) -> Result<Value>;
}

/// HTTP transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total time allowed for one request/response round trip
    pub request_timeout: Duration,
    /// Time allowed to establish the TCP connection
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// JSON-over-HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the gateway at `base_url` (e.g. `http://janus:8088`)
    pub fn new(base_url: impl Into<String>, config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: GatewayPath) -> String {
        format!("{}{}", self.base_url, path.to_path())
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn send(&self, path: GatewayPath, request: &GatewayRequest) -> Result<Value> {
        let url = self.url_for(path);
        debug!(
            "POST {} janus={} transaction={}",
            url,
            request.janus.as_str(),
            request.transaction
        );

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(GatewayError::transport(format!(
                "gateway answered HTTP {} to {}",
                status, url
            ))),
            Err(e) => Err(GatewayError::transport(format!(
                "gateway reply from {} is not JSON: {}",
                url, e
            ))),
        }
    }
}
