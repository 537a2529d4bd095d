//! Ingest (WHIP) and egress (WHEP) endpoint collaborators
//!
//! The orchestrator only needs to register and remove endpoints; serving the
//! signalling itself is left to whatever implements [`EndpointServer`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::error::{BrokerError, Result};

/// Where an ingest endpoint forwards the RTP it receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpRecipient {
    pub host: String,
    pub audio_port: u16,
    pub video_port: u16,
}

/// Publisher-side endpoint bound to a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEndpointConfig {
    pub id: String,
    pub room: u64,
    pub token: String,
    pub secret: String,
    pub recipient: RtpRecipient,
}

/// Viewer-side endpoint bound to a mountpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressEndpointConfig {
    pub id: String,
    pub mountpoint: u64,
    pub token: String,
}

/// Registered endpoint as reported by `list_endpoints`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor<C> {
    pub id: String,
    pub locator: String,
    pub config: C,
    pub created_at: DateTime<Utc>,
}

/// Endpoint configurations that carry their own id
pub trait EndpointConfig: Clone + Send + Sync + 'static {
    fn endpoint_id(&self) -> &str;
}

impl EndpointConfig for IngestEndpointConfig {
    fn endpoint_id(&self) -> &str {
        &self.id
    }
}

impl EndpointConfig for EgressEndpointConfig {
    fn endpoint_id(&self) -> &str {
        &self.id
    }
}

/// A server that publishes signalling endpoints
#[async_trait]
pub trait EndpointServer: Send + Sync {
    type Config: EndpointConfig;

    async fn start(&self) -> Result<()>;

    /// Register an endpoint and return its locator
    async fn create_endpoint(&self, config: Self::Config) -> Result<String>;

    async fn list_endpoints(&self) -> Vec<EndpointDescriptor<Self::Config>>;

    /// Remove an endpoint; `false` if it was not registered
    async fn destroy_endpoint(&self, id: &str) -> Result<bool>;
}

/// Endpoint registry kept in memory, with locators under `base_path`
pub struct InMemoryEndpointServer<C> {
    base_path: String,
    started: AtomicBool,
    endpoints: DashMap<String, EndpointDescriptor<C>>,
}

pub type IngestServer = InMemoryEndpointServer<IngestEndpointConfig>;
pub type EgressServer = InMemoryEndpointServer<EgressEndpointConfig>;

impl<C: EndpointConfig> InMemoryEndpointServer<C> {
    pub fn new(base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
            started: AtomicBool::new(false),
            endpoints: DashMap::new(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn locator(&self, id: &str) -> String {
        format!("{}/endpoint/{}", self.base_path, id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[async_trait]
impl<C> EndpointServer for InMemoryEndpointServer<C>
where
    C: EndpointConfig,
{
    type Config = C;

    async fn start(&self) -> Result<()> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("Endpoint server started on {}", self.base_path);
        }
        Ok(())
    }

    async fn create_endpoint(&self, config: C) -> Result<String> {
        if !self.is_started() {
            return Err(BrokerError::precondition(format!(
                "endpoint server {} is not started",
                self.base_path
            )));
        }

        let id = config.endpoint_id().to_string();
        if id.is_empty() {
            return Err(BrokerError::invalid_input("endpoint id must not be empty"));
        }

        let locator = self.locator(&id);
        match self.endpoints.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BrokerError::endpoint(format!(
                "endpoint {} already exists",
                locator
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(EndpointDescriptor {
                    id,
                    locator: locator.clone(),
                    config,
                    created_at: Utc::now(),
                });
                debug!("Registered endpoint {}", locator);
                Ok(locator)
            }
        }
    }

    async fn list_endpoints(&self) -> Vec<EndpointDescriptor<C>> {
        let mut endpoints: Vec<_> = self
            .endpoints
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        endpoints
    }

    async fn destroy_endpoint(&self, id: &str) -> Result<bool> {
        let removed = self.endpoints.remove(id).is_some();
        if removed {
            debug!("Removed endpoint {}", self.locator(id));
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn egress(id: &str) -> EgressEndpointConfig {
        EgressEndpointConfig {
            id: id.to_string(),
            mountpoint: 7,
            token: "verysecret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_requires_start() {
        let server = EgressServer::new("/whep");
        let err = server.create_endpoint(egress("s1")).await.unwrap_err();
        assert!(matches!(err, BrokerError::Precondition { .. }));

        server.start().await.unwrap();
        assert_eq!(
            server.create_endpoint(egress("s1")).await.unwrap(),
            "/whep/endpoint/s1"
        );
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let server = EgressServer::new("/whep/");
        server.start().await.unwrap();
        server.create_endpoint(egress("s1")).await.unwrap();

        let err = server.create_endpoint(egress("s1")).await.unwrap_err();
        assert!(matches!(err, BrokerError::Endpoint { .. }));
        assert_eq!(server.len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_destroy() {
        let server = IngestServer::new("/whip");
        server.start().await.unwrap();
        server
            .create_endpoint(IngestEndpointConfig {
                id: "s1".into(),
                room: 42,
                token: "verysecret".into(),
                secret: "adminpwd".into(),
                recipient: RtpRecipient {
                    host: "janus-streaming".into(),
                    audio_port: 10002,
                    video_port: 10003,
                },
            })
            .await
            .unwrap();

        let listed = server.list_endpoints().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].locator, "/whip/endpoint/s1");

        let json = serde_json::to_value(&listed[0]).unwrap();
        assert_eq!(json["config"]["recipient"]["audioPort"], 10002);

        assert!(server.destroy_endpoint("s1").await.unwrap());
        assert!(!server.destroy_endpoint("s1").await.unwrap());
        assert!(server.is_empty());
    }
}
