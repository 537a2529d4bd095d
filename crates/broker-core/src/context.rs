//! Wiring of services, allocator and endpoint servers

use std::sync::Arc;
use tracing::info;

use mediabroker_gateway_core::{GatewayTransport, HttpTransport};

use crate::config::BrokerConfig;
use crate::endpoints::{EgressServer, IngestServer};
use crate::error::Result;
use crate::orchestrator::SessionOrchestrator;
use crate::ports::PortAllocator;
use crate::services::{StreamingService, VideoRoomService};

/// Everything a front end needs, built once at startup and shared
#[derive(Clone)]
pub struct BrokerContext {
    config: Arc<BrokerConfig>,
    orchestrator: Arc<SessionOrchestrator>,
    ingest: Arc<IngestServer>,
    egress: Arc<EgressServer>,
}

impl BrokerContext {
    /// Build the context with HTTP transports to the configured gateways
    pub fn from_config(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        let transport_config = config.transport_config();
        let videoroom = HttpTransport::new(config.gateway.videoroom_url.clone(), &transport_config)?;
        let streaming = HttpTransport::new(config.gateway.streaming_url.clone(), &transport_config)?;
        info!(
            "Gateways: videoroom={} streaming={}",
            videoroom.base_url(),
            streaming.base_url()
        );

        Self::with_transports(config, Arc::new(videoroom), Arc::new(streaming))
    }

    /// Build the context on caller-supplied transports
    pub fn with_transports(
        config: BrokerConfig,
        videoroom: Arc<dyn GatewayTransport>,
        streaming: Arc<dyn GatewayTransport>,
    ) -> Result<Self> {
        let settings = config.service_settings();
        let rooms = Arc::new(VideoRoomService::connect(
            videoroom,
            &settings,
            config.room_defaults(),
        ));
        let streams = Arc::new(StreamingService::connect(
            streaming,
            &settings,
            config.mountpoint_defaults(),
        ));
        let ports = Arc::new(PortAllocator::new(
            config.ports.base_port,
            config.ports.capacity,
        )?);
        let ingest = Arc::new(IngestServer::new(config.endpoints.ingest_base_path.clone()));
        let egress = Arc::new(EgressServer::new(config.endpoints.egress_base_path.clone()));

        let orchestrator = Arc::new(SessionOrchestrator::new(
            rooms,
            streams,
            ports,
            ingest.clone(),
            egress.clone(),
            config.orchestrator_settings(),
        ));

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            ingest,
            egress,
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<SessionOrchestrator> {
        &self.orchestrator
    }

    pub fn rooms(&self) -> &Arc<VideoRoomService> {
        self.orchestrator.rooms()
    }

    pub fn streams(&self) -> &Arc<StreamingService> {
        self.orchestrator.streams()
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        self.orchestrator.ports()
    }

    pub fn ingest(&self) -> &Arc<IngestServer> {
        &self.ingest
    }

    pub fn egress(&self) -> &Arc<EgressServer> {
        &self.egress
    }
}
