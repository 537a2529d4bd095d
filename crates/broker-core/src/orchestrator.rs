//! Full-session orchestration
//!
//! A full session is one room, one port pair, one RTP mountpoint fed on those
//! ports, and an ingest plus an egress endpoint. Every step that succeeds
//! leaves a compensation behind; if a later step fails, the compensations run
//! in reverse order before the original error is returned.

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::endpoints::{
    EgressEndpointConfig, EndpointDescriptor, EndpointServer, IngestEndpointConfig, RtpRecipient,
};
use crate::error::{BrokerError, Result};
use crate::ports::{PortAllocator, PortPair, PortStatus};
use crate::services::room::DEFAULT_ADMIN_SECRET;
use crate::services::{
    layer_configs, MountpointConfig, RoomConfig, ServiceInfo, StreamingService, VideoRoomService,
};

/// Upper bound (inclusive) of room ids derived from non-numeric session ids
pub const DERIVED_ID_MODULUS: u64 = 999_999_999;

pub type DynIngestServer = dyn EndpointServer<Config = IngestEndpointConfig>;
pub type DynEgressServer = dyn EndpointServer<Config = EgressEndpointConfig>;

/// Values stamped into every orchestrated session
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub admin_secret: String,
    pub endpoint_token: String,
    pub recipient_host: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            admin_secret: DEFAULT_ADMIN_SECRET.to_string(),
            endpoint_token: "verysecret".to_string(),
            recipient_host: "janus-streaming".to_string(),
        }
    }
}

/// Locators of the two endpoints of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointLocators {
    #[serde(rename = "whip")]
    pub ingest: String,
    #[serde(rename = "whep")]
    pub egress: String,
}

/// Result of [`SessionOrchestrator::create_full_session`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSession {
    pub session_id: String,
    pub room_id: u64,
    pub mountpoint_id: u64,
    pub room: Value,
    pub mountpoint: Value,
    pub endpoints: EndpointLocators,
    pub ports: PortPair,
}

/// Outcome of one plugin read in [`BrokerStatus`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub data: Value,
}

impl ServiceStatus {
    fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self { status: "ok", data },
            Err(e) => Self {
                status: "error",
                data: json!({"error": e.to_string()}),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointListing {
    pub whip: Vec<EndpointDescriptor<IngestEndpointConfig>>,
    pub whep: Vec<EndpointDescriptor<EgressEndpointConfig>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySessions {
    pub video_room: ServiceInfo,
    pub streaming: ServiceInfo,
}

/// Aggregate broker status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    pub video_room: ServiceStatus,
    pub streaming: ServiceStatus,
    pub ports: PortStatus,
    pub endpoints: EndpointListing,
    pub sessions: GatewaySessions,
}

/// Readiness of the two services after [`SessionOrchestrator::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub video_room_ready: bool,
    pub streaming_ready: bool,
}

#[derive(Debug)]
enum Compensation {
    DestroyRoom { room: u64, secret: Option<String> },
    DestroyMountpoint { id: u64, secret: Option<String> },
    RemoveIngest { id: String },
    RemoveEgress { id: String },
    ReleasePorts { pair: PortPair },
}

/// Numeric room/mountpoint id for `session_id`.
///
/// Numeric ids pass through; anything else is hashed into
/// `1..=DERIVED_ID_MODULUS`, always yielding the same value for the same id.
pub fn derive_room_id(session_id: &str) -> Result<u64> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(BrokerError::invalid_input("sessionId is required"));
    }
    if let Ok(numeric) = session_id.parse::<u64>() {
        return Ok(numeric);
    }

    let digest = Sha256::digest(session_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(prefix) % DERIVED_ID_MODULUS + 1)
}

/// Creates and tears down full sessions across both gateways
pub struct SessionOrchestrator {
    rooms: Arc<VideoRoomService>,
    streams: Arc<StreamingService>,
    ports: Arc<PortAllocator>,
    ingest: Arc<DynIngestServer>,
    egress: Arc<DynEgressServer>,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    pub fn new(
        rooms: Arc<VideoRoomService>,
        streams: Arc<StreamingService>,
        ports: Arc<PortAllocator>,
        ingest: Arc<DynIngestServer>,
        egress: Arc<DynEgressServer>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            rooms,
            streams,
            ports,
            ingest,
            egress,
            settings,
        }
    }

    pub fn rooms(&self) -> &Arc<VideoRoomService> {
        &self.rooms
    }

    pub fn streams(&self) -> &Arc<StreamingService> {
        &self.streams
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Start both endpoint servers, then attach both plugins
    pub async fn start(&self) -> Result<StartupReport> {
        self.ingest.start().await?;
        self.egress.start().await?;

        let (video_room_ready, streaming_ready) =
            tokio::join!(self.rooms.init(), self.streams.init());
        info!(
            "VideoRoom API: {}, Streaming API: {}",
            if video_room_ready { "ready" } else { "error" },
            if streaming_ready { "ready" } else { "error" }
        );

        Ok(StartupReport {
            video_room_ready,
            streaming_ready,
        })
    }

    /// Create room, ports, mountpoint and both endpoints for `session_id`.
    ///
    /// Caller overrides win over the session defaults, except the mountpoint
    /// RTP ports, which always come from the allocator.
    pub async fn create_full_session(
        &self,
        session_id: &str,
        room_overrides: RoomConfig,
        stream_overrides: MountpointConfig,
    ) -> Result<FullSession> {
        let derived_id = derive_room_id(session_id)?;
        let session_id = session_id.trim();

        let mut undo = Vec::new();
        match self
            .create_steps(session_id, derived_id, room_overrides, stream_overrides, &mut undo)
            .await
        {
            Ok(session) => {
                info!(
                    "Session {} created (room {}, mountpoint {}, ports {}/{})",
                    session_id,
                    session.room_id,
                    session.mountpoint_id,
                    session.ports.audio_port,
                    session.ports.video_port
                );
                Ok(session)
            }
            Err(e) => {
                error!("Session {} creation failed: {}", session_id, e);
                self.compensate(session_id, undo).await;
                Err(e)
            }
        }
    }

    async fn create_steps(
        &self,
        session_id: &str,
        derived_id: u64,
        room_overrides: RoomConfig,
        stream_overrides: MountpointConfig,
        undo: &mut Vec<Compensation>,
    ) -> Result<FullSession> {
        let admin_secret = self.settings.admin_secret.clone();

        let room_defaults = RoomConfig {
            room: Some(derived_id),
            description: Some(format!("Session {}", session_id)),
            secret: Some(admin_secret.clone()),
            ..Default::default()
        };
        let room_config = layer_configs(&room_defaults, &room_overrides)?;
        let room_id = room_config.room.unwrap_or(derived_id);
        let room_secret = room_config.secret.clone();

        let room = self.rooms.create_room(room_config).await?;
        undo.push(Compensation::DestroyRoom {
            room: room_id,
            secret: room_secret,
        });

        let ports = self.ports.next_pair()?;
        undo.push(Compensation::ReleasePorts { pair: ports });

        let stream_defaults = MountpointConfig {
            id: Some(derived_id),
            description: Some(format!("Stream for session {}", session_id)),
            secret: Some(admin_secret.clone()),
            ..Default::default()
        };
        let mut stream_config = layer_configs(&stream_defaults, &stream_overrides)?;
        if stream_overrides.audioport.is_some() || stream_overrides.videoport.is_some() {
            warn!(
                "Session {}: ignoring caller RTP ports, using allocated {}/{}",
                session_id, ports.audio_port, ports.video_port
            );
        }
        stream_config.audioport = Some(ports.audio_port);
        stream_config.videoport = Some(ports.video_port);
        let mountpoint_id = stream_config.id.unwrap_or(derived_id);
        let mountpoint_secret = stream_config.secret.clone();

        let mountpoint = self.streams.create_mountpoint(stream_config).await?;
        undo.push(Compensation::DestroyMountpoint {
            id: mountpoint_id,
            secret: mountpoint_secret,
        });

        let ingest = self
            .ingest
            .create_endpoint(IngestEndpointConfig {
                id: session_id.to_string(),
                room: room_id,
                token: self.settings.endpoint_token.clone(),
                secret: admin_secret,
                recipient: RtpRecipient {
                    host: self.settings.recipient_host.clone(),
                    audio_port: ports.audio_port,
                    video_port: ports.video_port,
                },
            })
            .await?;
        undo.push(Compensation::RemoveIngest {
            id: session_id.to_string(),
        });

        let egress = self
            .egress
            .create_endpoint(EgressEndpointConfig {
                id: session_id.to_string(),
                mountpoint: mountpoint_id,
                token: self.settings.endpoint_token.clone(),
            })
            .await?;
        undo.push(Compensation::RemoveEgress {
            id: session_id.to_string(),
        });

        Ok(FullSession {
            session_id: session_id.to_string(),
            room_id,
            mountpoint_id,
            room,
            mountpoint,
            endpoints: EndpointLocators { ingest, egress },
            ports,
        })
    }

    async fn compensate(&self, session_id: &str, undo: Vec<Compensation>) {
        for step in undo.into_iter().rev() {
            let outcome = match &step {
                Compensation::DestroyRoom { room, secret } => self
                    .rooms
                    .destroy_room(*room, secret.as_deref())
                    .await
                    .map(|_| ()),
                Compensation::DestroyMountpoint { id, secret } => self
                    .streams
                    .destroy_mountpoint(*id, secret.as_deref())
                    .await
                    .map(|_| ()),
                Compensation::RemoveIngest { id } => {
                    self.ingest.destroy_endpoint(id).await.map(|_| ())
                }
                Compensation::RemoveEgress { id } => {
                    self.egress.destroy_endpoint(id).await.map(|_| ())
                }
                Compensation::ReleasePorts { pair } => {
                    // sequential allocator: the pair stays consumed until a reset
                    warn!(
                        "Session {}: ports {}/{} stay consumed until the allocator is reset",
                        session_id, pair.audio_port, pair.video_port
                    );
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                error!("Session {}: rollback step {:?} failed: {}", session_id, step, e);
            }
        }
    }

    /// Room and mountpoint listings, port status and endpoint registries.
    ///
    /// Plugin failures are reported inside the status, not returned.
    pub async fn status(&self) -> BrokerStatus {
        let (rooms, mountpoints, whip, whep, room_info, stream_info) = tokio::join!(
            self.rooms.list_rooms(),
            self.streams.list_mountpoints(),
            self.ingest.list_endpoints(),
            self.egress.list_endpoints(),
            self.rooms.info(),
            self.streams.info(),
        );

        BrokerStatus {
            video_room: ServiceStatus::from_result(rooms),
            streaming: ServiceStatus::from_result(mountpoints),
            ports: self.ports.status(),
            endpoints: EndpointListing { whip, whep },
            sessions: GatewaySessions {
                video_room: room_info,
                streaming: stream_info,
            },
        }
    }

    /// Rewind the port allocator; see [`PortAllocator::reset`]
    pub fn reset_ports(&self, force: bool) -> Result<u32> {
        self.ports.reset(force)
    }

    /// Destroy both gateway sessions
    pub async fn shutdown(&self) {
        tokio::join!(self.rooms.shutdown(), self.streams.shutdown());
        info!("Gateway sessions destroyed");
    }
}
