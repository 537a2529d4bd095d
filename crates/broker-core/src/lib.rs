//! # Broker-Core
//!
//! Media session broker on top of two Janus-style gateways: one serving
//! multi-party rooms (videoroom plugin) and one serving RTP mountpoints
//! (streaming plugin).
//!
//! This crate provides:
//! - [`PortAllocator`]: bounded sequential RTP port pairs
//! - [`VideoRoomService`] / [`StreamingService`]: room and mountpoint CRUD
//!   with default tables the caller can override
//! - [`EndpointServer`]: ingest/egress endpoint registration, with an
//!   in-memory implementation
//! - [`SessionOrchestrator`]: one call that creates room, ports, mountpoint
//!   and endpoints for a session, rolling back on failure
//! - [`BrokerConfig`] and [`BrokerContext`] for wiring it all together
//!
//! ## Example
//!
//! ```no_run
//! use mediabroker_broker_core::{BrokerConfig, BrokerContext, MountpointConfig, RoomConfig};
//!
//! # async fn run() -> mediabroker_broker_core::Result<()> {
//! let context = BrokerContext::from_config(BrokerConfig::load(None)?)?;
//! context.orchestrator().start().await?;
//!
//! let session = context
//!     .orchestrator()
//!     .create_full_session("42", RoomConfig::default(), MountpointConfig::default())
//!     .await?;
//! println!("publish on {}", session.endpoints.ingest);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod endpoints;
pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod services;

pub use config::BrokerConfig;
pub use context::BrokerContext;
pub use endpoints::{
    EgressEndpointConfig, EgressServer, EndpointDescriptor, EndpointServer,
    InMemoryEndpointServer, IngestEndpointConfig, IngestServer, RtpRecipient,
};
pub use error::{BrokerError, Result};
pub use orchestrator::{
    derive_room_id, BrokerStatus, FullSession, OrchestratorSettings, ServiceStatus,
    SessionOrchestrator, StartupReport,
};
pub use ports::{PortAllocator, PortPair, PortStatus};
pub use services::{
    MountpointConfig, MountpointDefaults, RoomConfig, RoomDefaults, ServiceInfo,
    ServiceSettings, StreamingService, VideoRoomService,
};
