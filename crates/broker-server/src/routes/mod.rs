//! HTTP routes
//!
//! - `/api/videoroom/rooms[...]` - room CRUD
//! - `/api/streaming/mountpoints[...]` - mountpoint CRUD
//! - `POST /api/sessions` - full session creation
//! - `GET /api/status` - aggregate status
//! - `GET /api/ports`, `POST /api/ports/reset` - port allocator

pub mod ports;
pub mod sessions;
pub mod status;
pub mod streaming;
pub mod videoroom;

use serde::Deserialize;

/// Optional body of `DELETE` routes
#[derive(Debug, Default, Deserialize)]
pub struct SecretBody {
    pub secret: Option<String>,
}
