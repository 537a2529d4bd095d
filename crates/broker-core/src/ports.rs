//! RTP port pair allocation
//!
//! Pairs are handed out sequentially from `base_port`: allocation `n`
//! yields `(base_port + 2n, base_port + 2n + 1)` for audio and video. The
//! counter only moves forward until an explicit reset.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BrokerError, Result};

/// One audio/video UDP port allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortPair {
    pub audio_port: u16,
    pub video_port: u16,
}

/// Read-only view of the allocator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortStatus {
    pub counter: u32,
    pub capacity: u32,
    pub base_port: u16,
    pub next_pair: Option<PortPair>,
}

/// Bounded sequential allocator of port pairs.
///
/// The read-compute-increment sequence runs under one lock, so concurrent
/// callers never observe the same counter value.
#[derive(Debug)]
pub struct PortAllocator {
    base_port: u16,
    capacity: u32,
    counter: Mutex<u32>,
}

impl PortAllocator {
    /// Create an allocator for `capacity` pairs starting at `base_port`.
    ///
    /// Fails if the range would run past port 65535.
    pub fn new(base_port: u16, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(BrokerError::config("port capacity must be at least 1"));
        }
        let last_port = u32::from(base_port) + 2 * capacity - 1;
        if last_port > u32::from(u16::MAX) {
            return Err(BrokerError::config(format!(
                "{} port pairs from {} would end at port {}",
                capacity, base_port, last_port
            )));
        }

        Ok(Self {
            base_port,
            capacity,
            counter: Mutex::new(0),
        })
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn pair_at(&self, index: u32) -> PortPair {
        // in range: checked against u16::MAX in new()
        let audio_port = (u32::from(self.base_port) + 2 * index) as u16;
        PortPair {
            audio_port,
            video_port: audio_port + 1,
        }
    }

    /// Allocate the next pair, or fail with
    /// [`BrokerError::ResourceExhausted`] leaving the counter untouched
    pub fn next_pair(&self) -> Result<PortPair> {
        let mut counter = self.counter.lock();
        if *counter >= self.capacity {
            return Err(BrokerError::ResourceExhausted {
                capacity: self.capacity,
            });
        }

        let pair = self.pair_at(*counter);
        *counter += 1;
        debug!(
            "Allocated ports audio={} video={} ({}/{})",
            pair.audio_port, pair.video_port, *counter, self.capacity
        );
        Ok(pair)
    }

    /// Rewind the counter to zero.
    ///
    /// Outstanding allocations are not tracked, so rewinding while pairs are
    /// still in use leads to port reuse. Without `force`, a reset is refused
    /// once any pair has been handed out. Returns the counter value before
    /// the reset.
    pub fn reset(&self, force: bool) -> Result<u32> {
        let mut counter = self.counter.lock();
        let previous = *counter;
        if previous > 0 && !force {
            return Err(BrokerError::precondition(format!(
                "{} port pairs may still be in use; reset with force to reuse them",
                previous
            )));
        }

        if previous > 0 {
            warn!("Port allocator forcibly reset with {} pairs handed out", previous);
        }
        *counter = 0;
        Ok(previous)
    }

    pub fn status(&self) -> PortStatus {
        let counter = *self.counter.lock();
        PortStatus {
            counter,
            capacity: self.capacity,
            base_port: self.base_port,
            next_pair: (counter < self.capacity).then(|| self.pair_at(counter)),
        }
    }
}
