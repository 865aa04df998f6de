//! Health API wire types.
//!
//! JSON shapes served by the bridge's optional health endpoint:
//!   GET /health -> `HealthReport`
//!   GET /health/config -> `ConfigEcho`
//!   GET /health/history -> `[WriteRecord]`

use serde::{Deserialize, Serialize};

/// Maximum number of frames kept in the health history (oldest evicted).
pub const HISTORY_LIMIT: usize = 10_000;

/// One received Art-Net frame as recorded by the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// Sender IP address
    pub peer: String,
    pub universe: u16,
    pub data: Vec<u8>,
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// True iff the DMX device is connected
    pub healthy: bool,
    pub last_write: Option<WriteRecord>,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtnetEcho {
    pub port: u16,
    pub universe: u16,
}

/// Response body of `GET /health/config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEcho {
    pub artnet: ArtnetEcho,
}
