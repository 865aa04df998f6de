//! Events flowing from the bridge engine to observers.

use std::net::SocketAddr;

/// Device connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Open attempt in flight
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// A decoded Art-Net DMX frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightingFrame {
    pub universe: u16,
    /// Up to 512 channel values, channel 1 first
    pub data: Vec<u8>,
    /// Sender of the datagram
    pub origin: SocketAddr,
}

/// Notification pushed to the event relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    DeviceConnected,
    DeviceDisconnected,
    /// Every received frame, whatever its universe
    FramePayload {
        universe: u16,
        origin: SocketAddr,
        data: Vec<u8>,
    },
}

impl BridgeEvent {
    pub fn frame(frame: &LightingFrame) -> Self {
        Self::FramePayload {
            universe: frame.universe,
            origin: frame.origin,
            data: frame.data.clone(),
        }
    }
}
