pub mod channels;
pub mod events;
pub mod health;

/// Channels in one DMX512 universe
pub const DMX_CHANNELS: usize = 512;

/// Default Art-Net UDP port
pub const DEFAULT_ARTNET_PORT: u16 = 6454;
pub const DEFAULT_UNIVERSE: u16 = 0;

/// Default uDMX USB identity (Anyma uDMX / V-USB shared ids)
pub const UDMX_VENDOR_ID: u16 = 0x16c0;
pub const UDMX_PRODUCT_ID: u16 = 0x05dc;

/// Reconnect backoff between device connect attempts
pub const DEFAULT_RECONNECT_MS: u64 = 1000;
/// Upper bound for a single device connect or write call
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;
