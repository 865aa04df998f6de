//! DMX output device abstraction.
//!
//! A `DmxDriver` knows how to find and open one physical interface; every
//! successful `open()` yields a fresh `DmxOutput` handle. The bridge drops a
//! handle as soon as a write fails and asks the driver for a new one, so a
//! driver never has to model reconnection itself.
//!
//! Implementations:
//!   - `platform::udmx`   : Anyma-style uDMX over libusb (`rusb`)
//!   - `platform::memory` : in-process recorder with fault injection

pub mod platform;

use dmx_protocol::DMX_CHANNELS;
use thiserror::Error;

/// Device path errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No USB device with the configured identity is attached
    #[error("no device with id {vendor_id:04x}:{product_id:04x} found")]
    NotFound { vendor_id: u16, product_id: u16 },

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Channel outside 1..=512
    #[error("invalid DMX channel {0}")]
    InvalidChannel(u16),

    #[error("device error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// An open connection to a DMX interface.
pub trait DmxOutput: Send {
    /// Set one channel. `channel` is the 1-based DMX channel number.
    fn set_channel(&mut self, channel: u16, value: u8) -> Result<()>;

    /// Human-readable device name for logs.
    fn device_name(&self) -> &str;
}

/// Opens connections to one kind of DMX interface.
pub trait DmxDriver: Send + Sync {
    fn open(&self) -> Result<Box<dyn DmxOutput>>;

    /// Short description of what this driver looks for (e.g. "uDMX 16c0:05dc").
    fn describe(&self) -> String;
}

/// Reject channel numbers outside the universe.
pub fn check_channel(channel: u16) -> Result<()> {
    if channel == 0 || channel as usize > DMX_CHANNELS {
        return Err(DeviceError::InvalidChannel(channel));
    }
    Ok(())
}

/// Create the uDMX driver for the given USB identity.
pub fn create_driver(vendor_id: u16, product_id: u16) -> Box<dyn DmxDriver> {
    Box::new(platform::udmx::UdmxDriver::new(vendor_id, product_id))
}
