//! uDMX interface over libusb.
//!
//! The uDMX firmware takes one vendor control-out request per channel:
//!   bmRequestType = vendor | device | host-to-device
//!   bRequest      = 1 (SetSingleChannel)
//!   wValue        = channel value
//!   wIndex        = 0-based channel
//! No data stage.

use std::time::Duration;

use rusb::{Direction, GlobalContext, Recipient, RequestType};
use tracing::{debug, info};

use crate::{check_channel, DeviceError, DmxDriver, DmxOutput, Result};

const CMD_SET_SINGLE_CHANNEL: u8 = 1;

/// Per-transfer USB timeout.
const USB_TIMEOUT: Duration = Duration::from_millis(100);

pub struct UdmxDriver {
    vendor_id: u16,
    product_id: u16,
}

impl UdmxDriver {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl DmxDriver for UdmxDriver {
    fn open(&self) -> Result<Box<dyn DmxOutput>> {
        let handle = rusb::open_device_with_vid_pid(self.vendor_id, self.product_id).ok_or(
            DeviceError::NotFound {
                vendor_id: self.vendor_id,
                product_id: self.product_id,
            },
        )?;

        // Product string is cosmetic; fall back silently
        let name = handle
            .device()
            .device_descriptor()
            .ok()
            .and_then(|desc| handle.read_product_string_ascii(&desc).ok())
            .unwrap_or_else(|| "uDMX".to_string());

        info!(
            device = %name,
            vid = format!("{:04x}", self.vendor_id),
            pid = format!("{:04x}", self.product_id),
            "Opened uDMX interface"
        );

        Ok(Box::new(UdmxOutput { handle, name }))
    }

    fn describe(&self) -> String {
        format!("uDMX {:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

struct UdmxOutput {
    handle: rusb::DeviceHandle<GlobalContext>,
    name: String,
}

impl DmxOutput for UdmxOutput {
    fn set_channel(&mut self, channel: u16, value: u8) -> Result<()> {
        check_channel(channel)?;
        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.handle.write_control(
            request_type,
            CMD_SET_SINGLE_CHANNEL,
            value as u16,
            channel - 1,
            &[],
            USB_TIMEOUT,
        )?;
        debug!(channel, value, "uDMX set");
        Ok(())
    }

    fn device_name(&self) -> &str {
        &self.name
    }
}
