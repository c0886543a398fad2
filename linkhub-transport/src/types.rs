//! Common types for transport layer

use serde::Serialize;

/// Protocol family a product id belongs to.
///
/// The family decides the framing used on the wire and which driver
/// the runtime instantiates for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceFamily {
    /// Commander Pro fan/RGB controller
    CommanderPro,
    /// iCUE LINK system hub
    LinkHub,
    /// LCD cap on an iCUE LINK AIO (secondary interface)
    LinkLcd,
    /// Elite/Platinum style AIO with CRC framing
    Elite,
    /// K70 LUX programmable keyboard (feature reports)
    K70Lux,
    /// Modern keyboards (MK2 / Core TKL / K100 Air)
    Keyboard,
    /// Zone-addressed accessories (ST100 stand, MM700 mousepad)
    Zone,
    /// Slipstream wireless receiver
    Slipstream,
}

impl DeviceFamily {
    /// True for families that carry fan or pump channels.
    pub fn has_cooling(&self) -> bool {
        matches!(self, Self::CommanderPro | Self::LinkHub | Self::Elite)
    }
}

/// Device identification information
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Manufacturer string if available
    pub manufacturer: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
    /// USB interface number
    pub interface: i32,
}

impl TransportDeviceInfo {
    /// Serial to key profiles by.
    ///
    /// Some products return an empty serial; the product id is used instead
    /// so profile files still have a stable name.
    pub fn effective_serial(&self) -> String {
        match self.serial.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => format!("{:04x}{:04x}", self.vid, self.pid),
        }
    }

    /// Product name or a hex fallback.
    pub fn product(&self) -> String {
        self.product_name
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| format!("Device {:04x}:{:04x}", self.vid, self.pid))
    }
}
