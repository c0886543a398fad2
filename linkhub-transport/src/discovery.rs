//! Device discovery over hidapi

use std::collections::HashSet;

use hidapi::{DeviceInfo, HidApi};
use tracing::{debug, info};

use crate::device_registry::{self, VENDOR_ID};
use crate::error::TransportError;
use crate::hid::HidIo;
use crate::protocol::Framing;
use crate::transport::HidTransport;
use crate::types::{DeviceFamily, TransportDeviceInfo};

/// Vendor usage pages start here
const VENDOR_USAGE_PAGE: u16 = 0xFF00;

/// A supported device found on the bus.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub info: TransportDeviceInfo,
    pub family: DeviceFamily,
}

/// Framing a family speaks on its primary interface
pub fn framing_for(family: DeviceFamily) -> Framing {
    match family {
        DeviceFamily::CommanderPro => Framing::CommanderPro,
        DeviceFamily::LinkHub => Framing::Link,
        DeviceFamily::Elite => Framing::Elite,
        DeviceFamily::K70Lux => Framing::Feature,
        DeviceFamily::LinkLcd
        | DeviceFamily::Keyboard
        | DeviceFamily::Zone
        | DeviceFamily::Slipstream => Framing::Command { route: 0x08 },
    }
}

/// HID device discovery for supported products
pub struct HidDiscovery {
    api: HidApi,
}

impl HidDiscovery {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            api: HidApi::new()?,
        })
    }

    fn to_info(dev: &DeviceInfo) -> TransportDeviceInfo {
        TransportDeviceInfo {
            vid: dev.vendor_id(),
            pid: dev.product_id(),
            device_path: dev.path().to_string_lossy().into_owned(),
            serial: dev.serial_number().map(str::to_string),
            manufacturer: dev.manufacturer_string().map(str::to_string),
            product_name: dev.product_string().map(str::to_string),
            interface: dev.interface_number(),
        }
    }

    /// List supported devices, one entry per physical device.
    ///
    /// The vendor-defined interface is preferred; when a device exposes
    /// none, its lowest interface is used.
    pub fn list(&mut self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        self.api.refresh_devices()?;

        let mut candidates: Vec<&DeviceInfo> = self
            .api
            .device_list()
            .filter(|d| d.vendor_id() == VENDOR_ID)
            .filter(|d| device_registry::family_for(d.vendor_id(), d.product_id()).is_some())
            .collect();
        candidates.sort_by_key(|d| {
            (
                d.product_id(),
                d.usage_page() < VENDOR_USAGE_PAGE,
                d.interface_number(),
            )
        });

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for dev in candidates {
            let key = (dev.product_id(), dev.serial_number().map(str::to_string));
            if !seen.insert(key) {
                continue;
            }
            let info = Self::to_info(dev);
            if let Some(family) = device_registry::family_for(info.vid, info.pid) {
                debug!(
                    "found {:04x}:{:04x} {:?} interface {}",
                    info.vid, info.pid, family, info.interface
                );
                found.push(DiscoveredDevice { info, family });
            }
        }
        info!("discovered {} supported devices", found.len());
        Ok(found)
    }

    /// Open the primary interface of a discovered device.
    pub fn open(&self, device: &DiscoveredDevice) -> Result<HidTransport, TransportError> {
        let path = std::ffi::CString::new(device.info.device_path.clone())
            .map_err(|e| TransportError::Internal(e.to_string()))?;
        let handle = self.api.open_path(&path)?;
        Ok(HidTransport::new(
            Box::new(handle),
            device.info.clone(),
            framing_for(device.family),
        ))
    }

    /// Open a specific interface of a device, matched by serial when one
    /// is given. Used for listener and LCD interfaces.
    pub fn open_interface(
        &self,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
        interface: i32,
    ) -> Result<Box<dyn HidIo>, TransportError> {
        let dev = self
            .api
            .device_list()
            .find(|d| {
                d.vendor_id() == vid
                    && d.product_id() == pid
                    && d.interface_number() == interface
                    && serial.map_or(true, |s| d.serial_number() == Some(s))
            })
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!(
                    "{vid:04x}:{pid:04x} interface {interface}"
                ))
            })?;
        let handle = dev.open_device(&self.api)?;
        Ok(Box::new(handle))
    }

    /// Open the first device with the given product id, any interface.
    pub fn open_product(&self, vid: u16, pid: u16) -> Result<Box<dyn HidIo>, TransportError> {
        let dev = self
            .api
            .device_list()
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or_else(|| TransportError::DeviceNotFound(format!("{vid:04x}:{pid:04x}")))?;
        Ok(Box::new(dev.open_device(&self.api)?))
    }
}
