//! Transport layer for Corsair-compatible hubs, coolers and peripherals
//!
//! This crate owns everything between a driver and the USB wire:
//!
//! - the [`HidIo`] seam over `hidapi` (and an in-memory [`mock`] device)
//! - per-family packet framing ([`protocol`]), including the CRC-8 framed
//!   Elite packets and the iCUE LINK header layout
//! - the serialised [`HidTransport`] every driver talks through
//! - LCD report framing, the unsolicited report reader loop and discovery

pub mod crc;
pub mod device_registry;
pub mod error;
pub mod lcd;
pub mod listener;
pub mod mock;
pub mod protocol;
pub mod types;

mod discovery;
mod hid;
mod transport;

pub use device_registry::{family_for, is_dongle_pid, VENDOR_ID};
pub use discovery::{framing_for, DiscoveredDevice, HidDiscovery};
pub use error::TransportError;
pub use hid::HidIo;
pub use listener::{run_report_loop, ListenerConfig};
pub use protocol::Framing;
pub use transport::{DeviceStrings, HidTransport};
pub use types::{DeviceFamily, TransportDeviceInfo};
