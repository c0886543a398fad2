//! Slipstream wireless receiver
//!
//! The receiver multiplexes up to two paired devices over one interface.
//! Each device is addressed by a route byte derived from its type; the
//! receiver itself only lists pairings and relays heartbeats.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use linkhub_transport::{run_report_loop, DeviceFamily, HidIo, HidTransport, ListenerConfig};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::catalog::{wireless_model, PairedKind};
use super::channel::{Channel, ChannelKind};
use super::command::{op, source, Commands};
use super::core::DriverCore;
use super::wireless::{Paired, PairedDevice, WirelessBase};
use super::{DeviceDriver, DeviceState};
use crate::context::Context;
use crate::error::{Result, Status};
use crate::profile::DeviceProfile;

/// Data type of the pairing list response
pub const PAIRED_LIST: [u8; 2] = [0x21, 0x00];
/// Route of the only paired device
pub const SINGLE_ROUTE: u8 = 0x09;
const ROUTE_BASE: u8 = 0x08;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const INACTIVITY_INTERVAL: Duration = Duration::from_secs(5);
const STATUS_CONNECTED: u8 = 0x12;

/// One pairing reported by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedEntry {
    pub vid: u16,
    pub pid: u16,
    pub device_type: u8,
    pub serial: String,
    pub route: u8,
}

/// Decode the pairing list: `[6]=count`, entries from offset 7 as
/// `[vid lo, vid hi, pid lo, pid hi, type, serialLen, serial…]`.
pub fn parse_paired(resp: &[u8]) -> Vec<PairedEntry> {
    let count = resp.get(6).copied().unwrap_or(0) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut pos = 7;
    for _ in 0..count {
        let Some(h) = resp.get(pos..pos + 6) else {
            break;
        };
        let serial_len = usize::from(h[5]);
        let end = (pos + 6 + serial_len).min(resp.len());
        let device_type = h[4];
        entries.push(PairedEntry {
            vid: u16::from_le_bytes([h[0], h[1]]),
            pid: u16::from_le_bytes([h[2], h[3]]),
            device_type,
            serial: String::from_utf8_lossy(&resp[pos + 6..end]).into_owned(),
            route: if count == 1 {
                SINGLE_ROUTE
            } else {
                ROUTE_BASE + device_type
            },
        });
        pos += 6 + serial_len;
    }
    entries
}

/// Connection state carried by a heartbeat response, if any.
pub fn heartbeat_state(resp: &[u8]) -> Option<bool> {
    if !matches!(resp.first(), Some(1..=3)) {
        return None;
    }
    match *resp.get(1)? {
        STATUS_CONNECTED => Some(true),
        0x00 | 0x01 => Some(false),
        _ => None,
    }
}

/// Seconds since the last input, from an inactivity response.
pub fn inactivity_seconds(resp: &[u8]) -> Option<u16> {
    resp.get(3..5).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Paired device kind addressed by a report's source byte.
fn kind_for_source(byte: u8) -> Option<PairedKind> {
    match byte {
        source::MOUSE | source::MOUSE_ALT => Some(PairedKind::Mouse),
        source::KEYBOARD => Some(PairedKind::Keyboard),
        _ => None,
    }
}

pub struct Slipstream {
    core: DriverCore,
    /// Paired devices keyed by product id
    paired: RwLock<BTreeMap<i32, Paired>>,
    me: Weak<Self>,
}

impl Slipstream {
    pub fn open(
        transport: HidTransport,
        ctx: Arc<Context>,
        listener: Option<Box<dyn HidIo>>,
    ) -> Result<Arc<Self>> {
        let core = DriverCore::new(transport, ctx, DeviceFamily::Slipstream)?;
        let driver = Arc::new_cyclic(|me| Self {
            core,
            paired: RwLock::new(BTreeMap::new()),
            me: me.clone(),
        });
        driver.bootstrap()?;
        driver.start(listener);
        Ok(driver)
    }

    fn bootstrap(&self) -> Result<()> {
        self.core.ensure_profile(DeviceProfile::new)?;
        self.core.set_state(DeviceState::HardwareMode);
        let commands = Commands::wired(&self.core.transport);
        commands.software_mode().map_err(|e| {
            error!("{}: unable to enter software mode: {e}", self.core.serial());
            e
        })?;
        self.core.set_state(DeviceState::SoftwareMode);
        self.core.set_firmware(commands.firmware()?);

        let resp = self
            .core
            .transport
            .transfer_expect(op::LIST_PAIRED, &[], PAIRED_LIST)?;
        let mut paired = BTreeMap::new();
        for entry in parse_paired(&resp) {
            let Some(model) = wireless_model(entry.pid) else {
                warn!(
                    "{}: unsupported paired device {:04x}",
                    self.core.serial(),
                    entry.pid
                );
                continue;
            };
            let base = WirelessBase::new(
                self.core.transport.clone(),
                self.core.ctx.clone(),
                model,
                entry.route,
                &entry.serial,
            )?;
            let device = Paired::new(base);
            device.connect();
            info!(
                "{}: paired {} ({}) on route {:#04x}",
                self.core.serial(),
                model.name,
                entry.serial,
                entry.route
            );
            paired.insert(i32::from(entry.pid), device);
        }
        *self.paired.write() = paired;
        self.core.set_state(DeviceState::Enumerated);
        Ok(())
    }

    fn start(&self, listener: Option<Box<dyn HidIo>>) {
        let me = self.me.clone();
        self.core.spawn_periodic("heartbeat", HEARTBEAT_INTERVAL, move || {
            if let Some(d) = me.upgrade() {
                d.heartbeat();
            }
        });
        let me = self.me.clone();
        self.core.spawn_periodic("inactivity", INACTIVITY_INTERVAL, move || {
            if let Some(d) = me.upgrade() {
                d.check_inactivity();
            }
        });
        if let Some(dev) = listener {
            let me = self.me.clone();
            let name = format!("{}-receiver", self.core.serial());
            self.core.spawn_worker("listener", move |token| {
                run_report_loop(
                    dev.as_ref(),
                    &ListenerConfig::new(name),
                    || token.is_cancelled(),
                    |report, _| {
                        if let Some(d) = me.upgrade() {
                            d.handle_report(report);
                        }
                    },
                );
            });
        }
        self.core.set_state(DeviceState::Running);
    }

    /// Poll every paired device and track connects and disconnects.
    pub fn heartbeat(&self) {
        for device in self.paired.read().values() {
            let route = device.base().route();
            let resp = match Commands::routed(&self.core.transport, route).send(op::HEARTBEAT, &[]) {
                Ok(r) => r,
                Err(e) => {
                    debug!("{}: heartbeat on {route:#04x} failed: {e}", self.core.serial());
                    continue;
                }
            };
            match heartbeat_state(&resp) {
                Some(true) if !device.is_connected() => device.connect(),
                Some(false) => device.set_connected(false),
                _ => {}
            }
        }
    }

    /// Put devices to sleep once idle for their sleep timer. A zero timer
    /// never sleeps.
    pub fn check_inactivity(&self) {
        for device in self.paired.read().values() {
            let minutes = device.sleep_mode();
            if minutes == 0 || !device.is_connected() || device.is_sleeping() {
                continue;
            }
            let route = device.base().route();
            let resp = Commands::routed(&self.core.transport, route).send(op::INACTIVITY, &[]);
            let idle = match resp.as_deref().map(inactivity_seconds) {
                Ok(Some(idle)) => u32::from(idle),
                Ok(None) => continue,
                Err(e) => {
                    debug!("{}: inactivity read failed: {e}", self.core.serial());
                    continue;
                }
            };
            if idle >= minutes.saturating_mul(60) {
                device.sleep();
            }
        }
    }

    /// Route an unsolicited report to the paired device it came from.
    pub fn handle_report(&self, report: &[u8]) {
        let Some(kind) = report.first().copied().and_then(kind_for_source) else {
            return;
        };
        if let Some(device) = self.paired.read().values().find(|d| d.kind() == kind) {
            device.handle_report(report);
        }
    }

    /// Run `f` on the paired devices selected by `channel` (-1 for all).
    fn each_paired(&self, channel: i32, f: impl Fn(&Paired) -> Status) -> Status {
        let paired = self.paired.read();
        if channel < 0 {
            if paired.is_empty() {
                return Status::Rejected;
            }
            return paired
                .values()
                .map(f)
                .fold(Status::Ok, |acc, s| if s.is_ok() { acc } else { s });
        }
        match paired.get(&channel) {
            Some(device) => f(device),
            None => Status::Rejected,
        }
    }

    pub fn modify_dpi(&self, channel: i32, up: bool) -> Status {
        self.each_paired(channel, |d| d.modify_dpi(up))
    }

    pub fn set_sleep_mode(&self, channel: i32, minutes: u32) -> Status {
        self.each_paired(channel, |d| d.set_sleep_mode(minutes))
    }

    pub fn change_control_dial(&self, channel: i32, function: u8) -> Status {
        self.each_paired(channel, |d| d.change_control_dial(function))
    }

    pub fn is_sleeping(&self, channel: i32) -> bool {
        self.paired
            .read()
            .get(&channel)
            .is_some_and(|d| d.is_sleeping())
    }

    /// Number of devices currently connected.
    pub fn connected(&self) -> usize {
        self.paired
            .read()
            .values()
            .filter(|d| d.is_connected())
            .count()
    }
}

impl DeviceDriver for Slipstream {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn channels(&self) -> Vec<Channel> {
        self.paired
            .read()
            .iter()
            .map(|(&id, d)| {
                let model = d.base().model();
                let mut ch = Channel::new(id, ChannelKind::Wireless, model.name);
                ch.device_id = d.base().serial().to_string();
                ch.led_channels = model.leds.min(usize::from(u8::MAX)) as u8;
                ch
            })
            .collect()
    }

    fn restart_rgb(&self) {
        for device in self.paired.read().values() {
            device.base().refresh_color();
        }
    }

    fn set_rgb_profile(&self, channel: i32, name: &str) -> Status {
        self.each_paired(channel, |d| d.set_rgb_profile(name))
    }

    fn change_brightness(&self, mode: u8) -> Status {
        self.each_paired(-1, |d| d.change_brightness(mode))
    }

    fn change_brightness_slider(&self, value: u8) -> Status {
        self.each_paired(-1, |d| d.set_brightness_slider(value))
    }

    fn shutdown(&self, dirty: bool) {
        for device in self.paired.read().values() {
            device.stop_internal(dirty);
        }
        if !dirty {
            if let Err(e) = Commands::wired(&self.core.transport).hardware_mode() {
                warn!("{}: unable to restore hardware mode: {e}", self.core.serial());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[(u16, u8, &str)]) -> Vec<u8> {
        let mut resp = vec![0x00, 0x02, 0x36, 0x00, 0x21, 0x00, entries.len() as u8];
        for &(pid, kind, serial) in entries {
            resp.extend_from_slice(&0x1b1cu16.to_le_bytes());
            resp.extend_from_slice(&pid.to_le_bytes());
            resp.push(kind);
            resp.push(serial.len() as u8);
            resp.extend_from_slice(serial.as_bytes());
        }
        resp
    }

    #[test]
    fn test_single_pairing_uses_fixed_route() {
        let entries = parse_paired(&list(&[(0x1bf0, 1, "MOUSE1")]));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pid, 0x1bf0);
        assert_eq!(entries[0].serial, "MOUSE1");
        assert_eq!(entries[0].route, SINGLE_ROUTE);
    }

    #[test]
    fn test_two_pairings_route_by_type() {
        let entries = parse_paired(&list(&[(0x1bf0, 1, "MOUSE1"), (0x1bab, 2, "KB")]));
        assert_eq!(entries[0].route, 0x09);
        assert_eq!(entries[1].route, 0x0a);
        assert_eq!(entries[1].serial, "KB");
    }

    #[test]
    fn test_heartbeat_states() {
        assert_eq!(heartbeat_state(&[0x02, 0x12]), Some(true));
        assert_eq!(heartbeat_state(&[0x01, 0x00]), Some(false));
        assert_eq!(heartbeat_state(&[0x03, 0x01]), Some(false));
        assert_eq!(heartbeat_state(&[0x00, 0x12]), None);
        assert_eq!(heartbeat_state(&[0x02, 0x7f]), None);
    }

    #[test]
    fn test_inactivity_seconds() {
        assert_eq!(inactivity_seconds(&[0, 0, 0, 0x84, 0x03]), Some(900));
        assert_eq!(inactivity_seconds(&[0, 0, 0]), None);
    }
}
