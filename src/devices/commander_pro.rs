//! Commander Pro fan and RGB controller
//!
//! Six PWM fan headers, four temperature probes and two LED ports. Each
//! LED port drives a chain of external LED devices described by the
//! profile's `externalHubs` entry for that port.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use linkhub_transport::{DeviceFamily, HidTransport, TransportError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::catalog::external_led_device;
use super::channel::{Channel, ChannelKind};
use super::core::DriverCore;
use super::{DeviceDriver, DeviceState};
use crate::cluster::ClusterController;
use crate::context::Context;
use crate::error::{Result, Status};
use crate::packer::{planar_chunks, port_protection};
use crate::profile::{DeviceProfile, ExternalHub};
use crate::speed::{Controller, DEFAULT_DUTY, FAN_FLOOR};

/// Opcodes, written at `out[1]`
pub mod cmd {
    pub const GET_FIRMWARE: u8 = 0x02;
    pub const INIT: u8 = 0x03;
    pub const GET_PROBES: u8 = 0x10;
    pub const GET_TEMP: u8 = 0x11;
    pub const GET_FANS: u8 = 0x20;
    pub const GET_SPEED: u8 = 0x21;
    pub const SET_SPEED: u8 = 0x23;
    pub const FAN_MODE: u8 = 0x28;
    pub const WRITE_COLOR: u8 = 0x32;
    pub const REFRESH: u8 = 0x33;
    pub const REFRESH2: u8 = 0x34;
    pub const LED_CONFIG: u8 = 0x35;
    pub const LED_RESET: u8 = 0x37;
    pub const PORT_STATE: u8 = 0x38;
}

pub const FAN_HEADERS: usize = 6;
pub const PROBES: usize = 4;
pub const LED_PORTS: u8 = 2;
/// Most LED devices a port can chain
pub const MAX_CHAIN: i32 = 6;

/// Channel id of the first probe
const PROBE_BASE: i32 = FAN_HEADERS as i32;
/// Channel id of LED port 0
pub const LED_BASE: i32 = PROBE_BASE + PROBES as i32;

const PORT_HARDWARE: u8 = 0x01;
const PORT_SOFTWARE: u8 = 0x02;
const FAN_MODE_PWM: u8 = 0x02;

const REFRESH_INTERVAL: Duration = Duration::from_millis(1500);
const SPEED_INTERVAL: Duration = Duration::from_secs(3);
const FRAME_MS: u64 = 20;

fn default_profile(serial: &str, product: &str) -> DeviceProfile {
    let mut profile = DeviceProfile::new(serial, product);
    for port in 0..i32::from(LED_PORTS) {
        profile.external_hubs.insert(
            port,
            ExternalHub {
                port_id: port,
                device_type: 0,
                device_count: 0,
            },
        );
    }
    profile
}

pub struct CommanderPro {
    core: DriverCore,
    channels: RwLock<BTreeMap<i32, Channel>>,
    controller: Mutex<Controller>,
    me: Weak<Self>,
}

impl CommanderPro {
    /// Bootstrap the controller and start its workers.
    pub fn open(transport: HidTransport, ctx: Arc<Context>) -> Result<Arc<Self>> {
        let core = DriverCore::new(transport, ctx, DeviceFamily::CommanderPro)?;
        let graph = core.ctx.graph_profiles();
        let driver = Arc::new_cyclic(|me| Self {
            core,
            channels: RwLock::new(BTreeMap::new()),
            controller: Mutex::new(Controller::new(graph)),
            me: me.clone(),
        });
        let cluster: Weak<dyn ClusterController> = driver.me.clone();
        driver.core.set_cluster_handle(cluster);
        driver.bootstrap()?;
        driver.start();
        Ok(driver)
    }

    fn command(&self, op: u8, payload: &[u8]) -> std::result::Result<Vec<u8>, TransportError> {
        self.core.transport.transfer(&[op], payload)
    }

    fn bootstrap(&self) -> Result<()> {
        let serial = self.core.serial().to_string();
        self.core.ensure_profile(default_profile)?;
        self.core.set_state(DeviceState::HardwareMode);

        let init = self.command(cmd::INIT, &[]).and_then(|_| self.command(cmd::GET_FIRMWARE, &[]));
        let fw = init.map_err(|e| {
            error!("{serial}: unable to enter software mode: {e}");
            e
        })?;
        self.core.set_state(DeviceState::SoftwareMode);
        if fw.len() >= 4 {
            self.core.set_firmware(format!("{}.{}.{}", fw[1], fw[2], fw[3]));
        }

        self.enumerate()?;
        self.core.set_state(DeviceState::Enumerated);

        for channel in self.fan_ids() {
            let ch = channel as u8;
            self.command(cmd::FAN_MODE, &[FAN_MODE_PWM, ch, FAN_MODE_PWM])?;
            self.command(cmd::SET_SPEED, &[ch, DEFAULT_DUTY])?;
        }
        for port in 0..LED_PORTS {
            self.command(cmd::LED_RESET, &[port])?;
            self.command(cmd::PORT_STATE, &[port, PORT_SOFTWARE])?;
        }
        Ok(())
    }

    /// Probe fan headers and temperature probes, then rebuild LED channels.
    fn enumerate(&self) -> Result<()> {
        let fans = self.command(cmd::GET_FANS, &[])?;
        let probes = self.command(cmd::GET_PROBES, &[])?;

        let mut found = BTreeMap::new();
        for i in 0..FAN_HEADERS {
            if fans.get(1 + i).copied().unwrap_or(0) == 0 {
                continue;
            }
            let id = i as i32;
            let mut ch = Channel::new(id, ChannelKind::Fan, format!("Fan {}", i + 1));
            ch.port_id = i as u8;
            found.insert(id, ch);
        }
        for i in 0..PROBES {
            if probes.get(1 + i).copied().unwrap_or(0) == 0 {
                continue;
            }
            let id = PROBE_BASE + i as i32;
            let mut ch = Channel::new(id, ChannelKind::Probe, format!("Probe {}", i + 1));
            ch.has_temp = true;
            ch.port_id = i as u8;
            found.insert(id, ch);
        }
        debug!("{}: {} channels found", self.core.serial(), found.len());
        *self.channels.write() = found;
        self.rebuild_led_channels();
        Ok(())
    }

    /// Synthetic LED channels from the profile's external hubs.
    fn rebuild_led_channels(&self) {
        let hubs = self.core.profile(|p| p.external_hubs.clone());
        let mut channels = self.channels.write();
        channels.retain(|&id, _| id < LED_BASE);
        for port in 0..LED_PORTS {
            let Some(hub) = hubs.get(&i32::from(port)) else {
                continue;
            };
            let Some(device) = external_led_device(hub.device_type) else {
                continue;
            };
            let leds = i32::from(device.leds) * hub.device_count.clamp(0, MAX_CHAIN);
            if leds == 0 {
                continue;
            }
            let id = LED_BASE + i32::from(port);
            let mut ch = Channel::new(id, ChannelKind::Led, format!("LED Port {}", port + 1));
            ch.description = device.name.to_string();
            ch.led_channels = leds.min(i32::from(u8::MAX)) as u8;
            ch.port_id = port;
            channels.insert(id, ch);
        }
    }

    fn start(&self) {
        let me = self.me.clone();
        self.core.spawn_periodic("refresh", REFRESH_INTERVAL, move || {
            if let Some(d) = me.upgrade() {
                d.refresh();
            }
        });
        let me = self.me.clone();
        self.core.spawn_periodic("speed", SPEED_INTERVAL, move || {
            if let Some(d) = me.upgrade() {
                d.update_speed();
            }
        });
        self.core.set_state(DeviceState::Running);
        if self.core.cluster_enabled() {
            if let Some(handle) = self.core.cluster_handle() {
                self.core.ctx.cluster.register(handle);
            }
        } else {
            self.set_device_color();
        }
        info!("{}: running", self.core.serial());
    }

    fn fan_ids(&self) -> Vec<i32> {
        self.channels
            .read()
            .values()
            .filter(|c| c.kind == ChannelKind::Fan)
            .map(|c| c.id)
            .collect()
    }

    /// Read rpm and probe temperatures, then publish metrics.
    pub fn refresh(&self) {
        let ids: Vec<(i32, ChannelKind, u8)> = self
            .channels
            .read()
            .values()
            .map(|c| (c.id, c.kind, c.port_id))
            .collect();
        for (id, kind, port) in ids {
            let reading = match kind {
                ChannelKind::Fan => self.command(cmd::GET_SPEED, &[port]),
                ChannelKind::Probe => self.command(cmd::GET_TEMP, &[port]),
                _ => continue,
            };
            let resp = match reading {
                Ok(r) if r.len() >= 3 => r,
                Ok(_) => continue,
                Err(e) => {
                    warn!("{}: channel {id} read failed: {e}", self.core.serial());
                    continue;
                }
            };
            let value = u16::from_be_bytes([resp[1], resp[2]]);
            if let Some(ch) = self.channels.write().get_mut(&id) {
                match kind {
                    ChannelKind::Fan => ch.rpm = value as i16,
                    _ => ch.temperature = f64::from(value) / 100.0,
                }
            }
        }
        self.core.record_metrics(&self.channels());
    }

    /// One speed controller tick.
    pub fn update_speed(&self) {
        let fans: Vec<(i32, bool)> = self.fan_ids().into_iter().map(|id| (id, false)).collect();
        let mut controller = self.controller.lock();
        for target in self.core.speed_targets(&mut controller, &fans, None, None) {
            let payload = [target.channel_id as u8, target.duty];
            if let Err(e) = self.command(cmd::SET_SPEED, &payload) {
                warn!("{}: set speed failed: {e}", self.core.serial());
                controller.forget(target.channel_id);
            }
        }
    }

    /// Rebuild the LED chain on `port`.
    pub fn update_external_hub(&self, port: i32, device_type: i32, count: i32) -> Status {
        if !(0..i32::from(LED_PORTS)).contains(&port)
            || external_led_device(device_type).is_none()
            || !(0..=MAX_CHAIN).contains(&count)
        {
            return Status::Rejected;
        }
        let status = self.core.update_profile(|p| {
            p.external_hubs.insert(
                port,
                ExternalHub {
                    port_id: port,
                    device_type,
                    device_count: count,
                },
            );
        });
        if status.is_ok() {
            self.core.rgb_handles().stop(LED_BASE + port);
            self.rebuild_led_channels();
            self.restart_rgb();
        }
        status
    }

    /// Lit ports as `(port, leds)`.
    fn led_ports(&self) -> Vec<(u8, usize)> {
        self.channels
            .read()
            .values()
            .filter(|c| c.kind == ChannelKind::Led)
            .map(|c| (c.port_id, usize::from(c.led_channels)))
            .collect()
    }

    /// Write one RGB frame to `port` and latch it.
    pub fn write_port(&self, port: u8, rgb: &[u8]) -> bool {
        let result = planar_chunks(port, rgb)
            .iter()
            .try_for_each(|chunk| self.command(cmd::WRITE_COLOR, chunk).map(|_| ()))
            .and_then(|_| self.command(cmd::REFRESH, &[0xff]).map(|_| ()));
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("{}: port {port} color write failed: {e}", self.core.serial());
                !self.core.is_stopping()
            }
        }
    }

    /// Start lighting on every lit port.
    pub fn set_device_color(&self) {
        if self.core.cluster_enabled() {
            return;
        }
        let interval = self.core.frame_interval(FRAME_MS);
        for (port, leds) in self.led_ports() {
            let id = LED_BASE + i32::from(port);
            let scene = self
                .core
                .scene(&[(id, leds)], None)
                .with_protection(port_protection(leds));
            let me = self.me.clone();
            self.core.play(id, scene, interval, self.core.host_sensor(), move |frame| {
                me.upgrade().is_some_and(|d| d.write_port(port, frame))
            });
        }
    }
}

impl DeviceDriver for CommanderPro {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn channels(&self) -> Vec<Channel> {
        let mut list: Vec<Channel> = self.channels.read().values().cloned().collect();
        self.core.merge_profile(&mut list);
        list
    }

    fn restart_rgb(&self) {
        self.set_device_color();
    }

    fn reset_speed(&self) {
        self.controller.lock().reset();
    }

    /// Manual override: the duty sticks until a speed profile is set.
    fn update_device_speed(&self, channel: i32, value: u8) -> Status {
        if !self.fan_ids().contains(&channel) {
            return Status::Rejected;
        }
        let duty = value.clamp(FAN_FLOOR, 100);
        self.core.set_manual_speed(channel, duty);
        match self.command(cmd::SET_SPEED, &[channel as u8, duty]) {
            Ok(_) => Status::Ok,
            Err(e) => {
                warn!("{}: manual speed failed: {e}", self.core.serial());
                Status::Failure
            }
        }
    }

    fn shutdown(&self, dirty: bool) {
        if dirty {
            return;
        }
        for (port, leds) in self.led_ports() {
            self.write_port(port, &vec![0u8; leds * 3]);
        }
        for port in 0..LED_PORTS {
            if let Err(e) = self.command(cmd::PORT_STATE, &[port, PORT_HARDWARE]) {
                warn!("{}: unable to restore port {port}: {e}", self.core.serial());
            }
        }
    }
}

impl ClusterController for CommanderPro {
    fn serial(&self) -> String {
        self.core.serial().to_string()
    }

    fn led_channels(&self) -> usize {
        self.led_ports().iter().map(|&(_, leds)| leds).sum()
    }

    fn write_color_ex(&self, data: &[u8], _port: i32) {
        let mut offset = 0;
        for (port, leds) in self.led_ports() {
            let end = (offset + leds * 3).min(data.len());
            let mut frame = data.get(offset..end).unwrap_or(&[]).to_vec();
            frame.resize(leds * 3, 0);
            self.write_port(port, &frame);
            offset = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_has_both_ports() {
        let p = default_profile("S", "Commander PRO");
        assert_eq!(p.external_hubs.len(), 2);
        assert_eq!(p.external_hubs[&1].device_count, 0);
    }

    #[test]
    fn test_channel_id_layout() {
        assert_eq!(PROBE_BASE, 6);
        assert_eq!(LED_BASE, 10);
    }
}
