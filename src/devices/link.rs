//! iCUE LINK System Hub
//!
//! The hub reports every device on its chain in one descriptor list.
//! Reads and writes go through numbered endpoint handles: open with a mode
//! byte, read or write, close. Colors use their own handle that stays
//! open while the driver runs.
//!
//! AIOs on the chain feed the liquid temperature used by the critical
//! override and the LCD cap, when one is attached.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use linkhub_transport::protocol::link;
use linkhub_transport::{DeviceFamily, HidTransport, TransportError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::catalog::link_device;
use super::channel::{Channel, ChannelKind};
use super::command::firmware_from;
use super::core::DriverCore;
use super::{DeviceDriver, DeviceState};
use crate::cluster::ClusterController;
use crate::context::Context;
use crate::error::{Result, Status};
use crate::lcd::{frame_for, LcdPipeline, Telemetry};
use crate::packer::{planar_chunks, port_protection};
use crate::profile::types::lcd_mode;
use crate::profile::DeviceProfile;
use crate::speed::{
    Controller, CriticalGuard, CriticalTransition, CRITICAL_PROFILE, DEFAULT_DUTY, FAN_FLOOR,
    PUMP_FLOOR,
};

/// Endpoint byte sequences
pub mod ep {
    pub const OPEN: &[u8] = &[0x0d, 0x01];
    pub const OPEN_COLOR: &[u8] = &[0x0d, 0x00];
    pub const CLOSE: &[u8] = &[0x05, 0x01, 0x01];
    pub const CLOSE_COLOR: &[u8] = &[0x05, 0x01, 0x00];
    pub const READ: &[u8] = &[0x08, 0x01];
    pub const WRITE: &[u8] = &[0x06, 0x01];
    pub const WRITE_COLOR: &[u8] = &[0x06, 0x00];
    pub const COMMIT_COLOR: &[u8] = &[0x07, 0x00];
    pub const HARDWARE_MODE: &[u8] = &[0x01, 0x03, 0x00, 0x01];
    pub const SOFTWARE_MODE: &[u8] = &[0x01, 0x03, 0x00, 0x02];
    pub const FIRMWARE: &[u8] = &[0x02, 0x13];
    pub const REFRESH: &[u8] = &[0x1a, 0x01];
    pub const WAIT: &[u8] = &[0x12, 0x00];
}

/// Mode bytes sent when opening a handle
pub mod mode {
    pub const LIST_DEVICES: u8 = 0x36;
    pub const TEMPERATURES: u8 = 0x21;
    pub const SPEEDS: u8 = 0x17;
    pub const SET_SPEED: u8 = 0x18;
    pub const COLOR: u8 = 0x22;
}

/// Response data types at `resp[4..6]`
pub mod data_type {
    pub const DEVICES: [u8; 2] = [0x21, 0x00];
    pub const TEMPERATURES: [u8; 2] = [0x10, 0x00];
    pub const SPEEDS: [u8; 2] = [0x25, 0x00];
    pub const SET_SPEED: [u8; 2] = [0x07, 0x00];
}

/// Attempts for a set-speed write the hub refuses
pub const SPEED_RETRIES: usize = 20;
pub const SPEED_RETRY_DELAY: Duration = Duration::from_millis(100);

const ENTRY_HEADER: usize = 8;
const LIST_OFFSET: usize = 7;

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const SPEED_INTERVAL: Duration = Duration::from_secs(3);
const LCD_INTERVAL: Duration = Duration::from_secs(1);
const FRAME_MS: u64 = 20;

/// One populated slot of the device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub channel: i32,
    pub device_id: u8,
    pub model: u8,
    pub id: String,
}

/// Decode the device list: `[6]=count`, entries from offset 7, each an
/// 8-byte header (`[2]` device id, `[3]` model, `[7]` id length) followed
/// by the id string. Empty slots keep their channel number.
pub fn parse_device_list(resp: &[u8]) -> Vec<LinkEntry> {
    let count = resp.get(link::DATA_OFFSET).copied().unwrap_or(0) as usize;
    let mut entries = Vec::new();
    let mut pos = LIST_OFFSET;
    for i in 0..count {
        let Some(header) = resp.get(pos..pos + ENTRY_HEADER) else {
            break;
        };
        let id_len = usize::from(header[7]);
        let id_end = (pos + ENTRY_HEADER + id_len).min(resp.len());
        let id = String::from_utf8_lossy(&resp[pos + ENTRY_HEADER..id_end]).into_owned();
        pos += ENTRY_HEADER + id_len;
        if header[2] == 0 {
            continue;
        }
        entries.push(LinkEntry {
            channel: i as i32 + 1,
            device_id: header[2],
            model: header[3],
            id,
        });
    }
    entries
}

/// Decode a temperature or speed block: `[6]=count`, 3-byte entries
/// `[status, lo, hi]`. Only entries with status 0 carry a value.
pub fn parse_sensor_block(resp: &[u8]) -> Vec<(i32, i16)> {
    let count = resp.get(link::DATA_OFFSET).copied().unwrap_or(0) as usize;
    (0..count)
        .filter_map(|i| {
            let off = LIST_OFFSET + i * 3;
            let entry = resp.get(off..off + 3)?;
            (entry[0] == 0x00).then(|| (i as i32 + 1, i16::from_le_bytes([entry[1], entry[2]])))
        })
        .collect()
}

/// Set-speed frame: `[count, (channel, 0x00, duty, 0x00)…]`.
pub fn speed_frame(speeds: &[(i32, u8)]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + speeds.len() * 4);
    frame.push(speeds.len() as u8);
    for &(channel, duty) in speeds {
        frame.extend_from_slice(&[channel as u8, 0x00, duty, 0x00]);
    }
    frame
}

fn channel_for(entry: &LinkEntry) -> Option<Channel> {
    let dev = link_device(entry.device_id, entry.model)?;
    let mut ch = Channel::new(entry.channel, dev.kind, dev.name);
    ch.device_id = entry.id.clone();
    ch.led_channels = dev.led_channels;
    ch.contains_pump = dev.contains_pump;
    ch.is_aio = dev.is_aio;
    ch.has_speed = matches!(
        dev.kind,
        ChannelKind::Fan | ChannelKind::Aio | ChannelKind::PumpRes | ChannelKind::Vrm
    );
    ch.has_temp = matches!(
        dev.kind,
        ChannelKind::Aio | ChannelKind::PumpRes | ChannelKind::CpuBlock | ChannelKind::GpuBlock
    );
    Some(ch)
}

pub struct LinkHub {
    core: DriverCore,
    channels: RwLock<BTreeMap<i32, Channel>>,
    controller: Mutex<Controller>,
    guard: Mutex<CriticalGuard>,
    critical: AtomicBool,
    lcd: Option<LcdPipeline>,
    lcd_override: Mutex<Option<u8>>,
    /// Held across open, read or write, close
    handle: Mutex<()>,
    me: Weak<Self>,
}

impl LinkHub {
    pub fn open(
        transport: HidTransport,
        ctx: Arc<Context>,
        lcd: Option<LcdPipeline>,
    ) -> Result<Arc<Self>> {
        let core = DriverCore::new(transport, ctx, DeviceFamily::LinkHub)?;
        let graph = core.ctx.graph_profiles();
        let driver = Arc::new_cyclic(|me| Self {
            core,
            channels: RwLock::new(BTreeMap::new()),
            controller: Mutex::new(Controller::new(graph)),
            guard: Mutex::new(CriticalGuard::new()),
            critical: AtomicBool::new(false),
            lcd,
            lcd_override: Mutex::new(None),
            handle: Mutex::new(()),
            me: me.clone(),
        });
        let cluster: Weak<dyn ClusterController> = driver.me.clone();
        driver.core.set_cluster_handle(cluster);
        driver.bootstrap()?;
        driver.start();
        Ok(driver)
    }

    fn send(&self, endpoint: &[u8], payload: &[u8]) -> std::result::Result<Vec<u8>, TransportError> {
        self.core.transport.transfer(endpoint, payload)
    }

    /// Open a handle in `mode`, read the response typed `kind`, close.
    fn read_data(&self, mode: u8, kind: [u8; 2]) -> std::result::Result<Vec<u8>, TransportError> {
        let _handle = self.handle.lock();
        self.send(ep::OPEN, &[mode])?;
        let resp = self.core.transport.transfer_expect(ep::READ, &[], kind);
        self.send(ep::CLOSE, &[])?;
        resp
    }

    /// Open a handle in `mode`, write `data` typed `kind`, close.
    fn write_data(&self, mode: u8, kind: [u8; 2], data: &[u8]) -> std::result::Result<Vec<u8>, TransportError> {
        let len = (data.len() + 2) as u16;
        let mut payload = Vec::with_capacity(data.len() + 6);
        payload.extend_from_slice(&len.to_le_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        payload.extend_from_slice(&kind);
        payload.extend_from_slice(data);

        let _handle = self.handle.lock();
        self.send(ep::OPEN, &[mode])?;
        let resp = self.send(ep::WRITE, &payload);
        self.send(ep::CLOSE, &[])?;
        resp
    }

    fn bootstrap(&self) -> Result<()> {
        let serial = self.core.serial().to_string();
        self.core.ensure_profile(DeviceProfile::new)?;
        self.core.set_state(DeviceState::HardwareMode);
        self.send(ep::SOFTWARE_MODE, &[]).map_err(|e| {
            error!("{serial}: unable to enter software mode: {e}");
            e
        })?;
        self.core.set_state(DeviceState::SoftwareMode);

        let fw = self.send(ep::FIRMWARE, &[])?;
        if let Some(version) = firmware_from(&fw) {
            self.core.set_firmware(version);
        }
        if self.core.ctx.config.settings.refresh_on_start {
            debug!("{serial}: refreshing device chain");
            self.send(ep::REFRESH, &[])?;
            self.send(ep::WAIT, &[])?;
        }

        self.enumerate()?;
        self.core.set_state(DeviceState::Enumerated);

        self.send(ep::OPEN_COLOR, &[mode::COLOR])?;
        let defaults: Vec<(i32, u8)> = self
            .speed_channels()
            .into_iter()
            .map(|(id, pump)| (id, if pump { DEFAULT_DUTY.max(PUMP_FLOOR) } else { DEFAULT_DUTY }))
            .collect();
        if !defaults.is_empty() {
            match self.write_speeds(&defaults) {
                Err(e @ TransportError::Refused { .. }) => {
                    warn!("{serial}: default speeds not applied: {e}");
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn enumerate(&self) -> Result<()> {
        let resp = self.read_data(mode::LIST_DEVICES, data_type::DEVICES)?;
        let mut found = BTreeMap::new();
        for entry in parse_device_list(&resp) {
            match channel_for(&entry) {
                Some(ch) => {
                    debug!("{}: channel {} is {}", self.core.serial(), ch.id, ch.name);
                    found.insert(ch.id, ch);
                }
                None => warn!(
                    "{}: unsupported device {}/{} on channel {}",
                    self.core.serial(),
                    entry.device_id,
                    entry.model,
                    entry.channel
                ),
            }
        }
        info!("{}: {} devices on the chain", self.core.serial(), found.len());
        *self.channels.write() = found;
        Ok(())
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
        if self.lcd.is_some() {
            let me = self.me.clone();
            self.core.spawn_periodic("lcd", LCD_INTERVAL, move || {
                if let Some(d) = me.upgrade() {
                    d.update_lcd();
                }
            });
        }
        self.core.set_state(DeviceState::Running);
        if self.core.cluster_enabled() {
            if let Some(handle) = self.core.cluster_handle() {
                self.core.ctx.cluster.register(handle);
            }
        } else {
            self.set_device_color();
        }
    }

    /// `(channel, contains_pump)` of speed capable channels.
    fn speed_channels(&self) -> Vec<(i32, bool)> {
        self.channels
            .read()
            .values()
            .filter(|c| c.has_speed)
            .map(|c| (c.id, c.contains_pump))
            .collect()
    }

    /// Liquid temperature of the first AIO or pump on the chain.
    pub fn liquid(&self) -> Option<f64> {
        self.channels
            .read()
            .values()
            .find(|c| c.contains_pump && c.has_temp)
            .map(|c| c.temperature)
    }

    pub fn is_critical(&self) -> bool {
        self.critical.load(Ordering::SeqCst)
    }

    /// Read temperatures and speeds, then publish metrics.
    pub fn refresh(&self) {
        match self.read_data(mode::TEMPERATURES, data_type::TEMPERATURES) {
            Ok(resp) => {
                let mut channels = self.channels.write();
                for (id, raw) in parse_sensor_block(&resp) {
                    if let Some(ch) = channels.get_mut(&id).filter(|c| c.has_temp) {
                        ch.temperature = f64::from(raw) / 10.0;
                    }
                }
            }
            Err(e) => warn!("{}: temperature read failed: {e}", self.core.serial()),
        }
        match self.read_data(mode::SPEEDS, data_type::SPEEDS) {
            Ok(resp) => {
                let mut channels = self.channels.write();
                for (id, rpm) in parse_sensor_block(&resp) {
                    if let Some(ch) = channels.get_mut(&id) {
                        ch.rpm = rpm;
                    }
                }
            }
            Err(e) => warn!("{}: speed read failed: {e}", self.core.serial()),
        }
        self.core.record_metrics(&self.channels());
    }

    /// Write a speed frame, retrying while the hub reports a non-zero status.
    fn write_speeds(&self, speeds: &[(i32, u8)]) -> std::result::Result<(), TransportError> {
        let frame = speed_frame(speeds);
        let mut status = 0xff;
        for attempt in 1..=SPEED_RETRIES {
            let resp = self.write_data(mode::SET_SPEED, data_type::SET_SPEED, &frame)?;
            status = resp.get(link::STATUS_OFFSET).copied().unwrap_or(0xff);
            if status == 0x00 {
                return Ok(());
            }
            debug!(
                "{}: set speed refused ({status:#04x}), attempt {attempt}",
                self.core.serial()
            );
            if attempt < SPEED_RETRIES {
                std::thread::sleep(SPEED_RETRY_DELAY);
            }
        }
        Err(TransportError::Refused {
            status,
            attempts: SPEED_RETRIES,
        })
    }

    fn apply_critical(&self, transition: CriticalTransition) {
        let entered = transition == CriticalTransition::Entered;
        self.critical.store(entered, Ordering::SeqCst);
        if entered {
            for (id, _) in self.speed_channels() {
                self.core.clear_manual_speed(id);
            }
            *self.lcd_override.lock() = Some(lcd_mode::LIQUID);
        } else {
            *self.lcd_override.lock() = None;
        }
        self.controller.lock().reset();
        self.restart_rgb();
    }

    /// One speed controller tick, including the critical override.
    pub fn update_speed(&self) {
        let liquid = self.liquid();
        if let Some(t) = liquid {
            let transition = self.guard.lock().update(self.core.serial(), t);
            if let Some(transition) = transition {
                self.apply_critical(transition);
            }
        }
        let force = self.is_critical().then_some(CRITICAL_PROFILE);
        let channels = self.speed_channels();
        let mut controller = self.controller.lock();
        let targets = self.core.speed_targets(&mut controller, &channels, liquid, force);
        if targets.is_empty() {
            return;
        }
        let speeds: Vec<(i32, u8)> = targets.iter().map(|t| (t.channel_id, t.duty)).collect();
        if let Err(e) = self.write_speeds(&speeds) {
            warn!("{}: set speed failed: {e}", self.core.serial());
            for t in &targets {
                controller.forget(t.channel_id);
            }
        }
    }

    fn lcd_mode(&self) -> u8 {
        let live = *self.lcd_override.lock();
        live.unwrap_or_else(|| self.core.profile(|p| p.lcd_mode))
    }

    /// Render and stream one LCD frame.
    pub fn update_lcd(&self) {
        let Some(lcd) = &self.lcd else {
            return;
        };
        let pump_rpm = self
            .channels
            .read()
            .values()
            .find(|c| c.contains_pump)
            .map_or(0.0, |c| f64::from(c.rpm));
        let temps = &self.core.ctx.temperatures;
        let telemetry = Telemetry {
            cpu: temps.cpu(),
            gpu: temps.gpu(),
            liquid: self.liquid().unwrap_or(0.0),
            pump_rpm,
        };
        if let Err(e) = lcd.push(&frame_for(self.lcd_mode(), &telemetry)) {
            debug!("{}: LCD frame dropped: {e}", self.core.serial());
        }
    }

    pub fn change_lcd_mode(&self, mode: u8) -> Status {
        if self.lcd.is_none() || mode > lcd_mode::ALL_IN_ONE {
            return Status::Rejected;
        }
        self.core.update_profile(|p| p.lcd_mode = mode)
    }

    fn lit_channels(&self) -> Vec<(i32, usize)> {
        self.channels
            .read()
            .values()
            .filter(|c| c.has_rgb())
            .map(|c| (c.id, usize::from(c.led_channels)))
            .collect()
    }

    /// Planar color payloads for one frame, one port per lit channel in
    /// channel order.
    pub fn color_chunks(&self, rgb: &[u8]) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut pos = 0;
        for (id, leds) in self.lit_channels() {
            let end = (pos + leds * 3).min(rgb.len());
            chunks.extend(planar_chunks(id as u8, &rgb[pos..end]));
            pos = end;
        }
        chunks
    }

    /// Write one frame over the color handle and latch it.
    pub fn write_colors(&self, rgb: &[u8]) -> bool {
        let result = self
            .color_chunks(rgb)
            .iter()
            .try_for_each(|chunk| self.send(ep::WRITE_COLOR, chunk).map(|_| ()))
            .and_then(|_| self.send(ep::COMMIT_COLOR, &[]).map(|_| ()));
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("{}: color write failed: {e}", self.core.serial());
                !self.core.is_stopping()
            }
        }
    }

    pub fn set_device_color(&self) {
        if self.core.cluster_enabled() {
            return;
        }
        let lit = self.lit_channels();
        let total: usize = lit.iter().map(|&(_, leds)| leds).sum();
        let name = self.is_critical().then_some("colorpulse");
        let scene = self
            .core
            .scene(&lit, name)
            .with_protection(port_protection(total));
        let me = self.me.clone();
        let sense = {
            let me = self.me.clone();
            let host = self.core.host_sensor();
            move || {
                let mut r = host();
                r.liquid = me.upgrade().and_then(|d| d.liquid()).unwrap_or(0.0);
                r
            }
        };
        let interval = self.core.frame_interval(FRAME_MS);
        self.core.play(0, scene, interval, sense, move |frame| {
            me.upgrade().is_some_and(|d| d.write_colors(frame))
        });
    }
}

impl DeviceDriver for LinkHub {
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

    fn update_device_speed(&self, channel: i32, value: u8) -> Status {
        let Some(&(_, pump)) = self.speed_channels().iter().find(|(id, _)| *id == channel) else {
            return Status::Rejected;
        };
        let floor = if pump { PUMP_FLOOR } else { FAN_FLOOR };
        let duty = value.clamp(floor, 100);
        self.core.set_manual_speed(channel, duty);
        self.controller.lock().forget(channel);
        match self.write_speeds(&[(channel, duty)]) {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("{}: manual speed failed: {e}", self.core.serial());
                Status::Failure
            }
        }
    }

    fn shutdown(&self, dirty: bool) {
        if !dirty {
            let leds: usize = self.lit_channels().iter().map(|&(_, n)| n).sum();
            self.write_colors(&vec![0u8; leds * 3]);
            let restore = self
                .send(ep::CLOSE_COLOR, &[])
                .and_then(|_| self.send(ep::HARDWARE_MODE, &[]));
            if let Err(e) = restore {
                warn!("{}: unable to restore hardware mode: {e}", self.core.serial());
            }
        }
        if let Some(lcd) = &self.lcd {
            lcd.close();
        }
    }
}

impl ClusterController for LinkHub {
    fn serial(&self) -> String {
        self.core.serial().to_string()
    }

    fn led_channels(&self) -> usize {
        self.lit_channels().iter().map(|&(_, n)| n).sum()
    }

    fn write_color_ex(&self, data: &[u8], _port: i32) {
        let mut frame = data.to_vec();
        frame.resize(self.led_channels() * 3, 0);
        self.write_colors(&frame);
    }
}
