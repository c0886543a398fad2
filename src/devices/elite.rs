//! Elite AIO coolers (H100i/H115i/H150i ELITE and CAPELLIX)
//!
//! Every request is a CRC framed packet carrying a sequence number in its
//! upper bits. Pump and fans are driven by one combined speed frame, and
//! colors go out as four fixed chunks in B,G,R order.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use linkhub_transport::{DeviceFamily, HidTransport, TransportError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use super::catalog::elite_fans;
use super::channel::{Channel, ChannelKind};
use super::core::DriverCore;
use super::{DeviceDriver, DeviceState};
use crate::cluster::ClusterController;
use crate::context::Context;
use crate::error::{Result, Status};
use crate::packer::elite_chunks;
use crate::profile::DeviceProfile;
use crate::speed::{pump_mode, Controller, DEFAULT_DUTY, FAN_FLOOR};

/// Command bits placed under the sequence number
pub mod cmd {
    pub const READ_STATUS: u8 = 0b000;
    pub const WRITE_SPEED: u8 = 0b000;
    pub const SHUTDOWN: u8 = 0b001;
    pub const SHUTDOWN_FANS: u8 = 0b010;
    pub const SHUTDOWN_COLOR: u8 = 0b011;
    /// First of the four color chunk commands
    pub const WRITE_COLOR: u8 = 0b100;
}

/// Length of the combined speed frame
pub const SPEED_FRAME_LEN: usize = 51;
const SPEED_HEADER: [u8; 4] = [0x14, 0x00, 0xff, 0x05];
const SPEED_BLOCK: usize = 9;
const PUMP_MODE_OFFSET: usize = SPEED_BLOCK + 12;
const FAN_OFFSET: usize = SPEED_BLOCK + 20;
const FAN_STRIDE: usize = 5;

const PUMP_CHANNEL: i32 = 0;
pub const PUMP_LEDS: u8 = 16;
pub const FAN_LEDS: u8 = 4;

const STATUS_REQUEST: &[u8] = &[0xff];
const FAN_RPM_OFFSET: usize = 15;
const FAN_RPM_STRIDE: usize = 7;
const PUMP_RPM_OFFSET: usize = 29;

const SHUTDOWN_SCRIPT: [(u8, &[u8]); 4] = [
    (cmd::SHUTDOWN, &[0x01, 0x00]),
    (cmd::SHUTDOWN, &[0x02, 0x00]),
    (cmd::SHUTDOWN_FANS, &[0x00]),
    (cmd::SHUTDOWN_COLOR, &[0x00]),
];

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const SPEED_INTERVAL: Duration = Duration::from_secs(3);
const FRAME_MS: u64 = 40;

/// Build the combined speed frame from the pump mode and fan duties (%).
pub fn speed_frame(pump: u8, fans: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; SPEED_FRAME_LEN];
    frame[..4].copy_from_slice(&SPEED_HEADER);
    frame[PUMP_MODE_OFFSET] = pump;
    frame[SPEED_BLOCK + 17] = 0xff;
    frame[SPEED_BLOCK + 18] = 0x07;
    for (i, &duty) in fans.iter().enumerate() {
        let off = FAN_OFFSET + i * FAN_STRIDE;
        let Some(slot) = frame.get_mut(off..off + FAN_STRIDE) else {
            break;
        };
        let raw = (u16::from(duty.min(100)) * 255 / 100) as u8;
        slot.copy_from_slice(&[0x02, 0x00, 0x00, 0x00, raw]);
    }
    frame
}

/// Pump mode for a manual percentage.
pub fn pump_mode_for(percent: u8) -> u8 {
    match percent {
        0..=50 => pump_mode::QUIET,
        51..=80 => pump_mode::NORMAL,
        _ => pump_mode::PERFORMANCE,
    }
}

/// Decoded status blob.
#[derive(Debug, Clone, PartialEq)]
pub struct EliteStatus {
    pub liquid: f64,
    pub pump_rpm: i16,
    pub fan_rpm: Vec<i16>,
}

pub fn parse_status(resp: &[u8], fans: usize) -> Option<EliteStatus> {
    let rpm = |off: usize| -> Option<i16> {
        resp.get(off..off + 2).map(|b| i16::from_le_bytes([b[0], b[1]]))
    };
    let liquid = f64::from(*resp.get(8)?) + f64::from(*resp.get(7)?) / 255.0;
    Some(EliteStatus {
        liquid,
        pump_rpm: rpm(PUMP_RPM_OFFSET)?,
        fan_rpm: (0..fans)
            .map(|i| rpm(FAN_RPM_OFFSET + i * FAN_RPM_STRIDE).unwrap_or(0))
            .collect(),
    })
}

pub struct Elite {
    core: DriverCore,
    channels: RwLock<BTreeMap<i32, Channel>>,
    controller: Mutex<Controller>,
    /// Last pump mode and fan duties; every frame carries all of them
    pump: Mutex<u8>,
    fans: Mutex<Vec<u8>>,
    me: Weak<Self>,
}

impl Elite {
    pub fn open(transport: HidTransport, ctx: Arc<Context>) -> Result<Arc<Self>> {
        let fans = elite_fans(transport.info().pid);
        let core = DriverCore::new(transport, ctx, DeviceFamily::Elite)?;
        let graph = core.ctx.graph_profiles();
        let driver = Arc::new_cyclic(|me| Self {
            core,
            channels: RwLock::new(BTreeMap::new()),
            controller: Mutex::new(Controller::new(graph)),
            pump: Mutex::new(pump_mode::NORMAL),
            fans: Mutex::new(vec![DEFAULT_DUTY; fans]),
            me: me.clone(),
        });
        let cluster: Weak<dyn ClusterController> = driver.me.clone();
        driver.core.set_cluster_handle(cluster);
        driver.bootstrap(fans)?;
        driver.start();
        Ok(driver)
    }

    fn bootstrap(&self, fans: usize) -> Result<()> {
        self.core.ensure_profile(DeviceProfile::new)?;
        self.core.set_state(DeviceState::HardwareMode);

        let resp = self
            .core
            .transport
            .elite_transfer(cmd::READ_STATUS, STATUS_REQUEST)
            .map_err(|e| {
                error!("{}: unable to read status: {e}", self.core.serial());
                e
            })?;
        if let (Some(&major), Some(&build)) = (resp.get(2), resp.get(3)) {
            self.core
                .set_firmware(format!("{}.{}.{}", major >> 4, major & 0x0f, build));
        }
        self.core.set_state(DeviceState::SoftwareMode);

        let mut channels = BTreeMap::new();
        let mut pump = Channel::new(PUMP_CHANNEL, ChannelKind::Pump, "Pump");
        pump.led_channels = PUMP_LEDS;
        pump.has_temp = true;
        pump.is_aio = true;
        channels.insert(pump.id, pump);
        for i in 1..=fans as i32 {
            let mut fan = Channel::new(i, ChannelKind::Fan, format!("Fan {i}"));
            fan.led_channels = FAN_LEDS;
            channels.insert(i, fan);
        }
        *self.channels.write() = channels;
        self.core.set_state(DeviceState::Enumerated);

        self.write_speed_frame()?;
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
        self.core.set_state(DeviceState::Running);
        if self.core.cluster_enabled() {
            if let Some(handle) = self.core.cluster_handle() {
                self.core.ctx.cluster.register(handle);
            }
        } else {
            self.set_device_color();
        }
    }

    pub fn liquid(&self) -> f64 {
        self.channels
            .read()
            .get(&PUMP_CHANNEL)
            .map_or(0.0, |c| c.temperature)
    }

    pub fn refresh(&self) {
        let resp = match self
            .core
            .transport
            .elite_transfer(cmd::READ_STATUS, STATUS_REQUEST)
        {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: status read failed: {e}", self.core.serial());
                return;
            }
        };
        let fans = self.fans.lock().len();
        let Some(status) = parse_status(&resp, fans) else {
            debug!("{}: short status response", self.core.serial());
            return;
        };
        {
            let mut channels = self.channels.write();
            if let Some(pump) = channels.get_mut(&PUMP_CHANNEL) {
                pump.temperature = status.liquid;
                pump.rpm = status.pump_rpm;
            }
            for (i, rpm) in status.fan_rpm.iter().enumerate() {
                if let Some(fan) = channels.get_mut(&(i as i32 + 1)) {
                    fan.rpm = *rpm;
                }
            }
        }
        self.core.record_metrics(&self.channels());
    }

    fn write_speed_frame(&self) -> std::result::Result<(), TransportError> {
        let frame = speed_frame(*self.pump.lock(), &self.fans.lock());
        self.core
            .transport
            .elite_transfer(cmd::WRITE_SPEED, &frame)
            .map(|_| ())
    }

    fn speed_channels(&self) -> Vec<(i32, bool)> {
        self.channels
            .read()
            .values()
            .filter(|c| c.has_speed)
            .map(|c| (c.id, c.is_pump()))
            .collect()
    }

    pub fn update_speed(&self) {
        let liquid = self.liquid();
        let channels = self.speed_channels();
        let mut controller = self.controller.lock();
        let targets = self
            .core
            .speed_targets(&mut controller, &channels, Some(liquid), None);
        if targets.is_empty() {
            return;
        }
        for t in &targets {
            if t.is_pump {
                *self.pump.lock() = t.pump_mode;
            } else if let Some(slot) = self.fans.lock().get_mut(t.channel_id as usize - 1) {
                *slot = t.duty;
            }
        }
        if let Err(e) = self.write_speed_frame() {
            warn!("{}: speed write failed: {e}", self.core.serial());
            for t in &targets {
                controller.forget(t.channel_id);
            }
        }
    }

    fn lit_channels(&self) -> Vec<(i32, usize)> {
        self.channels
            .read()
            .values()
            .map(|c| (c.id, usize::from(c.led_channels)))
            .collect()
    }

    pub fn write_colors(&self, rgb: &[u8]) -> bool {
        let chunks = elite_chunks(rgb, usize::from(PUMP_LEDS));
        for (i, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self
                .core
                .transport
                .elite_transfer(cmd::WRITE_COLOR + i as u8, chunk)
            {
                debug!("{}: color write failed: {e}", self.core.serial());
                return !self.core.is_stopping();
            }
        }
        true
    }

    pub fn set_device_color(&self) {
        if self.core.cluster_enabled() {
            return;
        }
        let scene = self.core.scene(&self.lit_channels(), None);
        let me = self.me.clone();
        let sense = {
            let me = self.me.clone();
            let host = self.core.host_sensor();
            move || {
                let mut r = host();
                r.liquid = me.upgrade().map_or(0.0, |d| d.liquid());
                r
            }
        };
        let interval = self.core.frame_interval(FRAME_MS);
        self.core.play(0, scene, interval, sense, move |frame| {
            me.upgrade().is_some_and(|d| d.write_colors(frame))
        });
    }
}

impl DeviceDriver for Elite {
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

    /// Fans take a duty; the pump maps the percentage onto its three modes.
    fn update_device_speed(&self, channel: i32, value: u8) -> Status {
        if channel == PUMP_CHANNEL {
            *self.pump.lock() = pump_mode_for(value);
        } else {
            let duty = value.clamp(FAN_FLOOR, 100);
            match self.fans.lock().get_mut(channel as usize - 1) {
                Some(slot) if channel > 0 => *slot = duty,
                _ => return Status::Rejected,
            }
        }
        self.core.set_manual_speed(channel, value);
        self.controller.lock().forget(channel);
        match self.write_speed_frame() {
            Ok(()) => Status::Ok,
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
        let leds: usize = self.lit_channels().iter().map(|&(_, n)| n).sum();
        self.write_colors(&vec![0u8; leds * 3]);
        for (command, payload) in SHUTDOWN_SCRIPT {
            if let Err(e) = self.core.transport.elite_transfer(command, payload) {
                warn!("{}: shutdown step {command:#05b} failed: {e}", self.core.serial());
                break;
            }
        }
    }
}

impl ClusterController for Elite {
    fn serial(&self) -> String {
        self.core.serial().to_string()
    }

    fn led_channels(&self) -> usize {
        self.lit_channels().iter().map(|&(_, n)| n).sum()
    }

    fn write_color_ex(&self, data: &[u8], _port: i32) {
        self.write_colors(data);
    }
}
