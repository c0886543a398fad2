//! K70 RGB LUX
//!
//! Older keyboard driven entirely through feature reports. Control writes
//! start with `0x07`, color data is uploaded one plane at a time and
//! committed per plane. Key presses arrive as raw scan reports that are
//! hashed and looked up in the active layout.

use std::sync::{Arc, Weak};

use linkhub_transport::{run_report_loop, DeviceFamily, HidIo, HidTransport, ListenerConfig, TransportError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::channel::{Channel, ChannelKind};
use super::core::DriverCore;
use super::keyboard::{fill_keyboard, update_key_color};
use super::{DeviceDriver, DeviceState};
use crate::color::Color;
use crate::context::Context;
use crate::error::{Result, Status};
use crate::keyboard::{brightness_step, key_hash, KeyDispatcher, KeyEffect, Keyboard};
use crate::packer::{k70_lux_packets, pack_keys, KeyLayout};
use crate::profile::DeviceProfile;

/// Control commands, sent after the `0x07` prefix
pub mod cmd {
    pub const CONTROL: u8 = 0x07;
    pub const MODE: u8 = 0x04;
    pub const POLLING_RATE: u8 = 0x0a;
    pub const LOCK_FLAGS: u8 = 0x48;
    pub const PERFORMANCE: u8 = 0x4a;
    pub const REFRESH: u8 = 0x05;
    /// Feature report returning the device state
    pub const STATE: u8 = 0x0e;
}

pub const LAYOUT_KEY: &str = "k70lux";
pub const KEYS: usize = 104;
pub const PLANE_LEN: usize = 168;
pub const LAYOUT: KeyLayout = KeyLayout::planar(PLANE_LEN);

/// Accepted polling rates, as the device encodes them
pub const POLLING_RATES: [u8; 4] = [1, 2, 4, 8];

const LOCK_BASE: u8 = 160;
const KEYBOARD_CHANNEL: i32 = 0;
const FRAME_MS: u64 = 40;

/// Key locks active in performance mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockFlags {
    pub win_key: bool,
    pub alt_tab: bool,
    pub alt_f4: bool,
    pub shift_tab: bool,
}

impl LockFlags {
    /// Bitfield sent with [`cmd::LOCK_FLAGS`]: 160 plus win 1, alt-tab 2,
    /// alt-f4 4, shift-tab 8.
    pub fn bits(&self) -> u8 {
        LOCK_BASE
            + u8::from(self.win_key)
            + (u8::from(self.alt_tab) << 1)
            + (u8::from(self.alt_f4) << 2)
            + (u8::from(self.shift_tab) << 3)
    }

    fn from_profile(p: &DeviceProfile) -> Self {
        Self {
            win_key: p.disable_win_key,
            alt_tab: p.disable_alt_tab,
            alt_f4: p.disable_alt_f4,
            shift_tab: p.disable_shift_tab,
        }
    }
}

pub struct K70Lux {
    core: DriverCore,
    dispatcher: Mutex<KeyDispatcher>,
    me: Weak<Self>,
}

impl K70Lux {
    pub fn open(
        transport: HidTransport,
        ctx: Arc<Context>,
        listener: Option<Box<dyn HidIo>>,
    ) -> Result<Arc<Self>> {
        let core = DriverCore::new(transport, ctx, DeviceFamily::K70Lux)?;
        let driver = Arc::new_cyclic(|me| Self {
            core,
            dispatcher: Mutex::new(KeyDispatcher::new()),
            me: me.clone(),
        });
        driver.bootstrap()?;
        driver.start(listener);
        Ok(driver)
    }

    fn control(&self, command: u8, payload: &[u8]) -> std::result::Result<(), TransportError> {
        self.core
            .transport
            .feature_write(&[cmd::CONTROL, command], payload)
    }

    fn default_layout(&self, layout: &str) -> Keyboard {
        self.core
            .ctx
            .keyboards
            .layout_or_linear(LAYOUT_KEY, layout, KEYS, 1)
    }

    fn bootstrap(&self) -> Result<()> {
        let layout = self.default_layout("US");
        self.core.ensure_profile(|serial, product| {
            let mut p = DeviceProfile::new(serial, product);
            p.keyboards.insert(p.keyboard_profile.clone(), layout);
            p
        })?;
        self.core.set_state(DeviceState::HardwareMode);

        let state = self.core.transport.feature_transfer(&[cmd::STATE], &[])?;
        if state.len() >= 11 {
            self.core.set_firmware(format!("{}.{}", state[10], state[9]));
        }
        self.control(cmd::MODE, &[0x02]).map_err(|e| {
            error!("{}: unable to enter software mode: {e}", self.core.serial());
            e
        })?;
        self.core.set_state(DeviceState::SoftwareMode);

        let (flags, performance, rate) =
            self.core
                .profile(|p| (LockFlags::from_profile(p), p.performance, p.polling_rate));
        if performance {
            self.write_performance(true, flags)?;
        }
        if rate != POLLING_RATES[0] {
            self.control(cmd::POLLING_RATE, &[0x00, 0x00, rate])?;
        }
        self.core.set_state(DeviceState::Enumerated);
        Ok(())
    }

    fn start(&self, listener: Option<Box<dyn HidIo>>) {
        if let Some(dev) = listener {
            let me = self.me.clone();
            let name = format!("{}-keys", self.core.serial());
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
        self.set_device_color();
    }

    fn keyboard(&self) -> Keyboard {
        self.core
            .profile(|p| p.keyboard().cloned())
            .unwrap_or_else(|| self.default_layout("US"))
    }

    fn write_frame(&self, keyboard: &Keyboard, rgb: &[u8]) -> bool {
        let colors: Vec<Color> = rgb
            .chunks_exact(3)
            .map(|px| Color::from_bytes(px[0], px[1], px[2]))
            .collect();
        let frame = pack_keys(keyboard, &colors, LAYOUT, 1.0);
        for packet in k70_lux_packets(&frame, PLANE_LEN) {
            if let Err(e) = self.core.transport.feature_write(&[], &packet) {
                debug!("{}: color write failed: {e}", self.core.serial());
                return !self.core.is_stopping();
            }
        }
        true
    }

    pub fn set_device_color(&self) {
        let keyboard = self.keyboard();
        let scene = self
            .core
            .scene(&[(KEYBOARD_CHANNEL, keyboard.key_count())], None);
        let me = self.me.clone();
        let interval = self.core.frame_interval(FRAME_MS);
        self.core.play(
            KEYBOARD_CHANNEL,
            scene,
            interval,
            self.core.host_sensor(),
            move |frame| me.upgrade().is_some_and(|d| d.write_frame(&keyboard, frame)),
        );
    }

    /// Handle one key scan report.
    pub fn handle_report(&self, report: &[u8]) {
        let hash = key_hash(report.get(1..).unwrap_or_default());
        let key = self
            .core
            .profile(|p| p.keyboard().and_then(|k| k.find_by_hash(&hash)).cloned());
        let effect = self.dispatcher.lock().dispatch(
            &hash,
            key.as_ref(),
            self.core.ctx.input.as_ref(),
            self.core.ctx.macros.as_ref(),
        );
        match effect {
            Some(KeyEffect::BrightnessCycle) => {
                let slider = self.core.profile(|p| p.brightness_slider);
                self.change_brightness_slider(brightness_step(slider));
            }
            Some(KeyEffect::PerformanceLock) => {
                let enabled = self.core.profile(|p| p.performance);
                self.set_performance(!enabled);
            }
            None => {}
        }
    }

    fn write_performance(&self, enabled: bool, flags: LockFlags) -> std::result::Result<(), TransportError> {
        let bits = if enabled { flags.bits() } else { LOCK_BASE };
        self.control(cmd::LOCK_FLAGS, &[bits])?;
        self.control(cmd::PERFORMANCE, &[u8::from(enabled)])?;
        self.control(cmd::REFRESH, &[0x02])
    }

    /// Enable or disable performance mode with the profile's key locks.
    pub fn set_performance(&self, enabled: bool) -> Status {
        let flags = self.core.profile(LockFlags::from_profile);
        if let Err(e) = self.write_performance(enabled, flags) {
            warn!("{}: performance write failed: {e}", self.core.serial());
            return Status::Failure;
        }
        info!("{}: performance mode {}", self.core.serial(), if enabled { "on" } else { "off" });
        self.core.update_profile(|p| p.performance = enabled)
    }

    /// Change which key combinations performance mode locks.
    pub fn set_lock_flags(&self, flags: LockFlags) -> Status {
        let status = self.core.update_profile(|p| {
            p.disable_win_key = flags.win_key;
            p.disable_alt_tab = flags.alt_tab;
            p.disable_alt_f4 = flags.alt_f4;
            p.disable_shift_tab = flags.shift_tab;
        });
        if status.is_ok() && self.core.profile(|p| p.performance) {
            if let Err(e) = self.write_performance(true, flags) {
                warn!("{}: performance write failed: {e}", self.core.serial());
                return Status::Failure;
            }
        }
        status
    }

    pub fn set_polling_rate(&self, rate: u8) -> Status {
        if !POLLING_RATES.contains(&rate) {
            return Status::Rejected;
        }
        if let Err(e) = self.control(cmd::POLLING_RATE, &[0x00, 0x00, rate]) {
            warn!("{}: polling rate write failed: {e}", self.core.serial());
            return Status::Failure;
        }
        self.core.update_profile(|p| p.polling_rate = rate)
    }

    pub fn change_keyboard_layout(&self, layout: &str) -> Status {
        let layout = layout.trim();
        if layout.is_empty() {
            return Status::Rejected;
        }
        let keyboard = self.default_layout(layout);
        let status = self.core.update_profile(|p| {
            p.layout = layout.to_string();
            p.keyboards.insert(p.keyboard_profile.clone(), keyboard);
        });
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    pub fn set_key_color(&self, row: i32, key: i32, color: Color) -> Status {
        let status = update_key_color(&self.core, row, key, color);
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    pub fn set_keyboard_color(&self, color: Color) -> Status {
        let status = fill_keyboard(&self.core, color);
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }
}

impl DeviceDriver for K70Lux {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn channels(&self) -> Vec<Channel> {
        let mut ch = Channel::new(KEYBOARD_CHANNEL, ChannelKind::Keyboard, "K70 RGB LUX");
        ch.led_channels = KEYS as u8;
        let mut list = vec![ch];
        self.core.merge_profile(&mut list);
        list
    }

    fn restart_rgb(&self) {
        self.set_device_color();
    }

    fn shutdown(&self, dirty: bool) {
        if dirty {
            return;
        }
        if let Err(e) = self.control(cmd::MODE, &[0x01]) {
            warn!("{}: unable to restore hardware mode: {e}", self.core.serial());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_bits() {
        assert_eq!(LockFlags::default().bits(), 160);
        let all = LockFlags {
            win_key: true,
            alt_tab: true,
            alt_f4: true,
            shift_tab: true,
        };
        assert_eq!(all.bits(), 175);
        let alt_f4 = LockFlags {
            alt_f4: true,
            ..Default::default()
        };
        assert_eq!(alt_f4.bits(), 164);
    }

    #[test]
    fn test_plane_layout() {
        assert_eq!(LAYOUT.frame_len, 3 * PLANE_LEN);
        assert_eq!(LAYOUT.planes, [0, 168, 336]);
    }
}
