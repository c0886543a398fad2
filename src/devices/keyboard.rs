//! Wired keyboards on the modern command set (K70 MK.2, K70 CORE TKL)
//!
//! Colors are scattered over a fixed-size frame through the keyboard
//! layout's packet indexes. Dial, brightness key and macro key reports
//! arrive on a secondary interface.

use std::sync::{Arc, Weak};
use std::time::Duration;

use linkhub_transport::{run_report_loop, DeviceFamily, HidIo, HidTransport, ListenerConfig};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::catalog::{keyboard_model, KeyboardModel};
use super::channel::{Channel, ChannelKind};
use super::command::{decode_control, Commands, ControlEvent};
use super::core::DriverCore;
use super::{DeviceDriver, DeviceState};
use crate::color::Color;
use crate::context::Context;
use crate::error::{DriverError, Result, Status};
use crate::keyboard::{brightness_step, dial_brightness, key_hash, KeyDispatcher, KeyEffect, Keyboard};
use crate::packer::pack_keys;
use crate::profile::types::dial;
use crate::profile::DeviceProfile;

const KEYBOARD_CHANNEL: i32 = 0;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(20);
const FRAME_MS: u64 = 40;

pub struct ModernKeyboard {
    core: DriverCore,
    model: &'static KeyboardModel,
    dispatcher: Mutex<KeyDispatcher>,
    me: Weak<Self>,
}

impl ModernKeyboard {
    pub fn open(
        transport: HidTransport,
        ctx: Arc<Context>,
        listener: Option<Box<dyn HidIo>>,
    ) -> Result<Arc<Self>> {
        let pid = transport.info().pid;
        let model = keyboard_model(pid)
            .ok_or_else(|| DriverError::Unsupported(format!("keyboard {pid:04x}")))?;
        let core = DriverCore::new(transport, ctx, DeviceFamily::Keyboard)?;
        let driver = Arc::new_cyclic(|me| Self {
            core,
            model,
            dispatcher: Mutex::new(KeyDispatcher::new()),
            me: me.clone(),
        });
        driver.bootstrap()?;
        driver.start(listener);
        Ok(driver)
    }

    fn commands(&self) -> Commands<'_> {
        Commands::wired(&self.core.transport)
    }

    fn default_layout(&self, layout: &str) -> Keyboard {
        self.core.ctx.keyboards.layout_or_linear(
            self.model.key,
            layout,
            self.model.leds,
            self.model.stride,
        )
    }

    fn bootstrap(&self) -> Result<()> {
        let layout = self.default_layout("US");
        self.core.ensure_profile(|serial, product| {
            let mut p = DeviceProfile::new(serial, product);
            p.keyboards.insert(p.keyboard_profile.clone(), layout);
            p
        })?;
        self.core.set_state(DeviceState::HardwareMode);

        let commands = self.commands();
        commands.software_mode().map_err(|e| {
            error!("{}: unable to enter software mode: {e}", self.core.serial());
            e
        })?;
        self.core.set_state(DeviceState::SoftwareMode);
        self.core.set_firmware(commands.firmware()?);
        commands.open_color()?;
        self.core.set_state(DeviceState::Enumerated);
        Ok(())
    }

    fn start(&self, listener: Option<Box<dyn HidIo>>) {
        let me = self.me.clone();
        self.core.spawn_periodic("keepalive", KEEP_ALIVE_INTERVAL, move || {
            if let Some(d) = me.upgrade() {
                if let Err(e) = d.commands().keep_alive() {
                    debug!("{}: keep-alive failed: {e}", d.core.serial());
                }
            }
        });
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

    /// Pack one rendered frame through the layout and send it.
    fn write_frame(&self, keyboard: &Keyboard, rgb: &[u8]) -> bool {
        let colors: Vec<Color> = rgb
            .chunks_exact(3)
            .map(|px| Color::from_bytes(px[0], px[1], px[2]))
            .collect();
        let frame = pack_keys(keyboard, &colors, self.model.layout, 1.0);
        match self.commands().write_color(&frame) {
            Ok(()) => true,
            Err(e) => {
                debug!("{}: color write failed: {e}", self.core.serial());
                !self.core.is_stopping()
            }
        }
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

    /// Handle one report from the control interface.
    pub fn handle_report(&self, report: &[u8]) {
        let Some(event) = decode_control(report) else {
            return;
        };
        let input = &self.core.ctx.input;
        let (control, slider) = self.core.profile(|p| (p.control_dial, p.brightness_slider));
        match event {
            ControlEvent::Dial(up) if control == dial::VOLUME => {
                if up {
                    input.volume_up();
                } else {
                    input.volume_down();
                }
            }
            ControlEvent::Dial(up) => {
                self.change_brightness_slider(dial_brightness(slider.unwrap_or(100), up));
            }
            ControlEvent::DialPress if control == dial::VOLUME => input.volume_mute(),
            ControlEvent::DialPress => {
                let next = if slider.unwrap_or(100) > 0 { 0 } else { 100 };
                self.change_brightness_slider(next);
            }
            ControlEvent::BrightnessKey => {
                self.change_brightness_slider(brightness_step(slider));
            }
            ControlEvent::Keys => self.handle_keys(report.get(2..).unwrap_or_default()),
            ControlEvent::Dpi(_) => {}
        }
    }

    fn handle_keys(&self, data: &[u8]) {
        let hash = key_hash(data);
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
                debug!("{}: performance lock is not available", self.core.serial());
            }
            None => {}
        }
    }

    /// Switch the physical layout (US, UK, …) and rebuild the key map.
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
            info!("{}: layout set to {layout}", self.core.serial());
            self.restart_rgb();
        }
        status
    }

    /// Color one key by (row, key) id of the active layout.
    pub fn set_key_color(&self, row: i32, key: i32, color: Color) -> Status {
        let status = update_key_color(&self.core, row, key, color);
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    /// Color every key of the active layout.
    pub fn set_keyboard_color(&self, color: Color) -> Status {
        let status = fill_keyboard(&self.core, color);
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    /// Dial function: 1 volume, 2 brightness.
    pub fn change_control_dial(&self, function: u8) -> Status {
        if !self.model.has_dial || !matches!(function, dial::VOLUME | dial::BRIGHTNESS) {
            return Status::Rejected;
        }
        self.core.update_profile(|p| p.control_dial = function)
    }
}

impl DeviceDriver for ModernKeyboard {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn channels(&self) -> Vec<Channel> {
        let mut ch = Channel::new(KEYBOARD_CHANNEL, ChannelKind::Keyboard, self.model.name);
        ch.led_channels = self.model.leds.min(usize::from(u8::MAX)) as u8;
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
        let commands = self.commands();
        if let Err(e) = commands.close_color().and_then(|_| commands.hardware_mode()) {
            warn!("{}: unable to restore hardware mode: {e}", self.core.serial());
        }
    }
}

/// Persist one key color in the active layout. `Rejected` if the key is
/// not part of it.
pub(super) fn update_key_color(core: &DriverCore, row: i32, key: i32, color: Color) -> Status {
    let found = core.profile(|p| {
        p.keyboard()
            .is_some_and(|k| k.row.get(&row).is_some_and(|r| r.keys.contains_key(&key)))
    });
    if !found {
        return Status::Rejected;
    }
    core.update_profile(|p| {
        if let Some(kb) = p.keyboard_mut() {
            kb.set_key_color(row, key, color);
        }
    })
}

pub(super) fn fill_keyboard(core: &DriverCore, color: Color) -> Status {
    if core.profile(|p| p.keyboard().is_none()) {
        return Status::Rejected;
    }
    core.update_profile(|p| {
        if let Some(kb) = p.keyboard_mut() {
            kb.fill(color);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_models() {
        let tkl = keyboard_model(linkhub_transport::device_registry::PID_K70_CORE_TKL).unwrap();
        assert!(tkl.has_dial);
        assert_eq!(tkl.layout.frame_len, tkl.leds * 3);
        let mk2 = keyboard_model(linkhub_transport::device_registry::PID_K70_MK2).unwrap();
        assert!(!mk2.has_dial);
    }
}
