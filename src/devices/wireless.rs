//! Devices paired to a Slipstream receiver
//!
//! A paired device shares the receiver's transport and is addressed by
//! its own route byte. It keeps its own profile and RGB stores under its
//! own serial, so it can move between receivers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use linkhub_transport::{HidTransport, TransportError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::catalog::{PairedKind, WirelessModel};
use super::command::{decode_control, Commands, ControlEvent};
use crate::context::Context;
use crate::error::{Result, Status};
use crate::keyboard::{brightness_step, dial_brightness};
use crate::profile::types::dial;
use crate::profile::{DeviceProfile, ProfileStore};
use crate::rgb::{Animation, FrameInput, RgbStore};

/// DPI stages of a mouse without a stored profile
pub const DEFAULT_DPI_STAGES: [u16; 3] = [800, 1600, 3200];
const PAIRED_CHANNEL: i32 = 0;

/// State and stores shared by every kind of paired device.
pub struct WirelessBase {
    transport: Arc<HidTransport>,
    ctx: Arc<Context>,
    model: &'static WirelessModel,
    route: u8,
    serial: String,
    profiles: Mutex<ProfileStore>,
    rgb: Mutex<RgbStore>,
    connected: AtomicBool,
    sleeping: AtomicBool,
    firmware: RwLock<String>,
}

impl WirelessBase {
    pub fn new(
        transport: Arc<HidTransport>,
        ctx: Arc<Context>,
        model: &'static WirelessModel,
        route: u8,
        serial: &str,
    ) -> Result<Self> {
        let config = &ctx.config;
        let mut profiles = ProfileStore::load(&config.profiles_dir(), serial)?;
        profiles.ensure_default(|| {
            let mut p = DeviceProfile::new(serial, model.name);
            if model.kind == PairedKind::Mouse {
                p.dpi_stages = DEFAULT_DPI_STAGES.to_vec();
            }
            p
        })?;
        let rgb = RgbStore::load(&config.rgb_dir(), serial, model.name)?;
        Ok(Self {
            transport,
            ctx,
            model,
            route,
            serial: serial.to_string(),
            profiles: Mutex::new(profiles),
            rgb: Mutex::new(rgb),
            connected: AtomicBool::new(false),
            sleeping: AtomicBool::new(false),
            firmware: RwLock::new(String::from("0.0.0")),
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn model(&self) -> &'static WirelessModel {
        self.model
    }

    pub fn route(&self) -> u8 {
        self.route
    }

    pub fn firmware(&self) -> String {
        self.firmware.read().clone()
    }

    fn commands(&self) -> Commands<'_> {
        Commands::routed(&self.transport, self.route)
    }

    fn profile<T>(&self, f: impl FnOnce(&DeviceProfile) -> T) -> T {
        let store = self.profiles.lock();
        match store.active() {
            Some(p) => f(p),
            None => f(&DeviceProfile::new(&self.serial, self.model.name)),
        }
    }

    fn update_profile(&self, f: impl FnOnce(&mut DeviceProfile)) -> Status {
        let mut store = self.profiles.lock();
        let Some(p) = store.active_mut() else {
            return Status::Failure;
        };
        f(p);
        match store.save_active() {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("{}: unable to save profile: {e}", self.serial);
                Status::Failure
            }
        }
    }

    /// Hardware brightness 0-1000 from the slider, or full when unset.
    fn brightness_level(&self) -> u16 {
        self.profile(|p| p.brightness_slider)
            .map_or(1000, |s| u16::from(s.min(100)) * 10)
    }

    /// First frame of the device's RGB profile.
    pub fn frame(&self) -> Vec<u8> {
        let (name, slider, mode) = self.profile(|p| {
            (
                p.rgb_profile(PAIRED_CHANNEL).to_string(),
                p.brightness_slider,
                p.brightness,
            )
        });
        let (rgb_mode, profile) = self.rgb.lock().resolve(&name);
        let mut anim = Animation::new(rgb_mode, profile, self.model.leds);
        let brightness = anim.brightness(slider, mode);
        anim.render(&FrameInput::default(), brightness)
    }

    fn write_color(&self) -> std::result::Result<(), TransportError> {
        self.commands().write_color(&self.frame())
    }

    /// Input arrived: leave sleep and repaint.
    fn wake(&self) {
        if self.sleeping.swap(false, Ordering::SeqCst) {
            debug!("{}: awake", self.serial);
            self.refresh_color();
        }
    }

    fn connect_base(&self) -> std::result::Result<(), TransportError> {
        let commands = self.commands();
        commands.software_mode()?;
        *self.firmware.write() = commands.firmware()?;
        commands.open_color()?;
        self.write_color()?;
        commands.set_brightness(self.brightness_level())?;
        commands.set_sleep_timer(self.profile(|p| p.sleep_mode))?;
        Ok(())
    }

    /// Repaint the device when it is connected and awake.
    pub fn refresh_color(&self) -> Status {
        if !self.connected.load(Ordering::SeqCst) || self.sleeping.load(Ordering::SeqCst) {
            return Status::Ok;
        }
        match self.write_color() {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("{}: color write failed: {e}", self.serial);
                Status::Failure
            }
        }
    }
}

/// Operations the receiver performs on whatever is paired to it.
pub trait PairedDevice {
    fn base(&self) -> &WirelessBase;

    /// Enter software mode and push the stored settings.
    fn connect(&self) {
        let base = self.base();
        match base.connect_base() {
            Ok(()) => {
                base.connected.store(true, Ordering::SeqCst);
                base.sleeping.store(false, Ordering::SeqCst);
                info!("{}: {} connected", base.serial, base.model.name);
            }
            Err(e) => warn!("{}: connect failed: {e}", base.serial),
        }
    }

    fn set_connected(&self, connected: bool) {
        let base = self.base();
        if !connected && base.connected.swap(false, Ordering::SeqCst) {
            info!("{}: {} disconnected", base.serial, base.model.name);
        } else if connected {
            base.connected.store(true, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.base().connected.load(Ordering::SeqCst)
    }

    fn is_sleeping(&self) -> bool {
        self.base().sleeping.load(Ordering::SeqCst)
    }

    /// Step through the DPI stages. Only mice have them.
    fn modify_dpi(&self, _up: bool) -> Status {
        Status::Rejected
    }

    /// Brightness key: step the slider and apply it.
    fn modify_brightness(&self) -> Status {
        let base = self.base();
        let next = brightness_step(base.profile(|p| p.brightness_slider));
        self.set_brightness_slider(next)
    }

    fn set_brightness_slider(&self, value: u8) -> Status {
        if value > 100 {
            return Status::Rejected;
        }
        let base = self.base();
        let status = base.update_profile(|p| p.brightness_slider = Some(value));
        if status.is_ok() && self.is_connected() {
            if let Err(e) = base.commands().set_brightness(base.brightness_level()) {
                warn!("{}: brightness write failed: {e}", base.serial);
            }
        }
        status
    }

    fn change_brightness(&self, mode: u8) -> Status {
        if mode > 3 {
            return Status::Rejected;
        }
        let base = self.base();
        let status = base.update_profile(|p| {
            p.brightness = mode;
            p.brightness_slider = None;
        });
        if status.is_ok() {
            base.refresh_color();
        }
        status
    }

    fn set_rgb_profile(&self, name: &str) -> Status {
        let base = self.base();
        if !base.rgb.lock().contains(name) {
            return Status::Rejected;
        }
        let status = base.update_profile(|p| {
            p.rgb_profiles.insert(PAIRED_CHANNEL, name.to_string());
        });
        if status.is_ok() {
            base.refresh_color();
        }
        status
    }

    fn sleep_mode(&self) -> u32 {
        self.base().profile(|p| p.sleep_mode)
    }

    /// Minutes of inactivity before sleep.
    fn set_sleep_mode(&self, minutes: u32) -> Status {
        if minutes == 0 || minutes > 60 {
            return Status::Rejected;
        }
        let base = self.base();
        let status = base.update_profile(|p| p.sleep_mode = minutes);
        if status.is_ok() && self.is_connected() {
            if let Err(e) = base.commands().set_sleep_timer(minutes) {
                warn!("{}: sleep timer write failed: {e}", base.serial);
            }
        }
        status
    }

    /// Dial function: 1 volume, 2 brightness. Only keyboards have one.
    fn change_control_dial(&self, _function: u8) -> Status {
        Status::Rejected
    }

    /// Inactivity reached the sleep timer: blank the LEDs until the next
    /// input.
    fn sleep(&self) {
        let base = self.base();
        if base.sleeping.swap(true, Ordering::SeqCst) {
            return;
        }
        let off = vec![0u8; base.model.leds * 3];
        match base.commands().write_color(&off) {
            Ok(()) => info!("{}: asleep after inactivity", base.serial),
            Err(e) => warn!("{}: unable to blank LEDs for sleep: {e}", base.serial),
        }
    }

    /// Return the device to hardware mode. `dirty` only drops the state.
    fn stop_internal(&self, dirty: bool) {
        let base = self.base();
        if !dirty && self.is_connected() {
            let commands = base.commands();
            if let Err(e) = commands.close_color().and_then(|_| commands.hardware_mode()) {
                warn!("{}: unable to restore hardware mode: {e}", base.serial);
            }
        }
        self.set_connected(false);
    }

    /// Unsolicited report routed to this device.
    fn handle_report(&self, report: &[u8]);
}

pub struct WirelessMouse {
    base: WirelessBase,
}

impl WirelessMouse {
    pub fn new(base: WirelessBase) -> Self {
        Self { base }
    }

    fn apply_dpi(&self) -> std::result::Result<(), TransportError> {
        let dpi = self.base.profile(|p| {
            p.dpi_stages
                .get(p.dpi_index)
                .or_else(|| p.dpi_stages.first())
                .copied()
        });
        match dpi {
            Some(dpi) => self.base.commands().set_dpi(dpi),
            None => Ok(()),
        }
    }
}

impl PairedDevice for WirelessMouse {
    fn base(&self) -> &WirelessBase {
        &self.base
    }

    fn connect(&self) {
        match self.base.connect_base().and_then(|_| self.apply_dpi()) {
            Ok(()) => {
                self.base.connected.store(true, Ordering::SeqCst);
                self.base.sleeping.store(false, Ordering::SeqCst);
                info!("{}: {} connected", self.base.serial, self.base.model.name);
            }
            Err(e) => warn!("{}: connect failed: {e}", self.base.serial),
        }
    }

    fn modify_dpi(&self, up: bool) -> Status {
        let stages = self.base.profile(|p| p.dpi_stages.len());
        if stages == 0 {
            return Status::Rejected;
        }
        let status = self.base.update_profile(|p| {
            p.dpi_index = if up {
                (p.dpi_index + 1) % stages
            } else {
                (p.dpi_index + stages - 1) % stages
            };
        });
        if status.is_ok() && self.is_connected() {
            if let Err(e) = self.apply_dpi() {
                warn!("{}: dpi write failed: {e}", self.base.serial);
                return Status::Failure;
            }
        }
        status
    }

    fn handle_report(&self, report: &[u8]) {
        self.base.wake();
        match decode_control(report) {
            Some(ControlEvent::Dpi(up)) => {
                self.modify_dpi(up);
            }
            Some(ControlEvent::BrightnessKey) => {
                self.modify_brightness();
            }
            _ => {}
        }
    }
}

pub struct WirelessKeyboard {
    base: WirelessBase,
}

impl WirelessKeyboard {
    pub fn new(base: WirelessBase) -> Self {
        Self { base }
    }
}

impl PairedDevice for WirelessKeyboard {
    fn base(&self) -> &WirelessBase {
        &self.base
    }

    fn change_control_dial(&self, function: u8) -> Status {
        if !matches!(function, dial::VOLUME | dial::BRIGHTNESS) {
            return Status::Rejected;
        }
        self.base.update_profile(|p| p.control_dial = function)
    }

    fn handle_report(&self, report: &[u8]) {
        self.base.wake();
        let Some(event) = decode_control(report) else {
            return;
        };
        let input = &self.base.ctx.input;
        let (control, slider) = self.base.profile(|p| (p.control_dial, p.brightness_slider));
        match event {
            ControlEvent::Dial(up) if control == dial::VOLUME => {
                if up {
                    input.volume_up();
                } else {
                    input.volume_down();
                }
            }
            ControlEvent::Dial(up) => {
                self.set_brightness_slider(dial_brightness(slider.unwrap_or(100), up));
            }
            ControlEvent::DialPress if control == dial::VOLUME => input.volume_mute(),
            ControlEvent::DialPress => {
                let next = if slider.unwrap_or(100) > 0 { 0 } else { 100 };
                self.set_brightness_slider(next);
            }
            ControlEvent::BrightnessKey => {
                self.modify_brightness();
            }
            _ => {}
        }
    }
}

/// Any device a receiver can pair with.
pub enum Paired {
    Mouse(WirelessMouse),
    Keyboard(WirelessKeyboard),
}

impl Paired {
    pub fn new(base: WirelessBase) -> Self {
        match base.model.kind {
            PairedKind::Mouse => Paired::Mouse(WirelessMouse::new(base)),
            PairedKind::Keyboard => Paired::Keyboard(WirelessKeyboard::new(base)),
        }
    }

    pub fn kind(&self) -> PairedKind {
        self.base().model.kind
    }
}

macro_rules! each_paired {
    ($self:ident, $d:ident => $body:expr) => {
        match $self {
            Paired::Mouse($d) => $body,
            Paired::Keyboard($d) => $body,
        }
    };
}

impl PairedDevice for Paired {
    fn base(&self) -> &WirelessBase {
        each_paired!(self, d => d.base())
    }

    fn connect(&self) {
        each_paired!(self, d => d.connect())
    }

    fn modify_dpi(&self, up: bool) -> Status {
        each_paired!(self, d => d.modify_dpi(up))
    }

    fn change_control_dial(&self, function: u8) -> Status {
        each_paired!(self, d => d.change_control_dial(function))
    }

    fn handle_report(&self, report: &[u8]) {
        each_paired!(self, d => d.handle_report(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::devices::catalog::wireless_model;
    use crate::input::{InputEvent, RecordingInput};
    use linkhub_transport::device_registry::{PID_K100_AIR_WIRELESS, PID_M75_WIRELESS};
    use linkhub_transport::mock::MockDevice;
    use linkhub_transport::{Framing, TransportDeviceInfo};

    fn base(pid: u16, dir: &std::path::Path, input: Arc<RecordingInput>) -> WirelessBase {
        let (dev, _handle) = MockDevice::new(|_| Some(vec![0u8; 64]));
        let info = TransportDeviceInfo {
            vid: linkhub_transport::VENDOR_ID,
            pid,
            ..Default::default()
        };
        let transport = HidTransport::new(Box::new(dev), info, Framing::Command { route: 0x08 });
        let ctx = Context::new(Config::with_path(dir))
            .unwrap()
            .with_input(input);
        let model = wireless_model(pid).unwrap();
        WirelessBase::new(Arc::new(transport), Arc::new(ctx), model, 0x09, "PAIRED01").unwrap()
    }

    #[test]
    fn test_mouse_dpi_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mouse = Paired::new(base(PID_M75_WIRELESS, dir.path(), Arc::default()));
        assert_eq!(mouse.kind(), PairedKind::Mouse);
        assert!(mouse.modify_dpi(false).is_ok());
        assert_eq!(mouse.base().profile(|p| p.dpi_index), 2);
        assert!(mouse.modify_dpi(true).is_ok());
        assert_eq!(mouse.base().profile(|p| p.dpi_index), 0);
    }

    #[test]
    fn test_keyboard_has_no_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Paired::new(base(PID_K100_AIR_WIRELESS, dir.path(), Arc::default()));
        assert_eq!(kb.modify_dpi(true), Status::Rejected);
    }

    #[test]
    fn test_keyboard_dial_injects_volume() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(RecordingInput::new());
        let kb = Paired::new(base(PID_K100_AIR_WIRELESS, dir.path(), input.clone()));
        kb.handle_report(&[3, 0x01, 0x01]);
        kb.handle_report(&[3, 0x02, 0x00]);
        assert_eq!(
            input.events(),
            vec![
                InputEvent::Media(crate::input::codes::KEY_VOLUMEUP),
                InputEvent::Media(crate::input::codes::KEY_MUTE),
            ]
        );
    }

    #[test]
    fn test_keyboard_dial_drives_brightness_when_selected() {
        let dir = tempfile::tempdir().unwrap();
        let input = Arc::new(RecordingInput::new());
        let kb = Paired::new(base(PID_K100_AIR_WIRELESS, dir.path(), input.clone()));
        assert!(kb.change_control_dial(dial::BRIGHTNESS).is_ok());
        let slider = || kb.base().profile(|p| p.brightness_slider);

        kb.handle_report(&[3, 0x01, 0xff]);
        assert_eq!(slider(), Some(80));
        kb.handle_report(&[3, 0x01, 0x01]);
        kb.handle_report(&[3, 0x01, 0x01]);
        assert_eq!(slider(), Some(100));

        kb.handle_report(&[3, 0x02, 0x00]);
        assert_eq!(slider(), Some(0));
        kb.handle_report(&[3, 0x02, 0x00]);
        assert_eq!(slider(), Some(100));
        assert!(input.events().is_empty());
    }

    #[test]
    fn test_control_dial_values() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Paired::new(base(PID_K100_AIR_WIRELESS, dir.path(), Arc::default()));
        assert_eq!(kb.change_control_dial(3), Status::Rejected);
        let mouse = Paired::new(base(PID_M75_WIRELESS, dir.path(), Arc::default()));
        assert_eq!(mouse.change_control_dial(dial::BRIGHTNESS), Status::Rejected);
    }

    #[test]
    fn test_sleep_mode_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Paired::new(base(PID_K100_AIR_WIRELESS, dir.path(), Arc::default()));
        assert_eq!(kb.sleep_mode(), 15);
        assert_eq!(kb.set_sleep_mode(0), Status::Rejected);
        assert!(kb.set_sleep_mode(5).is_ok());
        assert_eq!(kb.sleep_mode(), 5);
    }
}
