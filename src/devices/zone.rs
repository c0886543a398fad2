//! Zone lit accessories: ST100 headset stand and MM700 mousepad
//!
//! Both speak the modern command set and take a small fixed frame with
//! one color per zone. They differ only in zone count and in how the
//! R, G and B bytes of a zone are spaced inside the frame.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use linkhub_transport::device_registry::{PID_MM700, PID_ST100};
use linkhub_transport::{DeviceFamily, HidTransport};
use tracing::{debug, error, warn};

use super::channel::{Channel, ChannelKind};
use super::command::Commands;
use super::core::{DriverCore, Scene};
use super::{DeviceDriver, DeviceState};
use crate::color::Color;
use crate::context::Context;
use crate::error::{DriverError, Result, Status};
use crate::keyboard::Keyboard;
use crate::packer::{pack_keys, KeyLayout};
use crate::profile::DeviceProfile;
use crate::rgb::Mode;

const ZONE_CHANNEL: i32 = 0;
const FRAME_MS: u64 = 40;

/// Zone geometry of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneModel {
    pub pid: u16,
    pub name: &'static str,
    pub zones: usize,
    /// Offset between consecutive zones
    pub stride: usize,
    pub layout: KeyLayout,
}

pub const ZONE_MODELS: &[ZoneModel] = &[
    ZoneModel {
        pid: PID_ST100,
        name: "ST100 RGB",
        zones: 9,
        stride: 3,
        layout: KeyLayout::interleaved(27),
    },
    ZoneModel {
        pid: PID_MM700,
        name: "MM700 RGB",
        zones: 3,
        stride: 1,
        layout: KeyLayout::spread(9),
    },
];

pub fn zone_model(pid: u16) -> Option<&'static ZoneModel> {
    ZONE_MODELS.iter().find(|m| m.pid == pid)
}

/// Pack zone colors into the device frame.
pub fn zone_frame(model: &ZoneModel, colors: &[Color]) -> Vec<u8> {
    let map = Keyboard::linear("zones", model.name, "", model.zones, model.stride);
    pack_keys(&map, colors, model.layout, 1.0)
}

pub struct ZoneDevice {
    core: DriverCore,
    model: &'static ZoneModel,
    me: Weak<Self>,
}

impl ZoneDevice {
    pub fn open(transport: HidTransport, ctx: Arc<Context>) -> Result<Arc<Self>> {
        let pid = transport.info().pid;
        let model = zone_model(pid)
            .ok_or_else(|| DriverError::Unsupported(format!("zone device {pid:04x}")))?;
        let core = DriverCore::new(transport, ctx, DeviceFamily::Zone)?;
        let driver = Arc::new_cyclic(|me| Self {
            core,
            model,
            me: me.clone(),
        });
        driver.bootstrap()?;
        driver.core.set_state(DeviceState::Running);
        driver.set_device_color();
        Ok(driver)
    }

    fn commands(&self) -> Commands<'_> {
        Commands::wired(&self.core.transport)
    }

    fn bootstrap(&self) -> Result<()> {
        let zones = self.model.zones as i32;
        self.core.ensure_profile(|serial, product| {
            let mut p = DeviceProfile::new(serial, product);
            p.zones = (0..zones).map(|z| (z, Color::WHITE)).collect();
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

    fn zone_colors(&self) -> Vec<Color> {
        let zones: BTreeMap<i32, Color> = self.core.profile(|p| p.zones.clone());
        (0..self.model.zones as i32)
            .map(|z| zones.get(&z).copied().unwrap_or(Color::WHITE))
            .collect()
    }

    fn write_frame(&self, rgb: &[u8]) -> bool {
        let colors: Vec<Color> = rgb
            .chunks_exact(3)
            .map(|px| Color::from_bytes(px[0], px[1], px[2]))
            .collect();
        match self.commands().write_color(&zone_frame(self.model, &colors)) {
            Ok(()) => true,
            Err(e) => {
                debug!("{}: color write failed: {e}", self.core.serial());
                !self.core.is_stopping()
            }
        }
    }

    /// The `led` mode paints the zone colors stored in the profile.
    pub fn set_device_color(&self) {
        let mut anim = self.core.animation(ZONE_CHANNEL, self.model.zones, None);
        if anim.mode() == Mode::Led {
            anim = anim.with_custom(self.zone_colors());
        }
        let (slider, brightness) = self.core.profile(|p| (p.brightness_slider, p.brightness));
        let scene = Scene::new(vec![anim], slider, brightness);
        let me = self.me.clone();
        let interval = self.core.frame_interval(FRAME_MS);
        self.core.play(
            ZONE_CHANNEL,
            scene,
            interval,
            self.core.host_sensor(),
            move |frame| me.upgrade().is_some_and(|d| d.write_frame(frame)),
        );
    }

    pub fn set_zone_color(&self, zone: i32, color: Color) -> Status {
        if !(0..self.model.zones as i32).contains(&zone) {
            return Status::Rejected;
        }
        let status = self.core.update_profile(|p| {
            p.zones.insert(zone, color);
        });
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }
}

impl DeviceDriver for ZoneDevice {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn channels(&self) -> Vec<Channel> {
        let mut ch = Channel::new(ZONE_CHANNEL, ChannelKind::Zone, self.model.name);
        ch.led_channels = self.model.zones as u8;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_st100_frame_interleaved() {
        let model = zone_model(PID_ST100).unwrap();
        let mut colors = vec![Color::BLACK; 9];
        colors[1] = Color::from_bytes(1, 2, 3);
        let frame = zone_frame(model, &colors);
        assert_eq!(frame.len(), 27);
        assert_eq!(&frame[3..6], &[1, 2, 3]);
    }

    #[test]
    fn test_mm700_frame_spread() {
        let model = zone_model(PID_MM700).unwrap();
        let colors = vec![
            Color::from_bytes(10, 20, 30),
            Color::from_bytes(11, 21, 31),
            Color::from_bytes(12, 22, 32),
        ];
        let frame = zone_frame(model, &colors);
        assert_eq!(frame, vec![10, 11, 12, 20, 21, 22, 30, 31, 32]);
    }
}
