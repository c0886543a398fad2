//! Device drivers
//!
//! One driver per protocol family. Every driver embeds a [`DriverCore`]
//! and implements [`DeviceDriver`], whose provided methods carry the
//! command repertoire shared by all families (profiles, labels,
//! brightness, cluster mode, shutdown). Family specific commands live on
//! the driver types themselves.

pub mod catalog;
pub mod channel;
pub mod command;
pub mod commander_pro;
pub mod core;
pub mod elite;
pub mod k70_lux;
pub mod keyboard;
pub mod link;
pub mod slipstream;
pub mod wireless;
pub mod zone;

use std::sync::Arc;

use linkhub_transport::{DeviceFamily, HidIo, HidTransport};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use self::channel::{Channel, ChannelKind};
pub use self::core::{DeviceState, DriverCore, Readings, Scene};
pub use commander_pro::CommanderPro;
pub use elite::Elite;
pub use k70_lux::K70Lux;
pub use keyboard::ModernKeyboard;
pub use link::LinkHub;
pub use slipstream::Slipstream;
pub use zone::ZoneDevice;

use crate::context::Context;
use crate::error::{DriverError, Result, Status};
use crate::lcd::LcdPipeline;
use crate::temperatures::Sensor;

/// Snapshot returned by [`DeviceDriver::status`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub serial: String,
    pub product: String,
    pub firmware: String,
    pub family: DeviceFamily,
    pub state: DeviceState,
    pub active_profile: Option<String>,
    pub profiles: Vec<String>,
    pub brightness: u8,
    pub brightness_slider: Option<u8>,
    pub rgb_cluster: bool,
    pub channels: Vec<Channel>,
}

/// Operations every driver answers.
///
/// Commands return a [`Status`]; internal errors are logged and never
/// cross this boundary.
pub trait DeviceDriver: Send + Sync {
    fn core(&self) -> &DriverCore;

    /// Live channels in id order.
    fn channels(&self) -> Vec<Channel>;

    /// Rebuild and start the lighting of every port.
    fn restart_rgb(&self);

    /// Device specific teardown after all workers are stopped. `dirty`
    /// skips the hardware-mode handshake.
    fn shutdown(&self, dirty: bool);

    /// Forget emitted speeds so the next tick re-applies every channel.
    fn reset_speed(&self) {}

    fn has_pump(&self) -> bool {
        self.channels().iter().any(Channel::is_pump)
    }

    fn set_rgb_profile(&self, channel: i32, name: &str) -> Status {
        let core = self.core();
        if core.cluster_enabled() {
            return Status::ClusterBlocked;
        }
        if !core.has_rgb_profile(name) {
            warn!("{}: unknown RGB profile {name}", core.serial());
            return Status::Rejected;
        }
        if name == "liquid-temperature" && !self.has_pump() {
            warn!("{}: liquid temperature needs a pump", core.serial());
            return Status::Rejected;
        }
        let lit: Vec<i32> = self
            .channels()
            .iter()
            .filter(|c| c.has_rgb())
            .map(|c| c.id)
            .collect();
        let targets = if channel < 0 {
            lit
        } else if lit.contains(&channel) {
            vec![channel]
        } else {
            return Status::Rejected;
        };
        let status = core.update_profile(|p| {
            for id in targets {
                p.rgb_profiles.insert(id, name.to_string());
            }
        });
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    fn set_speed_profile(&self, channel: i32, name: &str) -> Status {
        let core = self.core();
        let sensor = match core.ctx.speeds.read().get(name) {
            Some(p) if !p.hidden => p.sensor,
            _ => {
                warn!("{}: unknown speed profile {name}", core.serial());
                return Status::Rejected;
            }
        };
        if sensor == Sensor::Liquid && !self.has_pump() {
            return Status::Rejected;
        }
        let speed: Vec<i32> = self
            .channels()
            .iter()
            .filter(|c| c.has_speed)
            .map(|c| c.id)
            .collect();
        let targets = if channel < 0 {
            speed
        } else if speed.contains(&channel) {
            vec![channel]
        } else {
            return Status::Rejected;
        };
        for &id in &targets {
            core.clear_manual_speed(id);
        }
        let status = core.update_profile(|p| {
            for id in targets {
                p.speed_profiles.insert(id, name.to_string());
            }
        });
        if status.is_ok() {
            self.reset_speed();
        }
        status
    }

    fn set_label(&self, channel: i32, label: &str) -> Status {
        if !self.channels().iter().any(|c| c.id == channel) {
            return Status::Rejected;
        }
        self.core().update_profile(|p| {
            p.labels.insert(channel, label.trim().to_string());
        })
    }

    /// Brightness mode 0-3; clears the slider.
    fn change_brightness(&self, mode: u8) -> Status {
        if mode > 3 {
            return Status::Rejected;
        }
        let status = self.core().update_profile(|p| {
            p.brightness = mode;
            p.brightness_slider = None;
        });
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    fn change_brightness_slider(&self, value: u8) -> Status {
        if value > 100 {
            return Status::Rejected;
        }
        let status = self.core().update_profile(|p| p.brightness_slider = Some(value));
        if status.is_ok() {
            self.restart_rgb();
        }
        status
    }

    fn save_user_profile(&self, name: &str) -> Status {
        self.core().with_profiles(|s| s.save_as(name))
    }

    fn switch_user_profile(&self, name: &str) -> Status {
        let status = self.core().with_profiles(|s| s.switch(name));
        if status.is_ok() {
            info!("{}: switched to profile {name}", self.core().serial());
            self.reset_speed();
            self.restart_rgb();
        }
        status
    }

    fn delete_device_profile(&self, name: &str) -> Status {
        self.core().with_profiles(|s| s.delete(name))
    }

    fn toggle_rgb_cluster(&self, enabled: bool) -> Status {
        let core = self.core();
        let Some(handle) = core.cluster_handle() else {
            return Status::Rejected;
        };
        let status = core.update_profile(|p| p.rgb_cluster = enabled);
        if !status.is_ok() {
            return status;
        }
        if enabled {
            core.rgb_handles().stop_all();
            core.ctx.cluster.register(handle);
        } else {
            core.ctx.cluster.unregister(core.serial());
            self.restart_rgb();
        }
        Status::Ok
    }

    /// Manual duty override for one channel.
    fn update_device_speed(&self, channel: i32, _value: u8) -> Status {
        debug!("{}: manual speed unsupported ({channel})", self.core().serial());
        Status::Rejected
    }

    fn status(&self) -> DeviceStatus {
        let core = self.core();
        let (active_profile, profiles) = core.with_profiles(|s| {
            (s.active_name().map(str::to_string), s.names())
        });
        let (brightness, brightness_slider, rgb_cluster) =
            core.profile(|p| (p.brightness, p.brightness_slider, p.rgb_cluster));
        DeviceStatus {
            serial: core.serial().to_string(),
            product: core.product().to_string(),
            firmware: core.firmware(),
            family: core.family(),
            state: core.state(),
            active_profile,
            profiles,
            brightness,
            brightness_slider,
            rgb_cluster,
            channels: self.channels(),
        }
    }

    /// Stop every worker, return the device to hardware mode and close it.
    /// Later calls do nothing.
    fn stop(&self) {
        let core = self.core();
        if core.begin_stop() {
            self.shutdown(false);
            core.finish_stop();
        }
    }

    /// Like [`stop`](Self::stop) but skips the hardware-mode handshake,
    /// for devices that are already gone.
    fn stop_dirty(&self) {
        let core = self.core();
        if core.begin_stop() {
            self.shutdown(true);
            core.finish_stop();
        }
    }
}

/// Secondary interfaces handed to a driver at open.
#[derive(Default)]
pub struct Attachments {
    /// Interface carrying unsolicited control reports
    pub listener: Option<Box<dyn HidIo>>,
    /// LCD cap of an iCUE LINK AIO
    pub lcd: Option<LcdPipeline>,
}

/// Open and start the driver for `family`.
pub fn open_device(
    transport: HidTransport,
    family: DeviceFamily,
    ctx: Arc<Context>,
    attachments: Attachments,
) -> Result<Arc<dyn DeviceDriver>> {
    let driver: Arc<dyn DeviceDriver> = match family {
        DeviceFamily::CommanderPro => CommanderPro::open(transport, ctx)?,
        DeviceFamily::LinkHub => LinkHub::open(transport, ctx, attachments.lcd)?,
        DeviceFamily::Elite => Elite::open(transport, ctx)?,
        DeviceFamily::K70Lux => K70Lux::open(transport, ctx, attachments.listener)?,
        DeviceFamily::Keyboard => ModernKeyboard::open(transport, ctx, attachments.listener)?,
        DeviceFamily::Zone => ZoneDevice::open(transport, ctx)?,
        DeviceFamily::Slipstream => Slipstream::open(transport, ctx, attachments.listener)?,
        DeviceFamily::LinkLcd => {
            return Err(DriverError::Unsupported(
                "the LCD cap is driven through its iCUE LINK hub".into(),
            ))
        }
    };
    Ok(driver)
}
