// Corsair device runtime - shared library
// Drivers, RGB and speed engines, profile persistence and telemetry

pub mod cluster;
pub mod color;
pub mod config;
pub mod context;
pub mod devices;
pub mod error;
pub mod input;
pub mod keyboard;
pub mod lcd;
pub mod led;
pub mod metrics;
pub mod packer;
pub mod persist;
pub mod profile;
pub mod rgb;
pub mod runtime;
pub mod speed;
pub mod temperatures;

pub use config::{Config, Settings};
pub use context::Context;
pub use devices::{open_device, Attachments, DeviceDriver, DeviceStatus};
pub use error::{DriverError, Result, Status};
pub use profile::DeviceProfile;
