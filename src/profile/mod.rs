// Device profile module
// Persisted per-device configuration and the store that loads, elects and saves it

pub mod store;
pub mod types;

pub use store::{is_valid_name, ProfileStore, DEFAULT_PROFILE};
pub use types::{DeviceProfile, ExternalHub};
