//! Temperature driven fan and pump control
//!
//! [`store`] holds the named speed profiles, [`controller`] turns a
//! profile and a temperature into a duty with change detection, and
//! [`CriticalGuard`] implements the liquid temperature override.

pub mod controller;
pub mod store;

pub use controller::{duty_for, Controller, CriticalGuard, CriticalTransition, SpeedTarget};
pub use store::{SpeedProfile, SpeedStore, TemperatureBand, CRITICAL_PROFILE};

/// Lowest fan duty the controller emits (%)
pub const FAN_FLOOR: u8 = 20;
/// Lowest pump duty the controller emits (%)
pub const PUMP_FLOOR: u8 = 50;
/// Liquid temperature entering the override (°C)
pub const CRITICAL_ENTER: f64 = 57.0;
/// Liquid temperature leaving the override (°C)
pub const CRITICAL_EXIT: f64 = 52.0;
/// Duty applied to every speed channel at bootstrap (%)
pub const DEFAULT_DUTY: u8 = 70;

/// Pump modes carried by curve bands
pub mod pump_mode {
    pub const QUIET: u8 = 0;
    pub const NORMAL: u8 = 1;
    pub const PERFORMANCE: u8 = 2;
}
