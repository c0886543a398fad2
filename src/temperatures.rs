//! Temperature sources consumed by the speed controller and RGB engine
//!
//! Sensor acquisition lives outside the runtime. The embedding
//! application pushes readings into a [`SensorCache`]; drivers only read.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Temperature used when a sensor reports nothing.
pub const DEFAULT_TEMPERATURE: f64 = 50.0;

/// Read-only view of the host's temperature sensors (°C).
pub trait TemperatureProvider: Send + Sync {
    fn cpu(&self) -> f64;
    fn gpu(&self) -> f64;
    /// Storage device by hwmon id
    fn storage(&self, id: &str) -> f64;
    /// Arbitrary hwmon sensor by `<device>:<sensor>` id
    fn hwmon(&self, id: &str) -> f64;
    /// Value produced by an external binary or file
    fn external(&self, path: &str) -> f64;
}

/// Sensor selector of a speed profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sensor {
    Cpu,
    Gpu,
    /// The driver's own pump/liquid reading
    Liquid,
    Storage,
    Hwmon,
    External,
    /// Maximum of CPU and GPU
    CpuGpu,
}

/// Process-wide cache of pre-read temperatures.
#[derive(Default)]
pub struct SensorCache {
    cpu: RwLock<f64>,
    gpu_nvidia: RwLock<Option<f64>>,
    gpu_amd: RwLock<Option<f64>>,
    named: RwLock<HashMap<String, f64>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cpu(&self, value: f64) {
        *self.cpu.write() = value;
    }

    pub fn set_nvidia(&self, value: Option<f64>) {
        *self.gpu_nvidia.write() = value;
    }

    pub fn set_amd(&self, value: Option<f64>) {
        *self.gpu_amd.write() = value;
    }

    /// Set a storage, hwmon or external reading by id.
    pub fn set(&self, id: &str, value: f64) {
        self.named.write().insert(id.to_string(), value);
    }

    fn named(&self, id: &str) -> f64 {
        self.named.read().get(id).copied().unwrap_or(0.0)
    }
}

impl TemperatureProvider for SensorCache {
    fn cpu(&self) -> f64 {
        *self.cpu.read()
    }

    /// NVIDIA first, then AMD, then CPU.
    fn gpu(&self) -> f64 {
        if let Some(t) = *self.gpu_nvidia.read() {
            return t;
        }
        if let Some(t) = *self.gpu_amd.read() {
            return t;
        }
        self.cpu()
    }

    fn storage(&self, id: &str) -> f64 {
        self.named(id)
    }

    fn hwmon(&self, id: &str) -> f64 {
        self.named(id)
    }

    fn external(&self, path: &str) -> f64 {
        self.named(path)
    }
}

/// Resolve a sensor reading. `liquid` is the driver's own liquid
/// temperature, when it has one. Zero readings become
/// [`DEFAULT_TEMPERATURE`].
pub fn resolve(
    provider: &dyn TemperatureProvider,
    sensor: Sensor,
    sensor_id: &str,
    liquid: Option<f64>,
) -> f64 {
    let value = match sensor {
        Sensor::Cpu => provider.cpu(),
        Sensor::Gpu => provider.gpu(),
        Sensor::Liquid => liquid.unwrap_or(0.0),
        Sensor::Storage => provider.storage(sensor_id),
        Sensor::Hwmon => provider.hwmon(sensor_id),
        Sensor::External => provider.external(sensor_id),
        Sensor::CpuGpu => provider.cpu().max(provider.gpu()),
    };
    if value == 0.0 {
        DEFAULT_TEMPERATURE
    } else {
        value
    }
}
