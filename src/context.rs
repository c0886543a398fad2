//! Process-wide collaborators handed to every driver
//!
//! Everything a driver needs from outside its own device lives here:
//! settings, temperature readings, the metrics registry, the cluster
//! broadcaster, input injection, macros, speed profiles and keyboard
//! layouts. One `Arc<Context>` is shared by all drivers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cluster::ClusterRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::input::{InputInjector, MacroSource, MacroTable, NoopInput};
use crate::keyboard::KeyboardAssets;
use crate::metrics::Metrics;
use crate::speed::SpeedStore;
use crate::temperatures::{SensorCache, TemperatureProvider};

pub struct Context {
    pub config: Config,
    pub temperatures: Arc<dyn TemperatureProvider>,
    pub metrics: Arc<Metrics>,
    pub cluster: Arc<ClusterRegistry>,
    pub input: Arc<dyn InputInjector>,
    pub macros: Arc<dyn MacroSource>,
    pub speeds: RwLock<SpeedStore>,
    pub keyboards: KeyboardAssets,
}

impl Context {
    /// Context for `config`: creates the database directories and loads
    /// the speed profile file.
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_dirs()?;
        let speeds = SpeedStore::load(&config.temperatures_file())?;
        let keyboards = KeyboardAssets::new(config.keyboard_dir());
        Ok(Self {
            config,
            temperatures: Arc::new(SensorCache::new()),
            metrics: Arc::new(Metrics::new()?),
            cluster: Arc::new(ClusterRegistry::new()),
            input: Arc::new(NoopInput),
            macros: Arc::new(MacroTable::new()),
            speeds: RwLock::new(speeds),
            keyboards,
        })
    }

    pub fn with_temperatures(mut self, provider: Arc<dyn TemperatureProvider>) -> Self {
        self.temperatures = provider;
        self
    }

    pub fn with_input(mut self, input: Arc<dyn InputInjector>) -> Self {
        self.input = input;
        self
    }

    pub fn with_macros(mut self, macros: Arc<dyn MacroSource>) -> Self {
        self.macros = macros;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn manual(&self) -> bool {
        self.config.settings.manual
    }

    pub fn graph_profiles(&self) -> bool {
        self.config.settings.graph_profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(Config::with_path(dir.path())).unwrap();
        assert!(ctx.config.profiles_dir().is_dir());
        assert!(ctx.config.temperatures_file().exists());
        assert!(ctx.speeds.read().get("Normal").is_some());
    }
}
