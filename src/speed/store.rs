//! Named speed profiles in `database/temperatures.json`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::pump_mode;
use crate::error::Result;
use crate::persist;
use crate::temperatures::Sensor;

/// Internal profile forced while the liquid is too hot
pub const CRITICAL_PROFILE: &str = "aioCriticalTemperature";

/// One curve band: applies when `min + 0.1 <= t <= max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureBand {
    pub id: i32,
    pub min: f64,
    pub max: f64,
    pub fans: u8,
    pub pump: u8,
    #[serde(default)]
    pub mode: u8,
}

impl TemperatureBand {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.min + 0.1 && t <= self.max
    }
}

/// Graph point: temperature → duty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedProfile {
    pub sensor: Sensor,
    /// Storage/hwmon/external sensor id
    #[serde(default)]
    pub sensor_id: String,
    /// Ordered curve bands
    #[serde(default)]
    pub profiles: Vec<TemperatureBand>,
    /// Graph curves: `[pump, fans]`
    #[serde(default)]
    pub points: Vec<Vec<Point>>,
    /// Hidden from users; only the runtime selects it
    #[serde(default)]
    pub hidden: bool,
}

fn band(id: i32, min: f64, max: f64, fans: u8, pump: u8, mode: u8) -> TemperatureBand {
    TemperatureBand {
        id,
        min,
        max,
        fans,
        pump,
        mode,
    }
}

fn points(values: &[(f64, f64)]) -> Vec<Point> {
    values.iter().map(|&(x, y)| Point { x, y }).collect()
}

fn curve(sensor: Sensor, bands: Vec<TemperatureBand>) -> SpeedProfile {
    let graph = |duty: fn(&TemperatureBand) -> u8| {
        let values: Vec<_> = bands
            .iter()
            .map(|b| (b.max.min(100.0), f64::from(duty(b))))
            .collect();
        points(&values)
    };
    let pump = graph(|b| b.pump);
    let fans = graph(|b| b.fans);
    SpeedProfile {
        sensor,
        sensor_id: String::new(),
        profiles: bands,
        points: vec![pump, fans],
        hidden: false,
    }
}

/// Built-in profiles
pub fn defaults() -> BTreeMap<String, SpeedProfile> {
    use pump_mode::*;
    let mut map = BTreeMap::new();
    map.insert(
        "Quiet".to_string(),
        curve(
            Sensor::Cpu,
            vec![
                band(1, 0.0, 40.0, 20, 50, QUIET),
                band(2, 40.0, 50.0, 30, 60, QUIET),
                band(3, 50.0, 60.0, 40, 70, QUIET),
                band(4, 60.0, 70.0, 55, 80, NORMAL),
                band(5, 70.0, 80.0, 75, 90, NORMAL),
                band(6, 80.0, 200.0, 100, 100, PERFORMANCE),
            ],
        ),
    );
    map.insert(
        "Normal".to_string(),
        curve(
            Sensor::Cpu,
            vec![
                band(1, 0.0, 40.0, 30, 70, NORMAL),
                band(2, 40.0, 50.0, 40, 70, NORMAL),
                band(3, 50.0, 60.0, 50, 80, NORMAL),
                band(4, 60.0, 70.0, 65, 85, NORMAL),
                band(5, 70.0, 80.0, 85, 100, PERFORMANCE),
                band(6, 80.0, 200.0, 100, 100, PERFORMANCE),
            ],
        ),
    );
    map.insert(
        "Performance".to_string(),
        curve(
            Sensor::Cpu,
            vec![
                band(1, 0.0, 40.0, 50, 80, PERFORMANCE),
                band(2, 40.0, 50.0, 60, 90, PERFORMANCE),
                band(3, 50.0, 60.0, 75, 100, PERFORMANCE),
                band(4, 60.0, 200.0, 100, 100, PERFORMANCE),
            ],
        ),
    );
    let mut critical = curve(
        Sensor::Liquid,
        vec![band(1, 0.0, 200.0, 100, 100, PERFORMANCE)],
    );
    critical.hidden = true;
    map.insert(CRITICAL_PROFILE.to_string(), critical);
    map
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SpeedFile {
    #[serde(default)]
    profiles: BTreeMap<String, SpeedProfile>,
}

/// Loaded speed profiles.
#[derive(Debug, Clone)]
pub struct SpeedStore {
    path: Option<PathBuf>,
    profiles: BTreeMap<String, SpeedProfile>,
}

impl Default for SpeedStore {
    fn default() -> Self {
        Self {
            path: None,
            profiles: defaults(),
        }
    }
}

impl SpeedStore {
    /// Load `path`, creating it with the built-ins when absent and adding
    /// any missing built-in.
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = if path.exists() {
            persist::read_json::<SpeedFile>(path)?
        } else {
            SpeedFile::default()
        };
        let mut changed = false;
        for (name, profile) in defaults() {
            if !file.profiles.contains_key(&name) {
                file.profiles.insert(name, profile);
                changed = true;
            }
        }
        if changed {
            persist::write_json_atomic(path, &file)?;
            info!("speed profiles written to {}", path.display());
        }
        Ok(Self {
            path: Some(path.to_path_buf()),
            profiles: file.profiles,
        })
    }

    pub fn get(&self, name: &str) -> Option<&SpeedProfile> {
        self.profiles.get(name)
    }

    /// Look up `name`, falling back to `Normal`.
    pub fn resolve(&self, name: &str) -> (String, SpeedProfile) {
        if let Some(p) = self.profiles.get(name) {
            return (name.to_string(), p.clone());
        }
        warn!("unknown speed profile {name:?}, falling back to Normal");
        let normal = self
            .profiles
            .get("Normal")
            .cloned()
            .or_else(|| defaults().remove("Normal"))
            .unwrap_or_else(|| curve(Sensor::Cpu, Vec::new()));
        ("Normal".to_string(), normal)
    }

    /// Add or replace a profile and persist when file backed.
    pub fn insert(&mut self, name: &str, profile: SpeedProfile) -> Result<()> {
        self.profiles.insert(name.to_string(), profile);
        if let Some(path) = &self.path {
            let file = SpeedFile {
                profiles: self.profiles.clone(),
            };
            persist::write_json_atomic(path, &file)?;
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles
            .iter()
            .filter(|(_, p)| !p.hidden)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_present() {
        let store = SpeedStore::default();
        for name in ["Quiet", "Normal", "Performance", CRITICAL_PROFILE] {
            assert!(store.get(name).is_some(), "{name}");
        }
        assert!(!store.names().contains(&CRITICAL_PROFILE.to_string()));
    }

    #[test]
    fn test_unknown_falls_back_to_normal() {
        let store = SpeedStore::default();
        let (name, _) = store.resolve("Silent");
        assert_eq!(name, "Normal");
    }

    #[test]
    fn test_load_creates_and_upgrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temperatures.json");
        let store = SpeedStore::load(&path).unwrap();
        assert!(path.exists());
        assert!(store.get(CRITICAL_PROFILE).is_some());

        std::fs::write(&path, r#"{"profiles":{}}"#).unwrap();
        let store = SpeedStore::load(&path).unwrap();
        assert!(store.get("Quiet").is_some());
    }

    #[test]
    fn test_band_bounds() {
        let b = band(1, 40.0, 50.0, 0, 0, 0);
        assert!(!b.contains(40.05));
        assert!(b.contains(40.2));
        assert!(b.contains(50.0));
        assert!(!b.contains(50.01));
    }
}
