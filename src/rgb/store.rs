//! Per-device RGB profile file
//!
//! `<config>/database/rgb/<serial>.json` holds every named animation
//! profile a device's channels can reference. On load, profiles missing
//! from an older file are inserted from templates and the file is
//! rewritten.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Mode, RgbProfile};
use crate::color::Color;
use crate::error::Result;
use crate::persist;

/// Contents of an RGB file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RgbFile {
    pub device: String,
    #[serde(default = "default_color")]
    pub default_color: Color,
    #[serde(default)]
    pub profiles: BTreeMap<String, RgbProfile>,
}

fn default_color() -> Color {
    Color::WHITE
}

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::from_bytes(r, g, b)
}

/// Template for a named profile.
pub fn template(name: &str) -> RgbProfile {
    let base = RgbProfile::default();
    match name {
        "off" => RgbProfile {
            start_color: Color::BLACK,
            end_color: Color::BLACK,
            ..base
        },
        "static" => RgbProfile {
            start_color: Color::WHITE,
            end_color: Color::WHITE,
            ..base
        },
        "rainbow" | "pastelrainbow" | "spiralrainbow" => RgbProfile { speed: 4.0, ..base },
        "watercolor" => RgbProfile {
            speed: 2.0,
            smoothness: 40,
            ..base
        },
        "colorpulse" => RgbProfile {
            start_color: rgb(255, 0, 0),
            end_color: rgb(0, 0, 0),
            smoothness: 40,
            ..base
        },
        "colorshift" | "colorwarp" => RgbProfile {
            start_color: rgb(255, 0, 0),
            end_color: rgb(0, 0, 255),
            smoothness: 40,
            ..base
        },
        "flickering" | "storm" => RgbProfile {
            start_color: rgb(255, 255, 255),
            end_color: rgb(0, 0, 40),
            ..base
        },
        "circle" | "circleshift" | "spinner" | "rotator" | "wave" => RgbProfile {
            start_color: rgb(0, 255, 255),
            end_color: rgb(0, 0, 0),
            speed: 2.0,
            ..base
        },
        "cpu-temperature" | "gpu-temperature" | "liquid-temperature" => RgbProfile {
            start_color: rgb(0, 255, 0),
            end_color: rgb(255, 0, 0),
            min_temp: 30.0,
            max_temp: 70.0,
            ..base
        },
        "gradient" => {
            let mut gradients = BTreeMap::new();
            gradients.insert(0, rgb(255, 0, 0));
            gradients.insert(1, rgb(255, 160, 0));
            gradients.insert(2, rgb(0, 0, 255));
            RgbProfile { gradients, ..base }
        }
        _ => base,
    }
}

impl RgbFile {
    /// Fresh file with a template for every known mode.
    pub fn with_defaults(device: &str) -> Self {
        let profiles = Mode::NAMES
            .iter()
            .map(|name| (name.to_string(), template(name)))
            .collect();
        Self {
            device: device.to_string(),
            default_color: default_color(),
            profiles,
        }
    }

    /// Insert templates for missing modes. Returns the inserted names.
    pub fn upgrade(&mut self) -> Vec<String> {
        let mut added = Vec::new();
        for name in Mode::NAMES {
            if !self.profiles.contains_key(name) {
                self.profiles.insert(name.to_string(), template(name));
                added.push(name.to_string());
            }
        }
        added
    }
}

/// Loaded RGB file plus its location.
#[derive(Debug, Clone)]
pub struct RgbStore {
    path: PathBuf,
    file: RgbFile,
}

impl RgbStore {
    /// Load (or create) the RGB file for `serial` in `dir`.
    pub fn load(dir: &Path, serial: &str, product: &str) -> Result<Self> {
        let path = dir.join(format!("{serial}.json"));
        if !path.exists() {
            let store = Self {
                path,
                file: RgbFile::with_defaults(product),
            };
            store.save()?;
            info!("{serial}: created RGB profiles at {}", store.path.display());
            return Ok(store);
        }

        let mut file: RgbFile = persist::read_json(&path)?;
        let added = file.upgrade();
        let store = Self { path, file };
        if !added.is_empty() {
            info!("{serial}: upgraded RGB profiles, added {}", added.join(", "));
            store.save()?;
        }
        Ok(store)
    }

    /// In-memory store, never written unless `save` is called.
    pub fn in_memory(path: PathBuf, product: &str) -> Self {
        Self {
            path,
            file: RgbFile::with_defaults(product),
        }
    }

    pub fn save(&self) -> Result<()> {
        persist::write_json_atomic(&self.path, &self.file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &RgbFile {
        &self.file
    }

    pub fn get(&self, name: &str) -> Option<&RgbProfile> {
        self.file.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file.profiles.contains_key(name)
    }

    /// Replace one named profile and persist.
    pub fn update(&mut self, name: &str, profile: RgbProfile) -> Result<()> {
        self.file.profiles.insert(name.to_string(), profile);
        self.save()
    }

    /// Resolve a profile name to a mode and parameters.
    ///
    /// Unknown names fall back to `static`.
    pub fn resolve(&self, name: &str) -> (Mode, RgbProfile) {
        match (Mode::parse(name), self.get(name)) {
            (Some(mode), Some(profile)) => (mode, profile.clone()),
            (Some(mode), None) => (mode, template(name)),
            _ => {
                warn!("unknown RGB profile {name:?}, falling back to static");
                let profile = self
                    .get("static")
                    .cloned()
                    .unwrap_or_else(|| template("static"));
                (Mode::Static, profile)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_with_every_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = RgbStore::load(dir.path(), "SER1", "Hub").unwrap();
        assert!(dir.path().join("SER1.json").exists());
        for name in Mode::NAMES {
            assert!(store.contains(name), "{name}");
        }
    }

    #[test]
    fn test_upgrade_inserts_missing_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut old = RgbFile::with_defaults("Hub");
        old.profiles.remove("gradient");
        old.profiles.remove("spiralrainbow");
        let mut custom = template("rainbow");
        custom.speed = 9.0;
        old.profiles.insert("rainbow".into(), custom);
        persist::write_json_atomic(&dir.path().join("SER2.json"), &old).unwrap();

        let store = RgbStore::load(dir.path(), "SER2", "Hub").unwrap();
        assert!(store.contains("gradient"));
        assert_eq!(store.get("rainbow").unwrap().speed, 9.0);

        let on_disk: RgbFile = persist::read_json(&dir.path().join("SER2.json")).unwrap();
        assert!(on_disk.profiles.contains_key("spiralrainbow"));
    }

    #[test]
    fn test_unknown_resolves_to_static() {
        let store = RgbStore::in_memory(PathBuf::from("/nonexistent/x.json"), "Hub");
        let (mode, profile) = store.resolve("disco");
        assert_eq!(mode, Mode::Static);
        assert_eq!(profile.start_color, Color::WHITE);
        assert_eq!(store.resolve("rainbow").0, Mode::Rainbow);
    }
}
