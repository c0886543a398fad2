//! Custom per-LED colors in `database/led/<serial>.json`
//!
//! Used by the `led` RGB mode: every channel id maps to a list of colors,
//! one per LED.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::color::Color;
use crate::error::Result;
use crate::persist;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedChannel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub colors: Vec<Color>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedFile {
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub channels: BTreeMap<i32, LedChannel>,
}

/// LED color store of one device.
#[derive(Debug)]
pub struct LedStore {
    path: PathBuf,
    file: LedFile,
}

impl LedStore {
    /// Load the store, creating an empty file when absent.
    pub fn load(dir: &Path, serial: &str) -> Result<Self> {
        let path = dir.join(format!("{serial}.json"));
        let file = if path.exists() {
            persist::read_json(&path)?
        } else {
            let file = LedFile {
                serial: serial.to_string(),
                ..Default::default()
            };
            persist::write_json_atomic(&path, &file)?;
            info!("{serial}: created LED profile {}", path.display());
            file
        };
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Colors of `channel`, padded with white (or truncated) to `leds`.
    pub fn colors(&self, channel: i32, leds: usize) -> Vec<Color> {
        let mut colors = self
            .file
            .channels
            .get(&channel)
            .map(|c| c.colors.clone())
            .unwrap_or_default();
        colors.resize(leds, Color::WHITE);
        colors
    }

    /// Replace the colors of `channel` and persist.
    pub fn set(&mut self, channel: i32, name: &str, colors: Vec<Color>) -> Result<()> {
        self.file.channels.insert(
            channel,
            LedChannel {
                name: name.to_string(),
                colors,
            },
        );
        persist::write_json_atomic(&self.path, &self.file)
    }
}
