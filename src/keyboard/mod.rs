//! Keyboard layouts, key hashing and key actions
//!
//! A layout describes rows of keys; every key lists the offsets it
//! occupies in the device's color frame (`packetIndex`) and the hashes
//! the device reports when it is pressed.

pub mod actions;
pub mod assets;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::color::Color;

pub use actions::{brightness_step, dial_brightness, Action, KeyDispatcher, KeyEffect};
pub use assets::KeyboardAssets;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    #[serde(default)]
    pub key_name: String,
    #[serde(default = "default_unit")]
    pub width: u16,
    #[serde(default = "default_unit")]
    pub height: u16,
    #[serde(default)]
    pub left: i32,
    #[serde(default)]
    pub top: i32,
    /// Offsets of this key in the color frame
    #[serde(default)]
    pub packet_index: Vec<usize>,
    #[serde(default)]
    pub color: Color,
    /// Hashes reported by the device when pressed
    #[serde(default)]
    pub key_hash: Vec<String>,
    #[serde(default)]
    pub action_type: u8,
    #[serde(default)]
    pub action_command: u32,
    #[serde(default)]
    pub action_hold: bool,
    #[serde(default)]
    pub is_lock: bool,
    /// Key only carries a color, no action
    #[serde(default)]
    pub only_color: bool,
    #[serde(default)]
    pub custom_key_data: serde_json::Value,
}

fn default_unit() -> u16 {
    1
}

impl Default for Key {
    fn default() -> Self {
        Self {
            key_name: String::new(),
            width: 1,
            height: 1,
            left: 0,
            top: 0,
            packet_index: Vec::new(),
            color: Color::default(),
            key_hash: Vec::new(),
            action_type: 0,
            action_command: 0,
            action_hold: false,
            is_lock: false,
            only_color: false,
            custom_key_data: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub keys: BTreeMap<i32, Key>,
}

/// Keyboard layout: rows → keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyboard {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub row: BTreeMap<i32, Row>,
}

impl Keyboard {
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.row.values().flat_map(|r| r.keys.values())
    }

    pub fn keys_mut(&mut self) -> impl Iterator<Item = &mut Key> {
        self.row.values_mut().flat_map(|r| r.keys.values_mut())
    }

    /// Key whose hash list contains `hash`
    pub fn find_by_hash(&self, hash: &str) -> Option<&Key> {
        self.keys().find(|k| k.key_hash.iter().any(|h| h == hash))
    }

    /// Set every key to `color`
    pub fn fill(&mut self, color: Color) {
        for key in self.keys_mut() {
            key.color = color;
        }
    }

    /// Set one key by (row, key) id. Returns `false` if absent.
    pub fn set_key_color(&mut self, row: i32, key: i32, color: Color) -> bool {
        match self.row.get_mut(&row).and_then(|r| r.keys.get_mut(&key)) {
            Some(k) => {
                k.color = color;
                true
            }
            None => false,
        }
    }

    /// Key colors in iteration order (row, then key id).
    pub fn key_colors(&self) -> Vec<Color> {
        self.keys().map(|k| k.color).collect()
    }

    pub fn key_count(&self) -> usize {
        self.keys().count()
    }

    /// Layout of `count` keys on one row, key `i` at frame offset
    /// `i * stride`. Used when no layout file exists.
    pub fn linear(key: &str, device: &str, layout: &str, count: usize, stride: usize) -> Self {
        let keys = (0..count)
            .map(|i| {
                (
                    i as i32,
                    Key {
                        key_name: format!("Key {}", i + 1),
                        left: i as i32,
                        packet_index: vec![i * stride],
                        ..Default::default()
                    },
                )
            })
            .collect();
        let mut row = BTreeMap::new();
        row.insert(0, Row { keys });
        Self {
            key: key.to_string(),
            device: device.to_string(),
            layout: layout.to_string(),
            row,
        }
    }
}

/// Hash of a key report: the bytes reversed and read as one big number,
/// rendered as lowercase hex without leading zeros ("0" when empty).
pub fn key_hash(data: &[u8]) -> String {
    let hex: String = data.iter().rev().map(|b| format!("{b:02x}")).collect();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
