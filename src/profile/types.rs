// Device profile types
// Mirrors the JSON documents under database/profiles

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::color::Color;
use crate::keyboard::Keyboard;

/// Control dial functions
pub mod dial {
    pub const VOLUME: u8 = 1;
    pub const BRIGHTNESS: u8 = 2;
}

/// LCD modes
pub mod lcd_mode {
    pub const CPU: u8 = 0;
    pub const GPU: u8 = 1;
    pub const LIQUID: u8 = 2;
    pub const PUMP: u8 = 3;
    pub const ALL_IN_ONE: u8 = 4;
}

/// LED hub attached to a device port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalHub {
    pub port_id: i32,
    /// Index into the external LED device table
    pub device_type: i32,
    pub device_count: i32,
}

/// Persisted configuration of one physical device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub serial: String,
    /// Brightness mode index (0-3)
    #[serde(default)]
    pub brightness: u8,
    /// Brightness slider (0-100), overrides the mode when set
    #[serde(default)]
    pub brightness_slider: Option<u8>,
    #[serde(default)]
    pub original_brightness: u8,
    #[serde(default)]
    pub rgb_profiles: BTreeMap<i32, String>,
    #[serde(default)]
    pub speed_profiles: BTreeMap<i32, String>,
    #[serde(default)]
    pub labels: BTreeMap<i32, String>,
    #[serde(default)]
    pub keyboards: BTreeMap<String, Keyboard>,
    /// Key of the keyboard layout currently in use
    #[serde(default = "default_keyboard_profile")]
    pub keyboard_profile: String,
    #[serde(default)]
    pub external_hubs: BTreeMap<i32, ExternalHub>,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default = "default_polling_rate")]
    pub polling_rate: u8,
    #[serde(default)]
    pub disable_alt_tab: bool,
    #[serde(default)]
    pub disable_alt_f4: bool,
    #[serde(default)]
    pub disable_shift_tab: bool,
    #[serde(default)]
    pub disable_win_key: bool,
    #[serde(default)]
    pub performance: bool,
    /// Minutes of inactivity before a wireless device sleeps
    #[serde(default = "default_sleep_mode")]
    pub sleep_mode: u32,
    #[serde(default = "default_control_dial")]
    pub control_dial: u8,
    #[serde(default)]
    pub lcd_mode: u8,
    #[serde(default)]
    pub rgb_cluster: bool,
    /// Per-zone colors of stands and mousepads
    #[serde(default)]
    pub zones: BTreeMap<i32, Color>,
    #[serde(default)]
    pub dpi_stages: Vec<u16>,
    #[serde(default)]
    pub dpi_index: usize,
}

fn default_keyboard_profile() -> String {
    "default".to_string()
}

fn default_layout() -> String {
    "US".to_string()
}

fn default_polling_rate() -> u8 {
    1
}

fn default_sleep_mode() -> u32 {
    15
}

fn default_control_dial() -> u8 {
    dial::VOLUME
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            active: false,
            path: String::new(),
            product: String::new(),
            serial: String::new(),
            brightness: 0,
            brightness_slider: None,
            original_brightness: 0,
            rgb_profiles: BTreeMap::new(),
            speed_profiles: BTreeMap::new(),
            labels: BTreeMap::new(),
            keyboards: BTreeMap::new(),
            keyboard_profile: default_keyboard_profile(),
            external_hubs: BTreeMap::new(),
            layout: default_layout(),
            polling_rate: default_polling_rate(),
            disable_alt_tab: false,
            disable_alt_f4: false,
            disable_shift_tab: false,
            disable_win_key: false,
            performance: false,
            sleep_mode: default_sleep_mode(),
            control_dial: default_control_dial(),
            lcd_mode: lcd_mode::CPU,
            rgb_cluster: false,
            zones: BTreeMap::new(),
            dpi_stages: Vec::new(),
            dpi_index: 0,
        }
    }
}

impl DeviceProfile {
    /// Fresh profile for a device
    pub fn new(serial: &str, product: &str) -> Self {
        Self {
            active: true,
            serial: serial.to_string(),
            product: product.to_string(),
            ..Default::default()
        }
    }

    pub fn rgb_profile(&self, channel: i32) -> &str {
        self.rgb_profiles
            .get(&channel)
            .map(String::as_str)
            .unwrap_or("static")
    }

    pub fn speed_profile(&self, channel: i32) -> &str {
        self.speed_profiles
            .get(&channel)
            .map(String::as_str)
            .unwrap_or("Normal")
    }

    pub fn label(&self, channel: i32) -> &str {
        self.labels
            .get(&channel)
            .map(String::as_str)
            .unwrap_or("Not Set")
    }

    /// Keyboard layout in use, if any
    pub fn keyboard(&self) -> Option<&Keyboard> {
        self.keyboards.get(&self.keyboard_profile)
    }

    pub fn keyboard_mut(&mut self) -> Option<&mut Keyboard> {
        self.keyboards.get_mut(&self.keyboard_profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallbacks() {
        let p = DeviceProfile::new("S", "P");
        assert_eq!(p.rgb_profile(3), "static");
        assert_eq!(p.speed_profile(3), "Normal");
        assert_eq!(p.label(3), "Not Set");
        assert!(p.active);
    }

    #[test]
    fn test_camel_case_keys() {
        let mut p = DeviceProfile::new("S", "P");
        p.rgb_profiles.insert(1, "rainbow".into());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["rgbProfiles"]["1"], "rainbow");
        assert!(json.get("brightnessSlider").is_some());
        assert!(json.get("externalHubs").is_some());
        assert_eq!(json["controlDial"], 1);
    }

    #[test]
    fn test_sparse_document_loads() {
        let p: DeviceProfile = serde_json::from_str(r#"{"serial":"X","active":true}"#).unwrap();
        assert_eq!(p.layout, "US");
        assert_eq!(p.sleep_mode, 15);
        assert!(p.rgb_profiles.is_empty());
    }
}
