//! RGB animation profiles, their on-disk store and the frame engine
//!
//! A device's RGB file holds named [`RgbProfile`]s; channels reference
//! them by name. The [`engine`] turns a profile into per-tick frames and
//! [`store`] owns loading, defaults and schema upgrades.

pub mod engine;
pub mod generators;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::color::Color;

pub use engine::{compose_brightness, Animation, FrameInput};
pub use store::{RgbFile, RgbStore};

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;
pub const MIN_SMOOTHNESS: i32 = 1;
pub const MAX_SMOOTHNESS: i32 = 100;

/// Parameters of one animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RgbProfile {
    /// Seconds per animation cycle
    pub speed: f64,
    /// Per-profile brightness (0.0-1.0)
    pub brightness: f64,
    /// Steps per color transition
    pub smoothness: i32,
    pub start_color: Color,
    pub end_color: Color,
    pub min_temp: f64,
    pub max_temp: f64,
    /// Multi-stop palette for `gradient`, keyed by stop index
    pub gradients: BTreeMap<i32, Color>,
    pub alternate_colors: bool,
}

impl Default for RgbProfile {
    fn default() -> Self {
        Self {
            speed: 4.0,
            brightness: 1.0,
            smoothness: 20,
            start_color: Color::from_bytes(255, 0, 0),
            end_color: Color::from_bytes(0, 0, 255),
            min_temp: 30.0,
            max_temp: 70.0,
            gradients: BTreeMap::new(),
            alternate_colors: false,
        }
    }
}

impl RgbProfile {
    pub fn speed(&self) -> f64 {
        self.speed.clamp(MIN_SPEED, MAX_SPEED)
    }

    pub fn smoothness(&self) -> i32 {
        self.smoothness.clamp(MIN_SMOOTHNESS, MAX_SMOOTHNESS)
    }

    /// Gradient stops in index order, falling back to start/end.
    pub fn palette(&self) -> Vec<Color> {
        if self.gradients.len() >= 2 {
            self.gradients.values().copied().collect()
        } else {
            vec![self.start_color, self.end_color]
        }
    }
}

/// Sensor driving a temperature-mapped animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempSource {
    Cpu,
    Gpu,
    Liquid,
}

/// Animation kinds understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Off,
    Static,
    Rainbow,
    PastelRainbow,
    SpiralRainbow,
    Watercolor,
    ColorPulse,
    ColorShift,
    ColorWarp,
    Flickering,
    Circle,
    CircleShift,
    Spinner,
    Rotator,
    Wave,
    Storm,
    Temperature(TempSource),
    Gradient,
    /// Per-LED colors from the LED store
    Led,
    /// Per-key colors from the keyboard profile
    Keyboard,
}

impl Mode {
    pub const NAMES: [&'static str; 22] = [
        "off",
        "static",
        "rainbow",
        "pastelrainbow",
        "spiralrainbow",
        "watercolor",
        "colorpulse",
        "colorshift",
        "colorwarp",
        "flickering",
        "circle",
        "circleshift",
        "spinner",
        "rotator",
        "wave",
        "storm",
        "cpu-temperature",
        "gpu-temperature",
        "liquid-temperature",
        "gradient",
        "led",
        "keyboard",
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "off" => Mode::Off,
            "static" => Mode::Static,
            "rainbow" => Mode::Rainbow,
            "pastelrainbow" => Mode::PastelRainbow,
            "spiralrainbow" => Mode::SpiralRainbow,
            "watercolor" => Mode::Watercolor,
            "colorpulse" => Mode::ColorPulse,
            "colorshift" => Mode::ColorShift,
            "colorwarp" => Mode::ColorWarp,
            "flickering" => Mode::Flickering,
            "circle" => Mode::Circle,
            "circleshift" => Mode::CircleShift,
            "spinner" => Mode::Spinner,
            "rotator" => Mode::Rotator,
            "wave" => Mode::Wave,
            "storm" => Mode::Storm,
            "cpu-temperature" => Mode::Temperature(TempSource::Cpu),
            "gpu-temperature" => Mode::Temperature(TempSource::Gpu),
            "liquid-temperature" => Mode::Temperature(TempSource::Liquid),
            "gradient" => Mode::Gradient,
            "led" => Mode::Led,
            "keyboard" => Mode::Keyboard,
            _ => return None,
        })
    }

    /// Modes whose frame never changes between ticks.
    pub fn is_static(&self) -> bool {
        matches!(self, Mode::Off | Mode::Static | Mode::Led | Mode::Keyboard)
    }

    /// Modes painting caller supplied colors; the per-profile brightness
    /// does not apply to them.
    pub fn uses_custom_colors(&self) -> bool {
        matches!(self, Mode::Led | Mode::Keyboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_parses() {
        for name in Mode::NAMES {
            assert!(Mode::parse(name).is_some(), "{name}");
        }
        assert!(Mode::parse("disco").is_none());
    }

    #[test]
    fn test_clamps() {
        let p = RgbProfile {
            speed: 50.0,
            smoothness: 0,
            ..Default::default()
        };
        assert_eq!(p.speed(), MAX_SPEED);
        assert_eq!(p.smoothness(), MIN_SMOOTHNESS);
        let p = RgbProfile {
            speed: 0.0,
            smoothness: 500,
            ..Default::default()
        };
        assert_eq!(p.speed(), MIN_SPEED);
        assert_eq!(p.smoothness(), MAX_SMOOTHNESS);
    }

    #[test]
    fn test_profile_json_keys() {
        let json = serde_json::to_value(RgbProfile::default()).unwrap();
        assert!(json.get("startColor").is_some());
        assert!(json.get("minTemp").is_some());
        let p: RgbProfile = serde_json::from_str(r#"{"speed":2}"#).unwrap();
        assert_eq!(p.speed, 2.0);
        assert_eq!(p.smoothness, 20);
    }

    #[test]
    fn test_palette_fallback() {
        let mut p = RgbProfile::default();
        assert_eq!(p.palette().len(), 2);
        p.gradients.insert(0, Color::WHITE);
        p.gradients.insert(1, Color::BLACK);
        p.gradients.insert(2, Color::WHITE);
        assert_eq!(p.palette().len(), 3);
    }
}
