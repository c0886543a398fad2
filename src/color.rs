//! Color type shared by the RGB engine, profiles and packers.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// RGB color with floating channels (0-255) and a brightness factor.
///
/// Channels stay unscaled; brightness is only applied when a frame is
/// emitted, so stored colors never lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub brightness: f64,
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(255.0, 255.0, 255.0);

    pub const fn new(red: f64, green: f64, blue: f64) -> Self {
        Self {
            red,
            green,
            blue,
            brightness: 1.0,
        }
    }

    pub fn from_bytes(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f64, g as f64, b as f64)
    }

    /// Create from HSV (h: 0-360, s: 0-1, v: 0-1).
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match (h / 60.0) as i32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        Self::new((r + m) * 255.0, (g + m) * 255.0, (b + m) * 255.0)
    }

    /// Uniformly random fully saturated color.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self::from_hsv(rng.random_range(0.0..360.0), 1.0, 1.0)
    }

    /// Linearly interpolate between two colors.
    pub fn lerp(a: Color, b: Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            red: a.red + (b.red - a.red) * t,
            green: a.green + (b.green - a.green) * t,
            blue: a.blue + (b.blue - a.blue) * t,
            brightness: a.brightness + (b.brightness - a.brightness) * t,
        }
    }

    /// Scale channels by `factor` (clamped to [0, 1]).
    pub fn scale(self, factor: f64) -> Self {
        let f = factor.clamp(0.0, 1.0);
        Color {
            red: self.red * f,
            green: self.green * f,
            blue: self.blue * f,
            brightness: self.brightness,
        }
    }

    /// Wire bytes after applying `brightness`, rounded to nearest.
    pub fn to_bytes(self, brightness: f64) -> [u8; 3] {
        let f = brightness.clamp(0.0, 1.0);
        let ch = |v: f64| (v.clamp(0.0, 255.0) * f).round() as u8;
        [ch(self.red), ch(self.green), ch(self.blue)]
    }

    /// `#RRGGBB`
    pub fn hex(&self) -> String {
        let [r, g, b] = self.to_bytes(1.0);
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Parse a color string: "#RRGGBB" or a basic color name.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 6 {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self::from_bytes(r, g, b));
            }
            return None;
        }
        match s.to_ascii_lowercase().as_str() {
            "red" => Some(Self::from_bytes(255, 0, 0)),
            "green" => Some(Self::from_bytes(0, 255, 0)),
            "blue" => Some(Self::from_bytes(0, 0, 255)),
            "white" => Some(Self::WHITE),
            "black" | "off" => Some(Self::BLACK),
            "orange" => Some(Self::from_bytes(255, 165, 0)),
            "purple" => Some(Self::from_bytes(128, 0, 255)),
            _ => None,
        }
    }
}

/// Flatten colors into an interleaved `R,G,B` byte buffer.
pub fn to_rgb_buffer(colors: &[Color], brightness: f64) -> Vec<u8> {
    colors.iter().flat_map(|c| c.to_bytes(brightness)).collect()
}
