//! Per-port animation state and brightness composition
//!
//! An [`Animation`] owns every counter its mode needs, so one instance per
//! port is the whole engine state for that port. Brightness is applied
//! only when the frame is converted to wire bytes.

use std::time::Instant;

use super::generators;
use super::{Mode, RgbProfile};
use crate::color::{self, Color};

/// Brightness factors of the four brightness modes (0-3).
pub const BRIGHTNESS_MODES: [f64; 4] = [1.0, 0.33, 0.66, 1.0];

/// Per-tick inputs that come from outside the animation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInput {
    /// Temperature for temperature-mapped modes (°C)
    pub temperature: f64,
}

/// Combined brightness factor for a frame.
///
/// The slider (0-100) wins over the mode index when present. Custom color
/// modes skip the per-profile brightness.
pub fn compose_brightness(
    slider: Option<u8>,
    mode: u8,
    profile_brightness: f64,
    custom_colors: bool,
) -> f64 {
    let device = match slider {
        Some(s) => f64::from(s.min(100)) / 100.0,
        None => BRIGHTNESS_MODES
            .get(mode as usize)
            .copied()
            .unwrap_or(1.0),
    };
    if custom_colors {
        device
    } else {
        device * profile_brightness.clamp(0.0, 1.0)
    }
}

/// Running animation for one port or device.
pub struct Animation {
    mode: Mode,
    profile: RgbProfile,
    leds: usize,
    started: Instant,
    counter: i32,
    position: usize,
    reverse: bool,
    start: Color,
    end: Color,
    custom: Vec<Color>,
    water_from: Vec<Color>,
    water_to: Vec<Color>,
}

impl Animation {
    pub fn new(mode: Mode, profile: RgbProfile, leds: usize) -> Self {
        let start = profile.start_color;
        let end = profile.end_color;
        Self {
            mode,
            profile,
            leds,
            started: Instant::now(),
            counter: 0,
            position: 0,
            reverse: false,
            start,
            end,
            custom: Vec::new(),
            water_from: Vec::new(),
            water_to: Vec::new(),
        }
    }

    /// Caller supplied colors for `led` and `keyboard` modes.
    pub fn with_custom(mut self, colors: Vec<Color>) -> Self {
        self.custom = colors;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn leds(&self) -> usize {
        self.leds
    }

    pub fn profile(&self) -> &RgbProfile {
        &self.profile
    }

    pub fn is_static(&self) -> bool {
        self.mode.is_static()
    }

    /// Current warp colors (start, end).
    pub fn warp_colors(&self) -> (Color, Color) {
        (self.start, self.end)
    }

    /// Brightness factor for this animation given the device settings.
    pub fn brightness(&self, slider: Option<u8>, mode: u8) -> f64 {
        compose_brightness(
            slider,
            mode,
            self.profile.brightness,
            self.mode.uses_custom_colors(),
        )
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Advance the bounded counter; returns `true` when it wrapped.
    fn step(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.profile.smoothness() {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    fn progress(&self) -> f64 {
        f64::from(self.counter) / f64::from(self.profile.smoothness())
    }

    fn advance_position(&mut self) -> usize {
        let pos = self.position;
        self.position = (self.position + 1) % self.leds.max(1);
        pos
    }

    /// Produce the next frame, `leds` colors long.
    pub fn frame(&mut self, input: &FrameInput) -> Vec<Color> {
        let n = self.leds;
        let speed = self.profile.speed();
        match self.mode {
            Mode::Off => generators::off(n),
            Mode::Static => generators::solid(n, self.profile.start_color),
            Mode::Led | Mode::Keyboard => {
                let mut frame = self.custom.clone();
                frame.resize(n, Color::BLACK);
                frame
            }
            Mode::Rainbow => generators::rainbow(n, self.elapsed(), speed),
            Mode::PastelRainbow => generators::pastel_rainbow(n, self.elapsed(), speed),
            Mode::SpiralRainbow => generators::spiral_rainbow(n, self.elapsed(), speed),
            Mode::Watercolor => self.watercolor(),
            Mode::ColorPulse => {
                let t = generators::pulse_factor(self.counter, self.profile.smoothness());
                self.step();
                generators::blend(n, self.start, self.end, t)
            }
            Mode::ColorShift => {
                let t = self.progress();
                let t = if self.reverse { 1.0 - t } else { t };
                if self.step() {
                    self.reverse = !self.reverse;
                }
                generators::blend(n, self.start, self.end, t)
            }
            Mode::ColorWarp => {
                let t = self.progress();
                let frame = generators::blend(n, self.start, self.end, t);
                if self.step() {
                    self.start = self.end;
                    self.end = Color::random();
                    self.reverse = !self.reverse;
                }
                frame
            }
            Mode::Flickering => generators::flickering(n, self.start, self.end, &mut rand::rng()),
            Mode::Storm => generators::storm(n, self.start, self.end, &mut rand::rng()),
            Mode::Circle => {
                let pos = self.advance_position();
                generators::circle(n, pos, (n / 4).max(1), self.start, self.end)
            }
            Mode::CircleShift => {
                let pos = self.advance_position();
                if pos + 1 == n {
                    std::mem::swap(&mut self.start, &mut self.end);
                }
                generators::circle_shift(n, pos, self.start, self.end)
            }
            Mode::Spinner => {
                let pos = self.advance_position();
                generators::spinner(n, pos, self.start, self.end)
            }
            Mode::Rotator => {
                let pos = self.advance_position();
                generators::rotator(n, pos, (n / 4).max(1), self.start, self.end)
            }
            Mode::Wave => {
                let phase = self.elapsed() / speed * std::f64::consts::TAU;
                generators::wave(n, phase, self.start, self.end)
            }
            Mode::Temperature(_) => generators::temperature(
                n,
                input.temperature,
                self.profile.min_temp,
                self.profile.max_temp,
                self.start,
                self.end,
            ),
            Mode::Gradient => {
                let phase = self.elapsed() / speed;
                generators::gradient(n, &self.profile.palette(), phase)
            }
        }
    }

    fn watercolor(&mut self) -> Vec<Color> {
        let n = self.leds;
        if self.water_to.len() != n {
            self.water_from = (0..n).map(|_| Color::random()).collect();
            self.water_to = (0..n).map(|_| Color::random()).collect();
            self.counter = 0;
        }
        let t = self.progress();
        let frame = self
            .water_from
            .iter()
            .zip(&self.water_to)
            .map(|(a, b)| Color::lerp(*a, *b, t))
            .collect();
        if self.step() {
            self.water_from = std::mem::take(&mut self.water_to);
            self.water_to = (0..n).map(|_| Color::random()).collect();
        }
        frame
    }

    /// Next frame as interleaved `R,G,B` bytes with `brightness` applied.
    pub fn render(&mut self, input: &FrameInput, brightness: f64) -> Vec<u8> {
        let frame = self.frame(input);
        color::to_rgb_buffer(&frame, brightness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(start: Color, end: Color, smoothness: i32) -> RgbProfile {
        RgbProfile {
            start_color: start,
            end_color: end,
            smoothness,
            ..Default::default()
        }
    }

    #[test]
    fn test_brightness_slider_overrides_mode() {
        assert_eq!(compose_brightness(None, 1, 1.0, false), 0.33);
        assert_eq!(compose_brightness(Some(50), 1, 1.0, false), 0.5);
        assert_eq!(compose_brightness(Some(50), 0, 0.5, false), 0.25);
        assert_eq!(compose_brightness(Some(50), 0, 0.5, true), 0.5);
        assert_eq!(compose_brightness(None, 9, 1.0, false), 1.0);
    }

    #[test]
    fn test_output_length() {
        for name in Mode::NAMES {
            let mode = Mode::parse(name).unwrap();
            let mut a = Animation::new(mode, RgbProfile::default(), 12);
            let bytes = a.render(&FrameInput::default(), 1.0);
            assert_eq!(bytes.len(), 36, "{name}");
        }
    }

    #[test]
    fn test_static_frame_is_start_color() {
        let mut a = Animation::new(
            Mode::Static,
            profile(Color::from_bytes(10, 20, 30), Color::BLACK, 10),
            2,
        );
        assert_eq!(a.render(&FrameInput::default(), 1.0), vec![10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn test_brightness_applied_at_emit() {
        let mut a = Animation::new(
            Mode::Static,
            profile(Color::from_bytes(200, 100, 0), Color::BLACK, 10),
            1,
        );
        assert_eq!(a.render(&FrameInput::default(), 0.5), vec![100, 50, 0]);
        // stored colors stay unscaled
        assert_eq!(a.render(&FrameInput::default(), 1.0), vec![200, 100, 0]);
    }

    #[test]
    fn test_colorshift_ping_pong() {
        let red = Color::from_bytes(255, 0, 0);
        let blue = Color::from_bytes(0, 0, 255);
        let mut a = Animation::new(Mode::ColorShift, profile(red, blue, 2), 1);
        let input = FrameInput::default();
        let frames: Vec<_> = (0..4).map(|_| a.frame(&input)[0].to_bytes(1.0)).collect();
        assert_eq!(frames[0], [255, 0, 0]);
        assert_eq!(frames[1], [128, 0, 128]);
        // reversed half walks back from the end color
        assert_eq!(frames[2], [0, 0, 255]);
        assert_eq!(frames[3], [128, 0, 128]);
    }

    #[test]
    fn test_colorwarp_start_takes_previous_end() {
        let red = Color::from_bytes(255, 0, 0);
        let blue = Color::from_bytes(0, 0, 255);
        let mut a = Animation::new(Mode::ColorWarp, profile(red, blue, 2), 1);
        let input = FrameInput::default();
        a.frame(&input);
        a.frame(&input);
        let (start, _) = a.warp_colors();
        assert_eq!(start, blue);
    }

    #[test]
    fn test_temperature_mode_uses_input() {
        let mut a = Animation::new(
            Mode::Temperature(super::super::TempSource::Cpu),
            profile(Color::from_bytes(0, 255, 0), Color::from_bytes(255, 0, 0), 10),
            1,
        );
        let hot = a.render(&FrameInput { temperature: 80.0 }, 1.0);
        assert_eq!(hot, vec![255, 0, 0]);
    }

    #[test]
    fn test_custom_colors_padded() {
        let mut a = Animation::new(Mode::Led, RgbProfile::default(), 3)
            .with_custom(vec![Color::WHITE]);
        assert_eq!(
            a.render(&FrameInput::default(), 1.0),
            vec![255, 255, 255, 0, 0, 0, 0, 0, 0]
        );
    }
}
