//! Frame generators
//!
//! Pure functions producing one color per LED. Positional patterns take
//! an explicit position or phase so the caller owns all animation state.

use rand::Rng;

use crate::color::Color;

pub fn off(leds: usize) -> Vec<Color> {
    vec![Color::BLACK; leds]
}

pub fn solid(leds: usize, color: Color) -> Vec<Color> {
    vec![color; leds]
}

fn cycle_degrees(elapsed: f64, speed: f64) -> f64 {
    (elapsed / speed.max(f64::EPSILON)) * 360.0
}

/// Hue rotating along the strip, one full cycle every `speed` seconds.
pub fn rainbow(leds: usize, elapsed: f64, speed: f64) -> Vec<Color> {
    hue_strip(leds, elapsed, speed, 1.0, 1.0)
}

/// Rainbow at half saturation.
pub fn pastel_rainbow(leds: usize, elapsed: f64, speed: f64) -> Vec<Color> {
    hue_strip(leds, elapsed, speed, 1.0, 0.5)
}

/// Two hue turns along the strip.
pub fn spiral_rainbow(leds: usize, elapsed: f64, speed: f64) -> Vec<Color> {
    hue_strip(leds, elapsed, speed, 2.0, 1.0)
}

fn hue_strip(leds: usize, elapsed: f64, speed: f64, turns: f64, saturation: f64) -> Vec<Color> {
    let base = cycle_degrees(elapsed, speed);
    let n = leds.max(1) as f64;
    (0..leds)
        .map(|i| Color::from_hsv(base + i as f64 * 360.0 * turns / n, saturation, 1.0))
        .collect()
}

/// Triangle wave over `smoothness` steps: 0 → 1 → 0.
pub fn pulse_factor(counter: i32, smoothness: i32) -> f64 {
    let s = smoothness.max(1) as f64;
    let phase = (counter.rem_euclid(smoothness.max(1))) as f64 / s;
    1.0 - (2.0 * phase - 1.0).abs()
}

/// Every LED at the same blend of `a` and `b`.
pub fn blend(leds: usize, a: Color, b: Color, t: f64) -> Vec<Color> {
    vec![Color::lerp(a, b, t); leds]
}

/// A window of `width` LEDs in `start` moving over an `end` background.
pub fn circle(leds: usize, pos: usize, width: usize, start: Color, end: Color) -> Vec<Color> {
    let n = leds.max(1);
    let width = width.clamp(1, n);
    (0..leds)
        .map(|i| {
            let dist = (i + n - pos % n) % n;
            if dist < width {
                start
            } else {
                end
            }
        })
        .collect()
}

/// LEDs up to `pos` in `start`, the rest in `end`.
pub fn circle_shift(leds: usize, pos: usize, start: Color, end: Color) -> Vec<Color> {
    (0..leds)
        .map(|i| if i <= pos { start } else { end })
        .collect()
}

/// A single head LED with a fading three-LED tail.
pub fn spinner(leds: usize, pos: usize, start: Color, end: Color) -> Vec<Color> {
    let n = leds.max(1);
    let mut frame = vec![end; leds];
    for (step, weight) in [1.0, 0.6, 0.3].into_iter().enumerate() {
        if step >= n {
            break;
        }
        let idx = (pos + n - step) % n;
        if let Some(slot) = frame.get_mut(idx) {
            *slot = Color::lerp(end, start, weight);
        }
    }
    frame
}

/// Alternating blocks of `start` and `end`, shifted by `pos`.
pub fn rotator(leds: usize, pos: usize, block: usize, start: Color, end: Color) -> Vec<Color> {
    let block = block.max(1);
    (0..leds)
        .map(|i| {
            if ((i + pos) / block) % 2 == 0 {
                start
            } else {
                end
            }
        })
        .collect()
}

/// Sine wave of `start` over `end`; `phase` in radians.
pub fn wave(leds: usize, phase: f64, start: Color, end: Color) -> Vec<Color> {
    let n = leds.max(1) as f64;
    (0..leds)
        .map(|i| {
            let x = std::f64::consts::TAU * i as f64 / n - phase;
            Color::lerp(end, start, (x.sin() + 1.0) / 2.0)
        })
        .collect()
}

/// Map `temp` within `[min, max]` onto the `start` → `end` gradient.
pub fn temperature(leds: usize, temp: f64, min: f64, max: f64, start: Color, end: Color) -> Vec<Color> {
    let t = if max > min {
        (temp - min) / (max - min)
    } else {
        1.0
    };
    blend(leds, start, end, t)
}

/// Sample a multi-stop palette at `p` in [0, 1).
pub fn sample_gradient(palette: &[Color], p: f64) -> Color {
    match palette.len() {
        0 => Color::BLACK,
        1 => palette[0],
        len => {
            let segments = (len - 1) as f64;
            let x = p.rem_euclid(1.0) * segments;
            let idx = (x.floor() as usize).min(len - 2);
            Color::lerp(palette[idx], palette[idx + 1], x - idx as f64)
        }
    }
}

/// Palette stretched along the strip and shifted by `phase`.
///
/// The palette is mirrored so the shift wraps without a seam.
pub fn gradient(leds: usize, palette: &[Color], phase: f64) -> Vec<Color> {
    let mut mirrored = palette.to_vec();
    mirrored.extend(palette.iter().rev().skip(1));
    let n = leds.max(1) as f64;
    (0..leds)
        .map(|i| sample_gradient(&mirrored, i as f64 / n + phase))
        .collect()
}

/// Per-LED random dimming of `start`; some LEDs drop to `end`.
pub fn flickering<R: Rng>(leds: usize, start: Color, end: Color, rng: &mut R) -> Vec<Color> {
    (0..leds)
        .map(|_| {
            if rng.random_bool(0.15) {
                end
            } else {
                start.scale(rng.random_range(0.3..=1.0))
            }
        })
        .collect()
}

/// Background `end` with random `start` flashes.
pub fn storm<R: Rng>(leds: usize, start: Color, end: Color, rng: &mut R) -> Vec<Color> {
    (0..leds)
        .map(|_| if rng.random_bool(0.05) { start } else { end })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::new(255.0, 0.0, 0.0);
    const BLUE: Color = Color::new(0.0, 0.0, 255.0);

    #[test]
    fn test_rainbow_spreads_hue() {
        let f = rainbow(3, 0.0, 4.0);
        assert_eq!(f[0].to_bytes(1.0), [255, 0, 0]);
        assert_eq!(f[1].to_bytes(1.0), [0, 255, 0]);
        assert_eq!(f[2].to_bytes(1.0), [0, 0, 255]);
        // one full cycle later the frame repeats
        let g = rainbow(3, 4.0, 4.0);
        assert_eq!(g[0].to_bytes(1.0), [255, 0, 0]);
    }

    #[test]
    fn test_pastel_is_desaturated() {
        let f = pastel_rainbow(1, 0.0, 1.0);
        assert_eq!(f[0].to_bytes(1.0), [255, 128, 128]);
    }

    #[test]
    fn test_pulse_factor_triangle() {
        assert_eq!(pulse_factor(0, 10), 0.0);
        assert_eq!(pulse_factor(5, 10), 1.0);
        assert!((pulse_factor(8, 10) - 0.4).abs() < 1e-9);
        assert_eq!(pulse_factor(10, 10), 0.0);
    }

    #[test]
    fn test_circle_window_wraps() {
        let f = circle(4, 3, 2, RED, BLUE);
        assert_eq!(f, vec![RED, BLUE, BLUE, RED]);
    }

    #[test]
    fn test_circle_shift_fills() {
        let f = circle_shift(4, 1, RED, BLUE);
        assert_eq!(f, vec![RED, RED, BLUE, BLUE]);
    }

    #[test]
    fn test_spinner_head_and_tail() {
        let f = spinner(5, 0, RED, BLUE);
        assert_eq!(f[0], RED);
        assert_eq!(f[2], BLUE);
        assert!(f[4].red > f[3].red);
    }

    #[test]
    fn test_rotator_blocks() {
        let f = rotator(4, 0, 2, RED, BLUE);
        assert_eq!(f, vec![RED, RED, BLUE, BLUE]);
        let f = rotator(4, 1, 2, RED, BLUE);
        assert_eq!(f, vec![RED, BLUE, BLUE, RED]);
    }

    #[test]
    fn test_temperature_endpoints() {
        assert_eq!(temperature(1, 30.0, 30.0, 70.0, BLUE, RED)[0], BLUE);
        assert_eq!(temperature(1, 90.0, 30.0, 70.0, BLUE, RED)[0], RED);
        let mid = temperature(1, 50.0, 30.0, 70.0, BLUE, RED)[0];
        assert_eq!(mid.to_bytes(1.0), [128, 0, 128]);
    }

    #[test]
    fn test_sample_gradient_stops() {
        let pal = [RED, Color::WHITE, BLUE];
        assert_eq!(sample_gradient(&pal, 0.0), RED);
        assert_eq!(sample_gradient(&pal, 0.5), Color::WHITE);
        assert_eq!(sample_gradient(&[], 0.3), Color::BLACK);
    }

    #[test]
    fn test_random_generators_keep_length() {
        let mut rng = rand::rng();
        assert_eq!(flickering(7, RED, BLUE, &mut rng).len(), 7);
        let s = storm(9, RED, BLUE, &mut rng);
        assert!(s.iter().all(|c| *c == RED || *c == BLUE));
    }
}
