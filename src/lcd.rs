//! LCD telemetry frames for iCUE LINK AIO caps
//!
//! A renderer turns a [`LcdFrame`] into an encoded image; the pipeline
//! splits the image into framed 1024-byte reports and writes them to the
//! LCD interface.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};
use linkhub_transport::lcd::lcd_reports;
use linkhub_transport::HidTransport;
use tracing::{debug, warn};

use crate::error::Result;
use crate::profile::types::lcd_mode;

/// Panel edge length in pixels
pub const LCD_SIZE: u32 = 480;

const JPEG_QUALITY: u8 = 85;

/// One value shown on the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct LcdValue {
    pub label: &'static str,
    pub value: f64,
    /// Value at which the gauge is full
    pub max: f64,
}

/// Everything the renderer draws for one redraw.
#[derive(Debug, Clone, PartialEq)]
pub struct LcdFrame {
    pub mode: u8,
    pub values: Vec<LcdValue>,
}

/// Live readings the LCD modes choose from.
#[derive(Debug, Clone, Copy, Default)]
pub struct Telemetry {
    pub cpu: f64,
    pub gpu: f64,
    pub liquid: f64,
    pub pump_rpm: f64,
}

fn temp(label: &'static str, value: f64) -> LcdValue {
    LcdValue {
        label,
        value,
        max: 100.0,
    }
}

/// Values to show for `mode`; unknown modes fall back to liquid.
pub fn frame_for(mode: u8, t: &Telemetry) -> LcdFrame {
    let pump = LcdValue {
        label: "PUMP",
        value: t.pump_rpm,
        max: 3000.0,
    };
    let values = match mode {
        lcd_mode::CPU => vec![temp("CPU", t.cpu)],
        lcd_mode::GPU => vec![temp("GPU", t.gpu)],
        lcd_mode::PUMP => vec![pump],
        lcd_mode::ALL_IN_ONE => vec![
            temp("LIQUID", t.liquid),
            temp("CPU", t.cpu),
            temp("GPU", t.gpu),
            pump,
        ],
        _ => vec![temp("LIQUID", t.liquid)],
    };
    LcdFrame { mode, values }
}

/// Produces encoded images for the panel.
pub trait LcdRenderer: Send + Sync {
    fn render(&self, frame: &LcdFrame) -> Result<Vec<u8>>;
}

/// Gauge ring plus seven-segment digits, encoded as JPEG.
#[derive(Debug, Clone)]
pub struct GaugeRenderer {
    size: u32,
    accent: Rgb<u8>,
}

impl Default for GaugeRenderer {
    fn default() -> Self {
        Self {
            size: LCD_SIZE,
            accent: Rgb([0, 170, 255]),
        }
    }
}

// Segments a..g, clockwise from the top, g in the middle
const DIGIT_SEGMENTS: [u8; 10] = [
    0b0111111, 0b0000110, 0b1011011, 0b1001111, 0b1100110, 0b1101101, 0b1111101, 0b0000111,
    0b1111111, 0b1101111,
];

impl GaugeRenderer {
    pub fn new(size: u32) -> Self {
        Self {
            size: size.max(32),
            ..Default::default()
        }
    }

    fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
        let (iw, ih) = img.dimensions();
        for py in y..(y + h).min(ih) {
            for px in x..(x + w).min(iw) {
                img.put_pixel(px, py, color);
            }
        }
    }

    fn draw_digit(img: &mut RgbImage, digit: u8, x: u32, y: u32, h: u32, color: Rgb<u8>) {
        let w = h / 2;
        let t = (h / 10).max(1);
        let half = h / 2;
        let segs = DIGIT_SEGMENTS[(digit % 10) as usize];
        let rects = [
            (x, y, w, t),                     // a
            (x + w - t, y, t, half),          // b
            (x + w - t, y + half, t, half),   // c
            (x, y + h - t, w, t),             // d
            (x, y + half, t, half),           // e
            (x, y, t, half),                  // f
            (x, y + half - t / 2, w, t),      // g
        ];
        for (i, &(rx, ry, rw, rh)) in rects.iter().enumerate() {
            if segs & (1 << i) != 0 {
                Self::fill_rect(img, rx, ry, rw, rh, color);
            }
        }
    }

    fn draw_number(img: &mut RgbImage, value: f64, cx: u32, y: u32, h: u32, color: Rgb<u8>) {
        let text = format!("{}", value.max(0.0).round() as u64);
        let w = h / 2;
        let gap = (h / 6).max(1);
        let total = text.len() as u32 * (w + gap);
        let mut x = cx.saturating_sub(total / 2);
        for c in text.bytes() {
            Self::draw_digit(img, c - b'0', x, y, h, color);
            x += w + gap;
        }
    }

    /// Ring of `fraction` (0-1) drawn clockwise from 12 o'clock.
    fn draw_ring(&self, img: &mut RgbImage, fraction: f64) {
        let c = f64::from(self.size) / 2.0;
        let outer = c * 0.95;
        let inner = c * 0.82;
        let track = Rgb([40, 40, 40]);
        for y in 0..self.size {
            for x in 0..self.size {
                let dx = f64::from(x) - c;
                let dy = f64::from(y) - c;
                let r = (dx * dx + dy * dy).sqrt();
                if r < inner || r > outer {
                    continue;
                }
                let angle = (dx.atan2(-dy) / std::f64::consts::TAU).rem_euclid(1.0);
                let color = if angle <= fraction { self.accent } else { track };
                img.put_pixel(x, y, color);
            }
        }
    }

    /// Raw RGB image for `frame`.
    pub fn draw(&self, frame: &LcdFrame) -> RgbImage {
        let mut img = RgbImage::new(self.size, self.size);
        let white = Rgb([255, 255, 255]);
        let Some(main) = frame.values.first() else {
            return img;
        };
        let fraction = if main.max > 0.0 {
            (main.value / main.max).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.draw_ring(&mut img, fraction);

        let digit_h = self.size / 4;
        Self::draw_number(
            &mut img,
            main.value,
            self.size / 2,
            self.size / 2 - digit_h / 2,
            digit_h,
            white,
        );

        // secondary values as small bars under the main value
        let bar_w = self.size / 3;
        let bar_h = (self.size / 40).max(2);
        let mut y = self.size / 2 + digit_h / 2 + bar_h * 2;
        for v in frame.values.iter().skip(1) {
            let x = self.size / 2 - bar_w / 2;
            Self::fill_rect(&mut img, x, y, bar_w, bar_h, Rgb([60, 60, 60]));
            let filled = if v.max > 0.0 {
                (f64::from(bar_w) * (v.value / v.max).clamp(0.0, 1.0)) as u32
            } else {
                0
            };
            Self::fill_rect(&mut img, x, y, filled, bar_h, self.accent);
            y += bar_h * 2;
        }
        img
    }
}

impl LcdRenderer for GaugeRenderer {
    fn render(&self, frame: &LcdFrame) -> Result<Vec<u8>> {
        let img = self.draw(frame);
        let mut out = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        encoder.encode(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)?;
        Ok(out.into_inner())
    }
}

/// Renderer plus the LCD interface it streams to.
pub struct LcdPipeline {
    transport: HidTransport,
    renderer: Box<dyn LcdRenderer>,
}

impl LcdPipeline {
    pub fn new(transport: HidTransport, renderer: Box<dyn LcdRenderer>) -> Self {
        Self {
            transport,
            renderer,
        }
    }

    /// Render and stream one frame; returns the number of reports written.
    pub fn push(&self, frame: &LcdFrame) -> Result<usize> {
        let image = self.renderer.render(frame)?;
        let reports = lcd_reports(&image);
        for report in &reports {
            if let Err(e) = self.transport.write_raw(report) {
                warn!(
                    "{}: LCD write failed: {e}",
                    self.transport.info().effective_serial()
                );
                return Err(e.into());
            }
        }
        debug!("LCD frame: {} bytes in {} reports", image.len(), reports.len());
        Ok(reports.len())
    }

    pub fn close(&self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkhub_transport::lcd::{LCD_CHUNK_SIZE, LCD_REPORT_SIZE};
    use linkhub_transport::mock::MockDevice;
    use linkhub_transport::{Framing, TransportDeviceInfo};

    struct FixedRenderer(usize);

    impl LcdRenderer for FixedRenderer {
        fn render(&self, _frame: &LcdFrame) -> Result<Vec<u8>> {
            Ok(vec![0x5a; self.0])
        }
    }

    #[test]
    fn test_frame_for_modes() {
        let t = Telemetry {
            cpu: 40.0,
            gpu: 50.0,
            liquid: 31.5,
            pump_rpm: 2200.0,
        };
        assert_eq!(frame_for(lcd_mode::CPU, &t).values[0].value, 40.0);
        assert_eq!(frame_for(lcd_mode::LIQUID, &t).values[0].label, "LIQUID");
        assert_eq!(frame_for(lcd_mode::ALL_IN_ONE, &t).values.len(), 4);
        assert_eq!(frame_for(42, &t).values[0].label, "LIQUID");
    }

    #[test]
    fn test_gauge_renders_jpeg() {
        let r = GaugeRenderer::new(64);
        let frame = frame_for(lcd_mode::CPU, &Telemetry::default());
        let jpeg = r.render(&frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_ring_fraction() {
        let r = GaugeRenderer::new(100);
        let frame = LcdFrame {
            mode: 0,
            values: vec![LcdValue {
                label: "CPU",
                value: 50.0,
                max: 100.0,
            }],
        };
        let img = r.draw(&frame);
        // right side of the ring (3 o'clock) is lit, left side is track
        assert_eq!(*img.get_pixel(93, 50), Rgb([0, 170, 255]));
        assert_eq!(*img.get_pixel(6, 50), Rgb([40, 40, 40]));
    }

    #[test]
    fn test_pipeline_chunks_image() {
        let (dev, handle) = MockDevice::new(|_| None);
        let transport = HidTransport::new(
            Box::new(dev),
            TransportDeviceInfo::default(),
            Framing::Command { route: 0x08 },
        );
        let pipeline = LcdPipeline::new(transport, Box::new(FixedRenderer(LCD_CHUNK_SIZE + 1)));
        let frame = frame_for(lcd_mode::CPU, &Telemetry::default());
        assert_eq!(pipeline.push(&frame).unwrap(), 2);
        let writes = handle.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| w.len() == LCD_REPORT_SIZE));
        assert_eq!(writes[1][3], 0x01);
    }
}
