//! Wire layouts for color frames
//!
//! The RGB engine produces interleaved `R,G,B` bytes per LED. Each device
//! family expects those bytes rearranged: split into planes, reversed to
//! `B,G,R`, or scattered over a fixed-size frame by per-key offsets.

use linkhub_transport::protocol::{self, elite, MAX_CHUNK};

use crate::color::Color;
use crate::keyboard::Keyboard;

/// LEDs carried per planar color chunk
pub const PLANAR_CHUNK: usize = 50;

/// Elite lighting frames always span this many chunks
pub const ELITE_CHUNKS: usize = 4;

/// Data bytes per Elite lighting chunk, after the 2-byte chunk header
pub const ELITE_CHUNK_DATA: usize = elite::MAX_PAYLOAD - 2;

/// Brightness scalar for a port driving `leds` LEDs.
///
/// Long strips draw more current than a port supplies at full white.
pub fn port_protection(leds: usize) -> f64 {
    match leds {
        n if n > 160 => 0.1,
        n if n > 96 => 0.33,
        n if n > 48 => 0.66,
        _ => 1.0,
    }
}

/// Split interleaved RGB into `[R…], [G…], [B…]`.
pub fn split_planes(rgb: &[u8]) -> [Vec<u8>; 3] {
    let mut planes = [Vec::new(), Vec::new(), Vec::new()];
    for px in rgb.chunks_exact(3) {
        for (plane, &byte) in planes.iter_mut().zip(px) {
            plane.push(byte);
        }
    }
    planes
}

/// Commander Pro color payloads: each plane chunked to at most
/// [`PLANAR_CHUNK`] LEDs, every chunk prefixed `[port, offset, len, plane]`.
pub fn planar_chunks(port: u8, rgb: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for (plane, bytes) in split_planes(rgb).iter().enumerate() {
        for (_, offset, chunk) in protocol::chunks(bytes, PLANAR_CHUNK) {
            let mut payload = Vec::with_capacity(4 + chunk.len());
            payload.extend_from_slice(&[port, offset as u8, chunk.len() as u8, plane as u8]);
            payload.extend_from_slice(chunk);
            out.push(payload);
        }
    }
    out
}

/// Reverse every LED to `B,G,R`.
pub fn to_bgr(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect()
}

/// Elite lighting payloads, one per chunk command (`0b100 + index`).
///
/// The first chunk header marks how many leading LEDs belong to the pump;
/// unused trailing chunks are sent zeroed so the frame always has
/// [`ELITE_CHUNKS`] parts.
pub fn elite_chunks(rgb: &[u8], pump_leds: usize) -> Vec<Vec<u8>> {
    let bgr = to_bgr(rgb);
    (0..ELITE_CHUNKS)
        .map(|i| {
            let start = (i * ELITE_CHUNK_DATA).min(bgr.len());
            let end = (start + ELITE_CHUNK_DATA).min(bgr.len());
            let data = &bgr[start..end];
            let mut payload = vec![0u8; 2 + ELITE_CHUNK_DATA];
            if i == 0 {
                payload[0] = 0x01;
                payload[1] = pump_leds as u8;
            }
            payload[2..2 + data.len()].copy_from_slice(data);
            payload
        })
        .collect()
}

/// Offsets of the three color planes inside a key frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLayout {
    /// Total frame length in bytes
    pub frame_len: usize,
    /// Added to a key's packet index for R, G and B
    pub planes: [usize; 3],
}

impl KeyLayout {
    /// Three contiguous bytes per LED (`+0, +1, +2`)
    pub const fn interleaved(frame_len: usize) -> Self {
        Self {
            frame_len,
            planes: [0, 1, 2],
        }
    }

    /// Colors spread three bytes apart (`+0, +3, +6`)
    pub const fn spread(frame_len: usize) -> Self {
        Self {
            frame_len,
            planes: [0, 3, 6],
        }
    }

    /// One full plane per color, `plane` bytes long
    pub const fn planar(plane: usize) -> Self {
        Self {
            frame_len: plane * 3,
            planes: [0, plane, plane * 2],
        }
    }
}

/// Scatter per-key colors over a frame using each key's packet indexes.
///
/// `colors[i]` is applied to the `i`-th key in layout order; keys beyond
/// `colors` keep their own color. Out-of-range offsets are skipped.
pub fn pack_keys(keyboard: &Keyboard, colors: &[Color], layout: KeyLayout, brightness: f64) -> Vec<u8> {
    let mut frame = vec![0u8; layout.frame_len];
    for (i, key) in keyboard.keys().enumerate() {
        let bytes = colors.get(i).copied().unwrap_or(key.color).to_bytes(brightness);
        for &index in &key.packet_index {
            for (plane, &byte) in layout.planes.iter().zip(&bytes) {
                if let Some(slot) = frame.get_mut(index + plane) {
                    *slot = byte;
                }
            }
        }
    }
    frame
}

/// K70 LUX plane uploads: data packets `[0x7f, idx+1, len, 0x00, data…]`
/// followed by the commit `[0x07, 0x28, plane+1, 0x03, 0x02]`, per plane.
pub fn k70_lux_packets(frame: &[u8], plane_len: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for (plane, bytes) in frame.chunks(plane_len.max(1)).take(3).enumerate() {
        for (idx, _, chunk) in protocol::chunks(bytes, MAX_CHUNK) {
            let mut packet = vec![0x7f, idx as u8 + 1, chunk.len() as u8, 0x00];
            packet.extend_from_slice(chunk);
            out.push(packet);
        }
        out.push(vec![0x07, 0x28, plane as u8 + 1, 0x03, 0x02]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{Key, Row};

    #[test]
    fn test_port_protection_thresholds() {
        assert_eq!(port_protection(48), 1.0);
        assert_eq!(port_protection(49), 0.66);
        assert_eq!(port_protection(97), 0.33);
        assert_eq!(port_protection(161), 0.1);
    }

    #[test]
    fn test_planar_chunk_headers() {
        // 60 LEDs: each plane splits 50 + 10
        let rgb: Vec<u8> = (0..60).flat_map(|i| [i as u8, 100, 200]).collect();
        let chunks = planar_chunks(1, &rgb);
        assert_eq!(chunks.len(), 6);
        assert_eq!(&chunks[0][..4], &[1, 0, 50, 0]);
        assert_eq!(chunks[0][4..].len(), 50);
        assert_eq!(&chunks[1][..4], &[1, 50, 10, 0]);
        assert_eq!(chunks[1][4], 50);
        assert_eq!(&chunks[2][..5], &[1, 0, 50, 1, 100]);
        assert_eq!(&chunks[5][..5], &[1, 50, 10, 2, 200]);
    }

    #[test]
    fn test_elite_bgr_and_header() {
        let chunks = elite_chunks(&[1, 2, 3, 4, 5, 6], 1);
        assert_eq!(chunks.len(), ELITE_CHUNKS);
        assert_eq!(&chunks[0][..8], &[0x01, 1, 3, 2, 1, 6, 5, 4]);
        assert!(chunks[1].iter().all(|&b| b == 0));
        assert!(chunks.iter().all(|c| c.len() <= elite::MAX_PAYLOAD));
    }

    fn two_key_board() -> Keyboard {
        let mut row = Row::default();
        row.keys.insert(
            0,
            Key {
                packet_index: vec![0],
                ..Default::default()
            },
        );
        row.keys.insert(
            1,
            Key {
                packet_index: vec![1, 4],
                color: Color::from_bytes(9, 9, 9),
                ..Default::default()
            },
        );
        let mut kb = Keyboard::default();
        kb.row.insert(0, row);
        kb
    }

    #[test]
    fn test_pack_keys_spread_vs_interleaved() {
        let kb = two_key_board();
        let red = Color::from_bytes(255, 0, 0);
        let green = Color::from_bytes(0, 255, 0);

        let spread = pack_keys(&kb, &[red, green], KeyLayout::spread(12), 1.0);
        assert_eq!(spread[0], 255);
        assert_eq!(spread[3], 0);
        // green of the second index (4 + 3); later offsets overwrite earlier ones
        assert_eq!(spread[7], 255);
        assert_eq!(spread[4], 0);

        let inter = pack_keys(&kb, &[red], KeyLayout::interleaved(12), 1.0);
        assert_eq!(&inter[..3], &[255, 9, 9]);
        assert_eq!(&inter[4..7], &[9, 9, 9]);
    }

    #[test]
    fn test_pack_keys_planar() {
        let kb = two_key_board();
        let frame = pack_keys(&kb, &[Color::from_bytes(1, 2, 3)], KeyLayout::planar(8), 1.0);
        assert_eq!(frame.len(), 24);
        assert_eq!((frame[0], frame[8], frame[16]), (1, 2, 3));
    }

    #[test]
    fn test_k70_lux_packets() {
        let frame = vec![7u8; 3 * 100];
        let packets = k70_lux_packets(&frame, 100);
        // two data packets and a commit per plane
        assert_eq!(packets.len(), 9);
        assert_eq!(&packets[0][..4], &[0x7f, 1, 60, 0]);
        assert_eq!(&packets[1][..4], &[0x7f, 2, 40, 0]);
        assert_eq!(packets[2], vec![0x07, 0x28, 1, 0x03, 0x02]);
        assert_eq!(packets[8], vec![0x07, 0x28, 3, 0x03, 0x02]);
    }
}
