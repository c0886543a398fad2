//! Protocol constants and packet framing
//!
//! Every family writes `BUFFER_SIZE + 1` byte output reports whose first
//! byte is the HID report id. What follows the report id differs:
//!
//! | Family | Layout |
//! |---|---|
//! | Commander Pro | `[0x00, endpoint, payload…]`, 16 byte reads |
//! | iCUE LINK | `[0x00, 0x00, 0x01, endpoint…, payload…]` |
//! | Modern (MK2, Core TKL, ST100, MM700, Slipstream) | `[0x00, route, endpoint…, payload…]` |
//! | Elite | `[0x00, 0x3F, seq\|cmd, payload…, crc]` |
//! | K70 LUX | same as modern but sent as feature reports |

use crate::crc::crc8;
use crate::error::TransportError;

/// Payload bytes in a standard report (excluding report id)
pub const BUFFER_SIZE: usize = 64;
/// Output report size (report id + payload)
pub const REPORT_SIZE: usize = BUFFER_SIZE + 1;
/// iCUE LINK hubs use larger reports
pub const LINK_BUFFER_SIZE: usize = 512;
/// iCUE LINK output report size
pub const LINK_REPORT_SIZE: usize = LINK_BUFFER_SIZE + 1;
/// Commander Pro responses are 16 bytes
pub const COMMANDER_PRO_READ_SIZE: usize = 16;
/// Largest payload a single color chunk carries
pub const MAX_CHUNK: usize = 60;

/// HID communication timing constants
pub mod timing {
    /// Default read timeout for request/response pairs (ms)
    pub const READ_TIMEOUT_MS: i32 = 500;
    /// Budget for correlated continuation reads (ms)
    pub const CONTINUATION_TIMEOUT_MS: u64 = 500;
    /// Listener read timeout (ms)
    pub const LISTENER_TIMEOUT_MS: i32 = 100;
    /// Drain read timeout, effectively non-blocking (ms)
    pub const DRAIN_TIMEOUT_MS: i32 = 0;
    /// Upper bound of stale reports discarded per drain
    pub const DRAIN_LIMIT: usize = 32;
}

/// Elite packet constants
pub mod elite {
    /// Marker byte following the report id
    pub const BUFFER_LENGTH: u8 = 0x3F;
    /// Packet size after the report id
    pub const PACKET_SIZE: usize = 64;
    /// Sequence lives in the upper 5 bits
    pub const SEQUENCE_STEP: u8 = 0x08;
    /// Mask of the command bits sharing the sequence byte
    pub const COMMAND_MASK: u8 = 0x07;
    /// Largest payload between the sequence byte and the CRC
    pub const MAX_PAYLOAD: usize = PACKET_SIZE - 3;
}

/// Header layout of an iCUE LINK write
pub mod link {
    /// Bytes before the endpoint: report id, 0x00, 0x01
    pub const HEADER_SIZE: usize = 3;
    /// Offset of the status byte in a response
    pub const STATUS_OFFSET: usize = 3;
    /// Offset of the two data-type bytes in a response
    pub const DATA_TYPE_OFFSET: usize = 4;
    /// Offset where response data begins
    pub const DATA_OFFSET: usize = 6;
}

/// Wire framing used by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `[0x00, endpoint, payload…]`
    CommanderPro,
    /// `[0x00, 0x00, 0x01, endpoint…, payload…]`
    Link,
    /// `[0x00, route, endpoint…, payload…]`
    Command { route: u8 },
    /// CRC framed packets with a rolling sequence
    Elite,
    /// `[0x00, endpoint…, payload…]` exchanged through feature reports
    Feature,
}

impl Framing {
    /// Output report size for this framing
    pub fn write_size(&self) -> usize {
        match self {
            Framing::Link => LINK_REPORT_SIZE,
            _ => REPORT_SIZE,
        }
    }

    /// Input report size for this framing
    pub fn read_size(&self) -> usize {
        match self {
            Framing::CommanderPro => COMMANDER_PRO_READ_SIZE,
            Framing::Link => LINK_BUFFER_SIZE,
            _ => BUFFER_SIZE,
        }
    }
}

fn copy_into(buf: &mut [u8], offset: usize, data: &[u8]) -> usize {
    let room = buf.len().saturating_sub(offset);
    let len = data.len().min(room);
    buf[offset..offset + len].copy_from_slice(&data[..len]);
    offset + len
}

/// Build an output report for every framing except [`Framing::Elite`].
///
/// Payload bytes that do not fit into the report are truncated; callers
/// chunk large payloads before framing.
pub fn build_report(framing: Framing, endpoint: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; framing.write_size()];
    let offset = match framing {
        Framing::CommanderPro | Framing::Feature => 1,
        Framing::Link => {
            buf[2] = 0x01;
            link::HEADER_SIZE
        }
        Framing::Command { route } => {
            buf[1] = route;
            2
        }
        Framing::Elite => {
            // Elite packets carry a sequence; use build_elite_packet
            buf[1] = elite::BUFFER_LENGTH;
            2
        }
    };
    let offset = copy_into(&mut buf, offset, endpoint);
    copy_into(&mut buf, offset, payload);
    buf
}

/// Build an Elite packet: `[0x00, 0x3F, seq|cmd, payload…, crc]`.
///
/// The CRC covers everything between the length marker and the CRC byte.
pub fn build_elite_packet(sequence: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; REPORT_SIZE];
    buf[1] = elite::BUFFER_LENGTH;
    buf[2] = (sequence & !elite::COMMAND_MASK) | (command & elite::COMMAND_MASK);
    let len = payload.len().min(elite::MAX_PAYLOAD);
    buf[3..3 + len].copy_from_slice(&payload[..len]);
    buf[REPORT_SIZE - 1] = crc8(&buf[2..REPORT_SIZE - 1]);
    buf
}

/// Check the CRC of an Elite response (read without report id).
pub fn verify_elite_response(resp: &[u8]) -> Result<(), TransportError> {
    if resp.len() < elite::PACKET_SIZE {
        return Err(TransportError::ShortResponse {
            expected: elite::PACKET_SIZE,
            actual: resp.len(),
        });
    }
    let expected = crc8(&resp[1..elite::PACKET_SIZE - 1]);
    let actual = resp[elite::PACKET_SIZE - 1];
    if expected != actual {
        return Err(TransportError::CrcMismatch { expected, actual });
    }
    Ok(())
}

/// Advance an Elite sequence by one step, skipping zero.
pub fn next_sequence(current: u8) -> u8 {
    let next = (current & !elite::COMMAND_MASK).wrapping_add(elite::SEQUENCE_STEP);
    if next == 0 {
        elite::SEQUENCE_STEP
    } else {
        next
    }
}

/// Split `data` into ordered chunks of at most `max` bytes, yielding
/// `(index, offset, chunk)`.
pub fn chunks(data: &[u8], max: usize) -> impl Iterator<Item = (usize, usize, &[u8])> {
    let max = max.max(1);
    data.chunks(max)
        .enumerate()
        .map(move |(i, c)| (i, i * max, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commander_pro_layout() {
        let buf = build_report(Framing::CommanderPro, &[0x23], &[0x01, 70]);
        assert_eq!(buf.len(), REPORT_SIZE);
        assert_eq!(&buf[..4], &[0x00, 0x23, 0x01, 70]);
    }

    #[test]
    fn test_link_layout() {
        let buf = build_report(Framing::Link, &[0x0d, 0x01], &[0x36]);
        assert_eq!(buf.len(), LINK_REPORT_SIZE);
        assert_eq!(&buf[..6], &[0x00, 0x00, 0x01, 0x0d, 0x01, 0x36]);
    }

    #[test]
    fn test_command_layout() {
        let buf = build_report(Framing::Command { route: 0x09 }, &[0x12], &[]);
        assert_eq!(&buf[..3], &[0x00, 0x09, 0x12]);
    }

    #[test]
    fn test_elite_packet_crc() {
        let buf = build_elite_packet(0x08, 0x00, &[0xff]);
        assert_eq!(buf[1], 0x3F);
        assert_eq!(buf[2], 0x08);
        assert_eq!(buf[3], 0xff);
        assert_eq!(buf[64], crc8(&buf[2..64]));
        // The response check uses the same span once the report id is gone
        assert!(verify_elite_response(&buf[1..]).is_ok());
    }

    #[test]
    fn test_elite_crc_mismatch_reported() {
        let mut buf = build_elite_packet(0x10, 0x00, &[1, 2, 3]);
        buf[10] ^= 0xff;
        match verify_elite_response(&buf[1..]) {
            Err(TransportError::CrcMismatch { .. }) => {}
            other => panic!("expected CRC mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_sequence_skips_zero() {
        assert_eq!(next_sequence(0x08), 0x10);
        assert_eq!(next_sequence(0xF8), 0x08);
        assert_eq!(next_sequence(0x0C), 0x10);
        let mut seq = 0x08;
        for _ in 0..64 {
            seq = next_sequence(seq);
            assert_ne!(seq, 0);
            assert_eq!(seq % 8, 0);
        }
    }

    #[test]
    fn test_chunks_offsets() {
        let data: Vec<u8> = (0..130).collect();
        let parts: Vec<_> = chunks(&data, 60).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].1, 60);
        assert_eq!(parts[2].2.len(), 10);
    }
}
