//! Command set shared by the modern keyboards, zone accessories and the
//! Slipstream receiver
//!
//! Every write is `[0x00, route, endpoint…, payload…]`. A wired device
//! uses the route its transport was opened with; devices behind a
//! receiver use their own route byte.

use linkhub_transport::protocol::MAX_CHUNK;
use linkhub_transport::{HidTransport, TransportError};

/// Endpoint opcodes
pub mod op {
    pub const SOFTWARE_MODE: &[u8] = &[0x01, 0x03, 0x00, 0x02];
    pub const HARDWARE_MODE: &[u8] = &[0x01, 0x03, 0x00, 0x01];
    /// Hardware brightness, 0-1000 as u16 LE
    pub const BRIGHTNESS: &[u8] = &[0x01, 0x02, 0x00];
    /// Inactivity before sleep, milliseconds as u32 LE
    pub const SLEEP_TIMER: &[u8] = &[0x01, 0x0e, 0x00];
    /// Active DPI as u16 LE
    pub const DPI: &[u8] = &[0x01, 0x21, 0x00];
    pub const FIRMWARE: &[u8] = &[0x02, 0x13];
    pub const INACTIVITY: &[u8] = &[0x02, 0x40];
    pub const LIST_PAIRED: &[u8] = &[0x02, 0x36];
    pub const OPEN_COLOR: &[u8] = &[0x0d, 0x00, 0x01];
    pub const CLOSE_COLOR: &[u8] = &[0x05, 0x01, 0x00];
    pub const WRITE_COLOR: &[u8] = &[0x06, 0x00];
    pub const WRITE_COLOR_MORE: &[u8] = &[0x07, 0x00];
    pub const HEARTBEAT: &[u8] = &[0x12];
}

/// Firmware `major.minor.build` from a `02 13` response.
pub fn firmware_from(resp: &[u8]) -> Option<String> {
    if resp.len() < 8 {
        return None;
    }
    let build = u16::from_le_bytes([resp[6], resp[7]]);
    Some(format!("{}.{}.{}", resp[4], resp[5], build))
}

/// Color stream split into write-color packets: the first goes to
/// [`op::WRITE_COLOR`] with a `[len_lo, len_hi, 0, 0]` header, the rest
/// to [`op::WRITE_COLOR_MORE`].
pub fn color_packets(data: &[u8]) -> Vec<(&'static [u8], Vec<u8>)> {
    let len = data.len() as u16;
    let mut stream = Vec::with_capacity(data.len() + 4);
    stream.extend_from_slice(&len.to_le_bytes());
    stream.extend_from_slice(&[0x00, 0x00]);
    stream.extend_from_slice(data);
    stream
        .chunks(MAX_CHUNK)
        .enumerate()
        .map(|(i, chunk)| {
            let endpoint = if i == 0 { op::WRITE_COLOR } else { op::WRITE_COLOR_MORE };
            (endpoint, chunk.to_vec())
        })
        .collect()
}

/// Request helper bound to one route.
pub struct Commands<'a> {
    transport: &'a HidTransport,
    route: Option<u8>,
}

impl<'a> Commands<'a> {
    /// Commands on the transport's own framing.
    pub fn wired(transport: &'a HidTransport) -> Self {
        Self {
            transport,
            route: None,
        }
    }

    /// Commands addressed to a device behind a receiver.
    pub fn routed(transport: &'a HidTransport, route: u8) -> Self {
        Self {
            transport,
            route: Some(route),
        }
    }

    pub fn send(&self, endpoint: &[u8], payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self.route {
            Some(route) => self.transport.transfer_routed(route, endpoint, payload),
            None => self.transport.transfer(endpoint, payload),
        }
    }

    pub fn software_mode(&self) -> Result<(), TransportError> {
        self.send(op::SOFTWARE_MODE, &[]).map(|_| ())
    }

    pub fn hardware_mode(&self) -> Result<(), TransportError> {
        self.send(op::HARDWARE_MODE, &[]).map(|_| ())
    }

    pub fn firmware(&self) -> Result<String, TransportError> {
        let resp = self.send(op::FIRMWARE, &[])?;
        Ok(firmware_from(&resp).unwrap_or_else(|| "0.0.0".to_string()))
    }

    pub fn keep_alive(&self) -> Result<(), TransportError> {
        self.send(op::HEARTBEAT, &[]).map(|_| ())
    }

    pub fn open_color(&self) -> Result<(), TransportError> {
        self.send(op::OPEN_COLOR, &[]).map(|_| ())
    }

    pub fn close_color(&self) -> Result<(), TransportError> {
        self.send(op::CLOSE_COLOR, &[]).map(|_| ())
    }

    pub fn write_color(&self, data: &[u8]) -> Result<(), TransportError> {
        for (endpoint, payload) in color_packets(data) {
            self.send(endpoint, &payload)?;
        }
        Ok(())
    }

    /// Hardware brightness, `level` 0-1000.
    pub fn set_brightness(&self, level: u16) -> Result<(), TransportError> {
        self.send(op::BRIGHTNESS, &level.min(1000).to_le_bytes())
            .map(|_| ())
    }

    pub fn set_sleep_timer(&self, minutes: u32) -> Result<(), TransportError> {
        let ms = minutes.saturating_mul(60_000);
        self.send(op::SLEEP_TIMER, &ms.to_le_bytes()).map(|_| ())
    }

    pub fn set_dpi(&self, dpi: u16) -> Result<(), TransportError> {
        self.send(op::DPI, &dpi.to_le_bytes()).map(|_| ())
    }
}

/// Event decoded from an unsolicited control report.
///
/// Reports are `[source, event, value…]`; `source` is 1 or 2 for mice and
/// 3 for keyboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Dial or wheel turned, `true` clockwise
    Dial(bool),
    DialPress,
    BrightnessKey,
    /// DPI button, `true` steps up
    Dpi(bool),
    /// Key matrix report; key bytes follow the event byte
    Keys,
}

pub mod source {
    pub const MOUSE: u8 = 1;
    pub const MOUSE_ALT: u8 = 2;
    pub const KEYBOARD: u8 = 3;
}

const EVENT_DIAL: u8 = 0x01;
const EVENT_DIAL_PRESS: u8 = 0x02;
const EVENT_BRIGHTNESS: u8 = 0x03;
const EVENT_DPI: u8 = 0x04;
const EVENT_KEYS: u8 = 0x05;

pub fn decode_control(report: &[u8]) -> Option<ControlEvent> {
    let event = *report.get(1)?;
    let value = report.get(2).copied().unwrap_or(0);
    match event {
        EVENT_DIAL if value != 0 => Some(ControlEvent::Dial(value == 0x01)),
        EVENT_DIAL_PRESS => Some(ControlEvent::DialPress),
        EVENT_BRIGHTNESS => Some(ControlEvent::BrightnessKey),
        EVENT_DPI if value != 0 => Some(ControlEvent::Dpi(value == 0x01)),
        EVENT_KEYS => Some(ControlEvent::Keys),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_parse() {
        let resp = [0x00, 0x02, 0x13, 0x00, 2, 7, 0x2c, 0x01];
        assert_eq!(firmware_from(&resp).as_deref(), Some("2.7.300"));
        assert_eq!(firmware_from(&[0x00; 4]), None);
    }

    #[test]
    fn test_color_packets_split() {
        let data = vec![7u8; 100];
        let packets = color_packets(&data);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].0, op::WRITE_COLOR);
        assert_eq!(&packets[0].1[..4], &[100, 0, 0, 0]);
        assert_eq!(packets[0].1.len(), MAX_CHUNK);
        assert_eq!(packets[1].0, op::WRITE_COLOR_MORE);
        assert_eq!(packets[1].1.len(), 104 - MAX_CHUNK);
    }

    #[test]
    fn test_decode_control() {
        assert_eq!(decode_control(&[3, 0x01, 0x01]), Some(ControlEvent::Dial(true)));
        assert_eq!(decode_control(&[3, 0x01, 0xff]), Some(ControlEvent::Dial(false)));
        assert_eq!(decode_control(&[3, 0x01, 0x00]), None);
        assert_eq!(decode_control(&[1, 0x04, 0x01]), Some(ControlEvent::Dpi(true)));
        assert_eq!(decode_control(&[3]), None);
    }
}
