//! Integration tests for the Elite AIO driver.
//!
//! The mock echoes each packet back with a valid CRC, which is enough for
//! the sequence, status and speed paths.

use std::sync::Arc;

use linkhub::devices::elite::{cmd, speed_frame, Elite, SPEED_FRAME_LEN};
use linkhub::speed::{pump_mode, FAN_FLOOR};
use linkhub::{Config, Context, DeviceDriver, Status};
use linkhub_transport::crc::crc8;
use linkhub_transport::device_registry::VENDOR_ID;
use linkhub_transport::mock::{MockDevice, MockHandle};
use linkhub_transport::{Framing, HidTransport, TransportDeviceInfo};

const H150I: u16 = 0x0c37;
const SPEED_HEADER: [u8; 4] = [0x14, 0x00, 0xff, 0x05];

fn elite_echo(w: &[u8]) -> Option<Vec<u8>> {
    let mut resp = w[1..].to_vec();
    resp[63] = crc8(&resp[1..63]);
    Some(resp)
}

fn open(dir: &tempfile::TempDir) -> (Arc<Elite>, MockHandle) {
    let (dev, handle) = MockDevice::new(elite_echo);
    let info = TransportDeviceInfo {
        vid: VENDOR_ID,
        pid: H150I,
        ..Default::default()
    };
    let transport = HidTransport::new(
        Box::new(dev.with_strings("H150i ELITE", "EL0001")),
        info,
        Framing::Elite,
    );
    let ctx = Arc::new(Context::new(Config::with_path(dir.path())).unwrap());
    (Elite::open(transport, ctx).unwrap(), handle)
}

/// Speed frames on the wire, without report id, marker and sequence byte.
fn speed_frames(handle: &MockHandle) -> Vec<Vec<u8>> {
    handle
        .writes()
        .into_iter()
        .filter(|w| w[3..7] == SPEED_HEADER)
        .map(|w| w[3..3 + SPEED_FRAME_LEN].to_vec())
        .collect()
}

// ── Frame layout ──

#[test]
fn speed_frame_carries_pump_mode_and_fan_duties() {
    let frame = speed_frame(pump_mode::NORMAL, &[70, 70, 70]);
    assert_eq!(frame.len(), 51);
    assert_eq!(&frame[..4], &SPEED_HEADER);
    assert_eq!(frame[21], pump_mode::NORMAL);
    // 70% of 255
    for i in 0..3 {
        assert_eq!(frame[29 + i * 5], 0x02);
        assert_eq!(frame[29 + i * 5 + 4], 178);
    }
}

// ── Driver ──

#[test]
fn h150i_has_pump_and_three_fans() {
    let dir = tempfile::tempdir().unwrap();
    let (elite, handle) = open(&dir);

    let channels = elite.channels();
    assert_eq!(channels.len(), 4);
    assert!(channels[0].contains_pump && channels[0].is_aio);
    assert_eq!(channels[3].name, "Fan 3");
    assert!(!speed_frames(&handle).is_empty());
    elite.stop();
}

#[test]
fn manual_speed_updates_the_combined_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (elite, handle) = open(&dir);

    assert_eq!(elite.update_device_speed(1, 5), Status::Ok);
    let frame = speed_frames(&handle).pop().unwrap();
    let floor_raw = (u16::from(FAN_FLOOR) * 255 / 100) as u8;
    assert_eq!(frame[29 + 4], floor_raw);
    assert_eq!(floor_raw, 51);

    assert_eq!(elite.update_device_speed(0, 90), Status::Ok);
    let frame = speed_frames(&handle).pop().unwrap();
    assert_eq!(frame[21], pump_mode::PERFORMANCE);

    assert_eq!(elite.update_device_speed(4, 50), Status::Rejected);
    assert_eq!(elite.update_device_speed(-1, 50), Status::Rejected);
    elite.stop();
}

#[test]
fn every_packet_is_crc_sealed() {
    let dir = tempfile::tempdir().unwrap();
    let (elite, handle) = open(&dir);
    elite.stop();
    for w in handle.writes() {
        assert_eq!(w[1], 0x3f);
        assert_eq!(w[64], crc8(&w[2..64]));
    }
}

// ── Shutdown ──

#[test]
fn stop_runs_shutdown_script_once() {
    let dir = tempfile::tempdir().unwrap();
    let (elite, handle) = open(&dir);
    handle.clear();

    elite.stop();
    elite.stop();
    let steps: Vec<u8> = handle
        .writes()
        .iter()
        .map(|w| w[2] & 0x07)
        .filter(|&c| (cmd::SHUTDOWN..=cmd::SHUTDOWN_COLOR).contains(&c))
        .collect();
    assert_eq!(steps, vec![1, 1, 2, 3]);
    assert!(elite.core().live_workers().is_empty());
}
