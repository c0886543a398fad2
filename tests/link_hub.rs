//! Integration tests for the iCUE LINK System Hub driver.
//!
//! A scripted hub answers the handle protocol (open, read or write, close)
//! with a QX fan on channel 1 and an H150i on channel 2. The tests drive
//! the public driver API and inspect the wire traffic.

use std::sync::Arc;

use linkhub::devices::link::{data_type, ep, mode, LinkHub, SPEED_RETRIES};
use linkhub::speed::{DEFAULT_DUTY, FAN_FLOOR, PUMP_FLOOR};
use linkhub::{Config, Context, DeviceDriver, Status};
use linkhub_transport::device_registry::{PID_LINK_HUB, VENDOR_ID};
use linkhub_transport::mock::{MockDevice, MockHandle};
use linkhub_transport::{Framing, HidTransport, TransportDeviceInfo};
use parking_lot::Mutex;

const SERIAL: &str = "LSH0001";

#[derive(Default)]
struct Hub {
    mode: u8,
    /// Set-speed writes still to refuse
    refusals: usize,
    /// Liquid temperature in tenths of a degree
    liquid: i16,
}

fn response(kind: [u8; 2], status: u8, data: &[u8]) -> Vec<u8> {
    let mut resp = vec![0u8; 512];
    resp[3] = status;
    resp[4..6].copy_from_slice(&kind);
    resp[6..6 + data.len()].copy_from_slice(data);
    resp
}

fn entry(device_id: u8, model: u8, id: &[u8]) -> Vec<u8> {
    let mut e = vec![0, 0, device_id, model, 0, 0, 0, id.len() as u8];
    e.extend_from_slice(id);
    e
}

fn answer(hub: &mut Hub, w: &[u8]) -> Vec<u8> {
    let endpoint = &w[3..];
    if endpoint.starts_with(ep::OPEN) {
        hub.mode = endpoint[2];
        return response([0, 0], 0, &[]);
    }
    if endpoint.starts_with(ep::FIRMWARE) {
        let mut resp = response([0, 0], 0, &[]);
        resp[4..8].copy_from_slice(&[2, 7, 0x2c, 0x01]);
        return resp;
    }
    if endpoint.starts_with(ep::READ) {
        return match hub.mode {
            mode::LIST_DEVICES => {
                let mut data = vec![2];
                data.extend(entry(1, 0, b"QX01"));
                data.extend(entry(7, 0, b"H150"));
                response(data_type::DEVICES, 0, &data)
            }
            mode::TEMPERATURES => {
                let [lo, hi] = hub.liquid.to_le_bytes();
                response(data_type::TEMPERATURES, 0, &[2, 0x01, 0, 0, 0x00, lo, hi])
            }
            mode::SPEEDS => response(data_type::SPEEDS, 0, &[2, 0x00, 0xb0, 0x04, 0x00, 0x40, 0x0b]),
            _ => response([0, 0], 0, &[]),
        };
    }
    if endpoint.starts_with(ep::WRITE) && hub.mode == mode::SET_SPEED {
        if hub.refusals > 0 {
            hub.refusals -= 1;
            return response([0, 0], 0x01, &[]);
        }
        return response([0, 0], 0, &[]);
    }
    response([0, 0], 0, &[])
}

fn open_hub(dir: &tempfile::TempDir, hub: Hub) -> (Arc<LinkHub>, MockHandle, Arc<Mutex<Hub>>) {
    let state = Arc::new(Mutex::new(hub));
    let shared = Arc::clone(&state);
    let (dev, handle) = MockDevice::new(move |w| Some(answer(&mut shared.lock(), w)));
    let info = TransportDeviceInfo {
        vid: VENDOR_ID,
        pid: PID_LINK_HUB,
        ..Default::default()
    };
    let transport = HidTransport::new(
        Box::new(dev.with_strings("iCUE LINK System Hub", SERIAL)),
        info,
        Framing::Link,
    );
    let ctx = Arc::new(Context::new(Config::with_path(dir.path())).unwrap());
    let driver = LinkHub::open(transport, ctx, None).unwrap();
    (driver, handle, state)
}

/// Set-speed frames written so far, as `[count, (ch, 0, duty, 0)…]`.
fn speed_frames(handle: &MockHandle) -> Vec<Vec<u8>> {
    handle
        .writes()
        .into_iter()
        .filter(|w| w[3..].starts_with(ep::WRITE) && w[9..11] == data_type::SET_SPEED)
        .map(|w| {
            let count = usize::from(w[11]);
            w[11..12 + count * 4].to_vec()
        })
        .collect()
}

// ── Enumeration ──

#[test]
fn device_list_yields_qx_fan_and_aio() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _handle, _state) = open_hub(&dir, Hub::default());

    let channels = hub.channels();
    assert_eq!(channels.len(), 2);
    let fan = &channels[0];
    assert_eq!(fan.id, 1);
    assert_eq!(fan.name, "QX Fan");
    assert_eq!(fan.led_channels, 34);
    assert_eq!(fan.device_id, "QX01");
    assert!(fan.has_speed);
    assert!(!fan.contains_pump);
    let aio = &channels[1];
    assert_eq!(aio.id, 2);
    assert!(aio.contains_pump && aio.is_aio && aio.has_temp);

    let status = hub.status();
    assert_eq!(status.serial, SERIAL);
    assert_eq!(status.firmware, "2.7.300");
    hub.stop();
}

#[test]
fn bootstrap_writes_default_speeds() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, _state) = open_hub(&dir, Hub::default());

    let first = speed_frames(&handle).into_iter().next().unwrap();
    let pump = DEFAULT_DUTY.max(PUMP_FLOOR);
    assert_eq!(first, vec![2, 1, 0, DEFAULT_DUTY, 0, 2, 0, pump, 0]);
    hub.stop();
}

// ── Speed ──

#[test]
fn refused_speed_write_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, state) = open_hub(
        &dir,
        Hub {
            refusals: 3,
            ..Default::default()
        },
    );
    assert_eq!(state.lock().refusals, 0);
    assert!(speed_frames(&handle).len() >= 4);
    hub.stop();
}

#[test]
fn speed_write_refused_until_exhaustion_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, state) = open_hub(&dir, Hub::default());

    state.lock().refusals = usize::MAX;
    handle.clear();
    assert_eq!(hub.update_device_speed(1, 50), Status::Failure);
    let attempts = speed_frames(&handle)
        .into_iter()
        .filter(|f| *f == [1u8, 1, 0, 50, 0])
        .count();
    assert_eq!(attempts, SPEED_RETRIES);
    hub.stop();
}

#[test]
fn refused_duty_is_sent_again_on_the_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, state) = open_hub(&dir, Hub::default());

    state.lock().refusals = usize::MAX;
    hub.reset_speed();
    hub.update_speed();

    state.lock().refusals = 0;
    handle.clear();
    hub.update_speed();
    let frames = speed_frames(&handle);
    assert!(!frames.is_empty(), "duty was not retried after the refusal");
    hub.stop();
}

#[test]
fn manual_speed_is_clamped_to_floor() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, _state) = open_hub(&dir, Hub::default());

    assert_eq!(hub.update_device_speed(1, 5), Status::Ok);
    let last = speed_frames(&handle).pop().unwrap();
    assert_eq!(last, vec![1, 1, 0, FAN_FLOOR, 0]);

    assert_eq!(hub.update_device_speed(2, 10), Status::Ok);
    let last = speed_frames(&handle).pop().unwrap();
    assert_eq!(last, vec![1, 2, 0, PUMP_FLOOR, 0]);

    assert_eq!(hub.update_device_speed(9, 50), Status::Rejected);
    hub.stop();
}

#[test]
fn critical_liquid_enters_and_clears_with_hysteresis() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _handle, state) = open_hub(
        &dir,
        Hub {
            liquid: 300,
            ..Default::default()
        },
    );
    hub.refresh();
    hub.update_speed();
    assert!(!hub.is_critical());

    state.lock().liquid = 580;
    hub.refresh();
    hub.update_speed();
    assert_eq!(hub.liquid(), Some(58.0));
    assert!(hub.is_critical());

    // Between the thresholds the override holds
    state.lock().liquid = 540;
    hub.refresh();
    hub.update_speed();
    assert!(hub.is_critical());

    state.lock().liquid = 510;
    hub.refresh();
    hub.update_speed();
    assert!(!hub.is_critical());
    hub.stop();
}

// ── Color ──

#[test]
fn colors_are_written_as_planar_chunks_per_channel() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, _state) = open_hub(&dir, Hub::default());

    // QX fan (34 LEDs) then H150i (20 LEDs)
    let frame = [10u8, 20, 30].repeat(54);
    handle.clear();
    assert!(hub.write_colors(&frame));

    let chunks: Vec<Vec<u8>> = handle
        .writes()
        .into_iter()
        .filter(|w| w[3..].starts_with(ep::WRITE_COLOR))
        .map(|w| w[5..].to_vec())
        .collect();
    assert_eq!(chunks.len(), 6);
    for (i, (port, leds)) in [(1u8, 34u8), (2, 20)].into_iter().enumerate() {
        for plane in 0..3u8 {
            let chunk = &chunks[i * 3 + usize::from(plane)];
            assert_eq!(&chunk[..4], &[port, 0, leds, plane]);
            let value = 10 * (plane + 1);
            assert!(chunk[4..4 + usize::from(leds)].iter().all(|&b| b == value));
        }
    }
    let commits = handle
        .writes()
        .iter()
        .filter(|w| w[3..].starts_with(ep::COMMIT_COLOR))
        .count();
    assert_eq!(commits, 1);
    hub.stop();
}

// ── Commands ──

#[test]
fn lcd_mode_needs_an_lcd() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _handle, _state) = open_hub(&dir, Hub::default());
    assert_eq!(hub.change_lcd_mode(1), Status::Rejected);
    hub.stop();
}

#[test]
fn unknown_rgb_profile_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _handle, _state) = open_hub(&dir, Hub::default());
    assert_eq!(hub.set_rgb_profile(1, "no-such-profile"), Status::Rejected);
    assert_eq!(hub.set_rgb_profile(1, "rainbow"), Status::Ok);
    assert_eq!(hub.channels()[0].rgb, "rainbow");
    hub.stop();
}

// ── Shutdown ──

#[test]
fn stop_is_idempotent_and_restores_hardware_mode() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, handle, _state) = open_hub(&dir, Hub::default());

    hub.stop();
    hub.stop();
    let restores = handle
        .writes()
        .iter()
        .filter(|w| w[3..].starts_with(ep::HARDWARE_MODE))
        .count();
    assert_eq!(restores, 1);
    assert!(hub.core().live_workers().is_empty());

    let before = handle.writes().len();
    hub.stop_dirty();
    assert_eq!(handle.writes().len(), before);
}
