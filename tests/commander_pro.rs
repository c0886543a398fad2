//! Integration tests for the Commander Pro driver.
//!
//! The mock answers the single-byte opcode protocol: two fans and one
//! probe connected, fixed rpm and temperature readings.

use std::sync::Arc;

use linkhub::devices::commander_pro::{cmd, CommanderPro, LED_BASE};
use linkhub::speed::FAN_FLOOR;
use linkhub::{Config, Context, DeviceDriver, Status};
use linkhub_transport::device_registry::{PID_COMMANDER_PRO, VENDOR_ID};
use linkhub_transport::mock::{MockDevice, MockHandle};
use linkhub_transport::{Framing, HidTransport, TransportDeviceInfo};

fn answer(w: &[u8]) -> Vec<u8> {
    let mut resp = vec![0u8; 16];
    match w[1] {
        cmd::GET_FIRMWARE => resp[1..4].copy_from_slice(&[0, 9, 214]),
        cmd::GET_FANS => resp[1..7].copy_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x00, 0x00]),
        cmd::GET_PROBES => resp[1..5].copy_from_slice(&[0x01, 0x00, 0x00, 0x00]),
        // 1200 rpm
        cmd::GET_SPEED => resp[1..3].copy_from_slice(&[0x04, 0xb0]),
        // 31.25 °C
        cmd::GET_TEMP => resp[1..3].copy_from_slice(&[0x0c, 0x35]),
        _ => {}
    }
    resp
}

fn open(dir: &tempfile::TempDir) -> (Arc<CommanderPro>, MockHandle) {
    let (dev, handle) = MockDevice::new(|w| Some(answer(w)));
    let info = TransportDeviceInfo {
        vid: VENDOR_ID,
        pid: PID_COMMANDER_PRO,
        ..Default::default()
    };
    let transport = HidTransport::new(
        Box::new(dev.with_strings("Commander PRO", "CP0001")),
        info,
        Framing::CommanderPro,
    );
    let ctx = Arc::new(Context::new(Config::with_path(dir.path())).unwrap());
    (CommanderPro::open(transport, ctx).unwrap(), handle)
}

fn writes_for(handle: &MockHandle, op: u8) -> Vec<Vec<u8>> {
    handle.writes_with_prefix(&[0x00, op])
}

// ── Cold start ──

#[test]
fn cold_start_enumerates_connected_fans() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, _handle) = open(&dir);

    let channels = cp.channels();
    let fans: Vec<_> = channels.iter().filter(|c| c.has_speed).collect();
    assert_eq!(fans.len(), 2);
    assert_eq!(fans[0].name, "Fan 1");
    assert_eq!(fans[1].name, "Fan 2");
    for fan in fans {
        assert_eq!(fan.description, "Fan");
        assert_eq!(fan.profile, "Normal");
        assert_eq!(fan.label, "Not Set");
    }
    let probes: Vec<_> = channels.iter().filter(|c| c.has_temp).collect();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].name, "Probe 1");
    assert_eq!(cp.status().firmware, "0.9.214");
    cp.stop();
}

#[test]
fn bootstrap_puts_fans_in_pwm_and_ports_in_software() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, handle) = open(&dir);

    assert_eq!(writes_for(&handle, cmd::FAN_MODE).len(), 2);
    let ports: Vec<_> = writes_for(&handle, cmd::PORT_STATE)
        .iter()
        .map(|w| (w[2], w[3]))
        .collect();
    assert_eq!(ports, vec![(0, 0x02), (1, 0x02)]);
    cp.stop();
}

#[test]
fn refresh_reads_rpm_and_probe_temperature() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, _handle) = open(&dir);
    cp.refresh();

    let channels = cp.channels();
    assert_eq!(channels[0].rpm, 1200);
    let probe = channels.iter().find(|c| c.has_temp).unwrap();
    assert!((probe.temperature - 31.25).abs() < 1e-9);
    cp.stop();
}

// ── Speed ──

#[test]
fn manual_speed_overrides_and_clamps() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, handle) = open(&dir);

    assert_eq!(cp.update_device_speed(1, 3), Status::Ok);
    let last = writes_for(&handle, cmd::SET_SPEED).pop().unwrap();
    assert_eq!(&last[2..4], &[1, FAN_FLOOR]);
    assert_eq!(cp.core().manual_speed(1), Some(FAN_FLOOR));

    // Setting a profile drops the override
    assert_eq!(cp.set_speed_profile(1, "Quiet"), Status::Ok);
    assert_eq!(cp.core().manual_speed(1), None);

    assert_eq!(cp.update_device_speed(5, 50), Status::Rejected);
    assert_eq!(cp.set_speed_profile(1, "NoSuchProfile"), Status::Rejected);
    cp.stop();
}

// ── External hubs ──

#[test]
fn external_hub_builds_led_channel() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, handle) = open(&dir);
    assert!(cp.channels().iter().all(|c| c.led_channels == 0));

    // Three LL fans on port 0: 48 LEDs
    assert_eq!(cp.update_external_hub(0, 3, 3), Status::Ok);
    let led = cp
        .channels()
        .into_iter()
        .find(|c| c.id == LED_BASE)
        .unwrap();
    assert_eq!(led.led_channels, 48);
    assert_eq!(led.description, "LL RGB Fan");
    assert!(!writes_for(&handle, cmd::WRITE_COLOR).is_empty());

    assert_eq!(cp.update_external_hub(2, 3, 1), Status::Rejected);
    assert_eq!(cp.update_external_hub(0, 99, 1), Status::Rejected);
    assert_eq!(cp.update_external_hub(0, 3, 7), Status::Rejected);
    cp.stop();
}

#[test]
fn labels_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, _handle) = open(&dir);
    assert_eq!(cp.set_label(0, "  Front intake "), Status::Ok);
    assert_eq!(cp.set_label(42, "nothing"), Status::Rejected);
    cp.stop();

    let (cp, _handle) = open(&dir);
    assert_eq!(cp.channels()[0].label, "Front intake");
    cp.stop();
}

// ── Shutdown ──

#[test]
fn stop_returns_ports_to_hardware_once() {
    let dir = tempfile::tempdir().unwrap();
    let (cp, handle) = open(&dir);
    handle.clear();

    cp.stop();
    cp.stop();
    let ports: Vec<_> = writes_for(&handle, cmd::PORT_STATE)
        .iter()
        .map(|w| (w[2], w[3]))
        .collect();
    assert_eq!(ports, vec![(0, 0x01), (1, 0x01)]);
    assert!(cp.core().live_workers().is_empty());
}
