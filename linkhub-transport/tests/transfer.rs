//! Integration tests for the serialised transport.
//!
//! These drive [`HidTransport`] against the in-memory mock device and check
//! the wire traffic: framing per family, request/response pairing under
//! concurrency, Elite sequencing and CRC accounting.

use std::sync::Arc;

use linkhub_transport::crc::crc8;
use linkhub_transport::mock::{MockDevice, MockEvent};
use linkhub_transport::{Framing, HidTransport, TransportDeviceInfo, TransportError};

fn transport(framing: Framing, dev: MockDevice) -> HidTransport {
    HidTransport::new(Box::new(dev), TransportDeviceInfo::default(), framing)
}

// ── Serialisation ──

#[test]
fn concurrent_transfers_never_interleave() {
    // Echo the endpoint byte so each response names its request
    let (dev, handle) = MockDevice::new(|w| Some(vec![w[1]; 16]));
    let t = Arc::new(transport(Framing::CommanderPro, dev));

    let threads: Vec<_> = (0..8u8)
        .map(|n| {
            let t = Arc::clone(&t);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let resp = t.transfer(&[0x20 + n], &[]).unwrap();
                    assert_eq!(resp[0], 0x20 + n);
                }
            })
        })
        .collect();
    for th in threads {
        th.join().unwrap();
    }

    let log = handle.log();
    assert_eq!(log.len(), 8 * 25 * 2);
    for pair in log.chunks(2) {
        match (&pair[0], &pair[1]) {
            (MockEvent::Write(w), MockEvent::Read(r)) => assert_eq!(w[1], r[0]),
            other => panic!("write not followed by its read: {other:?}"),
        }
    }
}

#[test]
fn closed_transport_refuses_io() {
    let (dev, handle) = MockDevice::silent();
    let t = transport(Framing::CommanderPro, dev);
    t.close();
    assert!(matches!(t.transfer(&[0x02], &[]), Err(TransportError::Disconnected)));
    assert!(handle.writes().is_empty());
}

#[test]
fn empty_read_is_timeout() {
    let (dev, _handle) = MockDevice::new(|_| None);
    let t = transport(Framing::CommanderPro, dev).with_read_timeout(1);
    assert!(matches!(t.transfer(&[0x02], &[]), Err(TransportError::Timeout)));
}

// ── Correlated reads ──

#[test]
fn transfer_expect_skips_uncorrelated_reports() {
    let (dev, handle) = MockDevice::new(|_| None);
    handle.push_report(vec![0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x01]);
    handle.push_report(vec![0x00, 0x00, 0x00, 0x00, 0x21, 0x00, 0x02]);
    let t = transport(Framing::Link, dev);
    let resp = t.transfer_expect(&[0x08, 0x01], &[], [0x21, 0x00]).unwrap();
    assert_eq!(resp[6], 0x02);
}

// ── Elite ──

fn elite_echo(w: &[u8]) -> Option<Vec<u8>> {
    // Echo the packet without report id, with a valid CRC
    let mut resp = w[1..].to_vec();
    let crc = crc8(&resp[1..63]);
    resp[63] = crc;
    Some(resp)
}

#[test]
fn elite_sequence_steps_by_eight() {
    let (dev, handle) = MockDevice::new(elite_echo);
    let t = transport(Framing::Elite, dev);
    for _ in 0..3 {
        t.elite_transfer(0x00, &[0xff]).unwrap();
    }
    let seqs: Vec<u8> = handle.writes().iter().map(|w| w[2] & 0xF8).collect();
    assert_eq!(seqs, vec![0x10, 0x18, 0x20]);
    assert_eq!(t.crc_errors(), 0);
}

#[test]
fn elite_crc_mismatch_counted_not_fatal() {
    let (dev, _handle) = MockDevice::new(|w| {
        let mut resp = w[1..].to_vec();
        resp[63] = !crc8(&resp[1..63]);
        Some(resp)
    });
    let t = transport(Framing::Elite, dev);
    let resp = t.elite_transfer(0x00, &[0xff]).unwrap();
    assert_eq!(resp.len(), 64);
    assert_eq!(t.crc_errors(), 1);
}

#[test]
fn elite_drains_stale_reports() {
    let (dev, handle) = MockDevice::new(elite_echo);
    handle.push_report(vec![0xAA; 64]);
    let t = transport(Framing::Elite, dev);
    let resp = t.elite_transfer(0x00, &[0x12]).unwrap();
    assert_eq!(resp[2], 0x12);
}

// ── Feature reports ──

#[test]
fn feature_transfer_reads_back_state() {
    let (dev, handle) = MockDevice::new(|w| Some(vec![0x00, w[1], 0x01, 0x02]));
    let t = transport(Framing::Feature, dev);
    let resp = t.feature_transfer(&[0x0e], &[0x01]).unwrap();
    assert_eq!(resp, vec![0x00, 0x0e, 0x01, 0x02]);
    assert!(matches!(handle.log()[0], MockEvent::FeatureSend(_)));
}
