//! Serialised request/response transport over one HID handle
//!
//! All writes and reads for a device go through a single mutex, so a
//! request and its response are never interleaved with another request,
//! no matter how many workers share the transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::TransportError;
use crate::hid::HidIo;
use crate::protocol::{self, elite, link, timing, Framing};
use crate::types::TransportDeviceInfo;

/// Strings read from the device during bootstrap.
#[derive(Debug, Clone, Default)]
pub struct DeviceStrings {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
}

/// HID transport for a single device handle.
pub struct HidTransport {
    device: Mutex<Box<dyn HidIo>>,
    info: TransportDeviceInfo,
    framing: Framing,
    read_timeout_ms: i32,
    drain_before_request: bool,
    /// Elite rolling sequence, guarded separately from the device
    sequence: Mutex<u8>,
    crc_errors: AtomicU64,
    closed: AtomicBool,
}

impl HidTransport {
    /// Wrap an opened HID handle.
    pub fn new(device: Box<dyn HidIo>, info: TransportDeviceInfo, framing: Framing) -> Self {
        Self {
            device: Mutex::new(device),
            info,
            framing,
            read_timeout_ms: timing::READ_TIMEOUT_MS,
            drain_before_request: matches!(framing, Framing::Elite),
            sequence: Mutex::new(elite::SEQUENCE_STEP),
            crc_errors: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Override the read timeout (ms)
    pub fn with_read_timeout(mut self, timeout_ms: i32) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    pub fn info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Number of Elite responses whose CRC did not match
    pub fn crc_errors(&self) -> u64 {
        self.crc_errors.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the handle closed; later calls fail with `Disconnected`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }

    /// Read manufacturer, product and serial strings.
    pub fn read_strings(&self) -> Result<DeviceStrings, TransportError> {
        self.ensure_open()?;
        let device = self.device.lock();
        Ok(DeviceStrings {
            manufacturer: device.manufacturer()?,
            product: device.product()?,
            serial: device.serial()?,
        })
    }

    fn drain(&self, device: &dyn HidIo) {
        let mut buf = vec![0u8; self.framing.read_size()];
        for _ in 0..timing::DRAIN_LIMIT {
            match device.read_timeout(&mut buf, timing::DRAIN_TIMEOUT_MS) {
                Ok(n) if n > 0 => trace!("drained stale report: {:02X?}", &buf[..n.min(8)]),
                _ => break,
            }
        }
    }

    fn read_response(&self, device: &dyn HidIo) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; self.framing.read_size()];
        let n = device.read_timeout(&mut buf, self.read_timeout_ms)?;
        if n == 0 {
            return Err(TransportError::Timeout);
        }
        buf.truncate(n);
        trace!("read {} bytes: {:02X?}", n, &buf[..n.min(16)]);
        Ok(buf)
    }

    fn exchange(&self, report: &[u8], expect_response: bool) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let device = self.device.lock();
        if self.drain_before_request {
            self.drain(device.as_ref());
        }
        trace!("write: {:02X?}", &report[..report.len().min(16)]);
        device.write(report)?;
        if expect_response {
            self.read_response(device.as_ref())
        } else {
            Ok(Vec::new())
        }
    }

    /// Write `endpoint` + `payload` using the device framing and read
    /// one response.
    pub fn transfer(&self, endpoint: &[u8], payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let report = protocol::build_report(self.framing, endpoint, payload);
        self.exchange(&report, true)
    }

    /// Write without waiting for a response.
    pub fn write(&self, endpoint: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        let report = protocol::build_report(self.framing, endpoint, payload);
        self.exchange(&report, false).map(|_| ())
    }

    /// Transfer with an explicit route byte (`out[1]`), used by devices
    /// sharing one receiver.
    pub fn transfer_routed(
        &self,
        route: u8,
        endpoint: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let report = protocol::build_report(Framing::Command { route }, endpoint, payload);
        self.exchange(&report, true)
    }

    /// Transfer and keep reading until a response whose data type
    /// (`resp[4..6]`) equals `buffer_type`, bounded by a timeout.
    pub fn transfer_expect(
        &self,
        endpoint: &[u8],
        payload: &[u8],
        buffer_type: [u8; 2],
    ) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let report = protocol::build_report(self.framing, endpoint, payload);
        let device = self.device.lock();
        device.write(&report)?;

        let deadline = Instant::now() + Duration::from_millis(timing::CONTINUATION_TIMEOUT_MS);
        loop {
            let resp = self.read_response(device.as_ref())?;
            let off = link::DATA_TYPE_OFFSET;
            if resp.len() >= off + 2 && resp[off..off + 2] == buffer_type {
                return Ok(resp);
            }
            trace!(
                "skipping uncorrelated response, want {:02X?} got {:02X?}",
                buffer_type,
                resp.get(off..off + 2)
            );
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
        }
    }

    /// Write a pre-framed report (LCD streaming).
    pub fn write_raw(&self, report: &[u8]) -> Result<(), TransportError> {
        self.exchange(report, false).map(|_| ())
    }

    /// Send a feature report and read the device state back.
    pub fn feature_transfer(
        &self,
        endpoint: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let report = protocol::build_report(Framing::Feature, endpoint, payload);
        let device = self.device.lock();
        device.send_feature_report(&report)?;
        let mut buf = vec![0u8; protocol::REPORT_SIZE];
        let n = device.get_feature_report(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Send a feature report without reading back.
    pub fn feature_write(&self, endpoint: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let report = protocol::build_report(Framing::Feature, endpoint, payload);
        self.device.lock().send_feature_report(&report)
    }

    /// Elite request: frame with the next sequence, send, read and verify.
    ///
    /// A CRC mismatch is counted and logged; the response is still returned.
    pub fn elite_transfer(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let device = self.device.lock();
        if self.drain_before_request {
            self.drain(device.as_ref());
        }

        let packet = {
            let mut seq = self.sequence.lock();
            *seq = protocol::next_sequence(*seq);
            protocol::build_elite_packet(*seq, command, payload)
        };
        trace!("elite write: {:02X?}", &packet[..16]);
        device.write(&packet)?;

        let resp = self.read_response(device.as_ref())?;
        match protocol::verify_elite_response(&resp) {
            Ok(()) => {}
            Err(e) => {
                self.crc_errors.fetch_add(1, Ordering::Relaxed);
                warn!("{}: {}", self.info.effective_serial(), e);
            }
        }
        if let Some(&seq) = resp.get(1) {
            *self.sequence.lock() = seq & !elite::COMMAND_MASK;
        }
        Ok(resp)
    }
}
