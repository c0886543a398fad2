//! In-memory HID device for exercising framers and drivers without hardware
//!
//! A [`MockDevice`] answers every write through a responder closure and
//! records the traffic in a shared log that tests inspect through a
//! [`MockHandle`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::hid::HidIo;

/// Responder: given the written report, optionally produce a response.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// One entry of the traffic log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Write(Vec<u8>),
    Read(Vec<u8>),
    FeatureSend(Vec<u8>),
    FeatureGet(Vec<u8>),
}

#[derive(Default)]
struct MockState {
    log: Vec<MockEvent>,
    responses: VecDeque<Vec<u8>>,
    feature_responses: VecDeque<Vec<u8>>,
    unsolicited: VecDeque<Vec<u8>>,
    fail_writes: bool,
}

/// Inspection handle shared with the device.
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Every write, in order (output and feature reports).
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|e| match e {
                MockEvent::Write(d) | MockEvent::FeatureSend(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Full traffic log.
    pub fn log(&self) -> Vec<MockEvent> {
        self.state.lock().log.clone()
    }

    /// Drop recorded traffic.
    pub fn clear(&self) {
        self.state.lock().log.clear();
    }

    /// Queue an unsolicited input report (listener traffic).
    pub fn push_report(&self, report: Vec<u8>) {
        self.state.lock().unsolicited.push_back(report);
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Writes whose bytes start with `prefix`.
    pub fn writes_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
            .filter(|w| w.starts_with(prefix))
            .collect()
    }
}

/// Scripted HID device.
pub struct MockDevice {
    handle: MockHandle,
    responder: Mutex<Responder>,
    manufacturer: Option<String>,
    product: Option<String>,
    serial: Option<String>,
}

impl MockDevice {
    /// Create a device answering writes with `responder`.
    pub fn new<F>(responder: F) -> (Self, MockHandle)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let handle = MockHandle::default();
        let device = Self {
            handle: handle.clone(),
            responder: Mutex::new(Box::new(responder)),
            manufacturer: Some("Corsair".into()),
            product: None,
            serial: None,
        };
        (device, handle)
    }

    /// Device that answers every write with a zeroed 64-byte report.
    pub fn silent() -> (Self, MockHandle) {
        Self::new(|_| Some(vec![0u8; 64]))
    }

    pub fn with_strings(mut self, product: &str, serial: &str) -> Self {
        self.product = Some(product.to_string());
        self.serial = Some(serial.to_string());
        self
    }
}

impl HidIo for MockDevice {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.handle.state.lock().fail_writes {
            return Err(TransportError::HidError("mock write failure".into()));
        }
        let response = {
            let mut responder = self.responder.lock();
            (&mut **responder)(data)
        };
        let mut state = self.handle.state.lock();
        state.log.push(MockEvent::Write(data.to_vec()));
        if let Some(resp) = response {
            state.responses.push_back(resp);
        }
        Ok(data.len())
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let next = {
            let mut state = self.handle.state.lock();
            let next = state
                .responses
                .pop_front()
                .or_else(|| state.unsolicited.pop_front());
            if let Some(ref data) = next {
                state.log.push(MockEvent::Read(data.clone()));
            }
            next
        };
        match next {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => {
                if timeout_ms > 0 {
                    std::thread::sleep(Duration::from_millis(timeout_ms.min(10) as u64));
                }
                Ok(0)
            }
        }
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.handle.state.lock().fail_writes {
            return Err(TransportError::HidError("mock write failure".into()));
        }
        let response = {
            let mut responder = self.responder.lock();
            (&mut **responder)(data)
        };
        let mut state = self.handle.state.lock();
        state.log.push(MockEvent::FeatureSend(data.to_vec()));
        if let Some(resp) = response {
            state.feature_responses.push_back(resp);
        }
        Ok(())
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.handle.state.lock();
        let data = state.feature_responses.pop_front().unwrap_or_default();
        state.log.push(MockEvent::FeatureGet(data.clone()));
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn set_blocking_mode(&self, _blocking: bool) -> Result<(), TransportError> {
        Ok(())
    }

    fn manufacturer(&self) -> Result<Option<String>, TransportError> {
        Ok(self.manufacturer.clone())
    }

    fn product(&self) -> Result<Option<String>, TransportError> {
        Ok(self.product.clone())
    }

    fn serial(&self) -> Result<Option<String>, TransportError> {
        Ok(self.serial.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responses_follow_writes() {
        let (dev, handle) = MockDevice::new(|w| Some(vec![w[1]; 4]));
        dev.write(&[0x00, 0x42]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(dev.read_timeout(&mut buf, 10).unwrap(), 4);
        assert_eq!(buf, [0x42; 4]);
        assert_eq!(handle.writes().len(), 1);
    }

    #[test]
    fn test_unsolicited_reports_after_responses() {
        let (dev, handle) = MockDevice::new(|_| None);
        handle.push_report(vec![0x03, 0x01]);
        let mut buf = [0u8; 8];
        assert_eq!(dev.read_timeout(&mut buf, 10).unwrap(), 2);
        assert_eq!(dev.read_timeout(&mut buf, 0).unwrap(), 0);
    }
}
