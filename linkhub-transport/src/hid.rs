//! Raw HID I/O seam
//!
//! Everything above this trait speaks in byte buffers; only the `hidapi`
//! implementation below touches the OS. Tests substitute
//! [`crate::mock::MockDevice`].

use hidapi::HidDevice;

use crate::error::TransportError;

/// Minimal HID operations used by the framers.
pub trait HidIo: Send {
    /// Write an output report (first byte is the report id).
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read an input report, waiting at most `timeout_ms` (-1 blocks).
    /// Returns 0 on timeout.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;

    /// Send a feature report (first byte is the report id).
    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Read a feature report; `buf[0]` selects the report id.
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Switch between blocking and non-blocking reads.
    fn set_blocking_mode(&self, blocking: bool) -> Result<(), TransportError>;

    fn manufacturer(&self) -> Result<Option<String>, TransportError>;

    fn product(&self) -> Result<Option<String>, TransportError>;

    fn serial(&self) -> Result<Option<String>, TransportError>;
}

impl HidIo for HidDevice {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(HidDevice::write(self, data)?)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        Ok(HidDevice::read_timeout(self, buf, timeout_ms)?)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        Ok(HidDevice::send_feature_report(self, data)?)
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(HidDevice::get_feature_report(self, buf)?)
    }

    fn set_blocking_mode(&self, blocking: bool) -> Result<(), TransportError> {
        Ok(HidDevice::set_blocking_mode(self, blocking)?)
    }

    fn manufacturer(&self) -> Result<Option<String>, TransportError> {
        Ok(self.get_manufacturer_string()?)
    }

    fn product(&self) -> Result<Option<String>, TransportError> {
        Ok(self.get_product_string()?)
    }

    fn serial(&self) -> Result<Option<String>, TransportError> {
        Ok(self.get_serial_number_string()?)
    }
}
