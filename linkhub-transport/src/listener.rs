//! Reader loop for unsolicited input reports
//!
//! Control dials, DPI buttons, brightness keys and receiver status changes
//! arrive as input reports on a secondary interface. The loop reads with a
//! short timeout so it notices the stop flag promptly when idle.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::hid::HidIo;
use crate::protocol::{timing, BUFFER_SIZE};

/// Configuration for the report reader loop
#[derive(Clone)]
pub struct ListenerConfig {
    /// Read timeout in milliseconds
    pub read_timeout_ms: i32,
    /// Sleep duration on error before retrying
    pub error_sleep_ms: u64,
    /// Name for debug logging
    pub name: String,
}

impl ListenerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            read_timeout_ms: timing::LISTENER_TIMEOUT_MS,
            error_sleep_ms: 100,
            name: name.into(),
        }
    }
}

/// Read reports until `should_stop` returns true, handing each non-empty
/// report to `handler` together with its arrival time in seconds.
pub fn run_report_loop<S, H>(device: &dyn HidIo, config: &ListenerConfig, should_stop: S, mut handler: H)
where
    S: Fn() -> bool,
    H: FnMut(&[u8], f64),
{
    debug!("{} listener started", config.name);
    let mut buf = [0u8; BUFFER_SIZE];
    let start_time = Instant::now();

    while !should_stop() {
        match device.read_timeout(&mut buf, config.read_timeout_ms) {
            Ok(len) if len > 0 => {
                let timestamp = start_time.elapsed().as_secs_f64();
                debug!(
                    "{} listener got {} bytes at {:.3}s: {:02X?}",
                    config.name,
                    len,
                    timestamp,
                    &buf[..len.min(16)]
                );
                handler(&buf[..len], timestamp);
            }
            Ok(_) => {
                // Timeout, loop back to the stop check
            }
            Err(e) => {
                warn!("{} listener error: {}", config.name, e);
                std::thread::sleep(Duration::from_millis(config.error_sleep_ms));
            }
        }
    }

    debug!("{} listener exiting", config.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use std::cell::Cell;

    #[test]
    fn test_loop_dispatches_until_stopped() {
        let (dev, handle) = MockDevice::new(|_| None);
        handle.push_report(vec![0x03, 0x01, 0x01]);
        handle.push_report(vec![0x03, 0x02]);

        let seen = Cell::new(0);
        let mut reports = Vec::new();
        run_report_loop(
            &dev,
            &ListenerConfig::new("test"),
            || seen.get() >= 2,
            |report, _| {
                reports.push(report.to_vec());
                seen.set(seen.get() + 1);
            },
        );
        assert_eq!(reports, vec![vec![0x03, 0x01, 0x01], vec![0x03, 0x02]]);
    }
}
