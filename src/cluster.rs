//! Cluster registry: devices whose lighting is driven by an external
//! broadcaster instead of their own RGB engine.
//!
//! Drivers register themselves when `rgbCluster` is switched on and must
//! unregister on stop so the registry does not keep them alive.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Receiver of broadcast frames.
pub trait ClusterController: Send + Sync {
    fn serial(&self) -> String;
    /// Number of LEDs the controller expects per frame.
    fn led_channels(&self) -> usize;
    /// Write an externally generated RGB frame (`R,G,B` interleaved).
    fn write_color_ex(&self, data: &[u8], port: i32);
}

#[derive(Default)]
pub struct ClusterRegistry {
    members: RwLock<BTreeMap<String, Arc<dyn ClusterController>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, controller: Arc<dyn ClusterController>) {
        let serial = controller.serial();
        debug!("cluster: register {serial}");
        self.members.write().insert(serial, controller);
    }

    pub fn unregister(&self, serial: &str) -> bool {
        let removed = self.members.write().remove(serial).is_some();
        if removed {
            debug!("cluster: unregister {serial}");
        }
        removed
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.members.read().contains_key(serial)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total LEDs across members, in serial order.
    pub fn total_leds(&self) -> usize {
        self.members.read().values().map(|c| c.led_channels()).sum()
    }

    /// Split one long frame across members in serial order, each getting
    /// its own `led_channels * 3` slice.
    pub fn broadcast(&self, frame: &[u8]) {
        let members: Vec<_> = self.members.read().values().cloned().collect();
        let mut offset = 0;
        for member in members {
            let len = member.led_channels() * 3;
            let end = (offset + len).min(frame.len());
            let slice = frame.get(offset..end).unwrap_or(&[]);
            member.write_color_ex(slice, 0);
            offset = end;
        }
    }
}
