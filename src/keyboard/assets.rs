//! Keyboard layout descriptors under `database/keyboard`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::Keyboard;
use crate::persist;

/// Cached layout loader.
pub struct KeyboardAssets {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Keyboard>>,
}

impl KeyboardAssets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Layout stored as `<dir>/<key>.json`, if present and valid.
    pub fn get(&self, key: &str) -> Option<Keyboard> {
        if let Some(kb) = self.cache.read().get(key) {
            return Some(kb.clone());
        }
        let path = self.dir.join(format!("{key}.json"));
        if !path.exists() {
            return None;
        }
        match persist::read_json::<Keyboard>(&path) {
            Ok(kb) => {
                debug!("loaded keyboard layout {key}");
                self.cache.write().insert(key.to_string(), kb.clone());
                Some(kb)
            }
            Err(e) => {
                warn!("invalid keyboard layout {}: {e}", path.display());
                None
            }
        }
    }

    /// Layout `<device>-<layout>`, or a linear layout of `count` keys.
    pub fn layout_or_linear(
        &self,
        device: &str,
        layout: &str,
        count: usize,
        stride: usize,
    ) -> Keyboard {
        let key = format!("{device}-{layout}");
        self.get(&key)
            .unwrap_or_else(|| Keyboard::linear(&key, device, layout, count, stride))
    }
}
