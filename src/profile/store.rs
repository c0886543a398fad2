// Profile store
// Loads <serial>[-<name>].json documents, elects the active one and saves atomically

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::types::DeviceProfile;
use crate::error::{DriverError, Result, Status};
use crate::persist;

/// Name of the profile stored as bare `<serial>.json`
pub const DEFAULT_PROFILE: &str = "default";

fn name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]+$").ok()).as_ref()
}

/// Profile names and file stems share one grammar
pub fn is_valid_name(name: &str) -> bool {
    name_regex().is_some_and(|re| re.is_match(name))
}

/// All profiles of one device serial
#[derive(Debug)]
pub struct ProfileStore {
    dir: PathBuf,
    serial: String,
    profiles: BTreeMap<String, DeviceProfile>,
}

impl ProfileStore {
    /// Scan `dir` for profiles belonging to `serial`.
    ///
    /// An unreadable directory is an error; unreadable files are skipped.
    pub fn load(dir: &Path, serial: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut store = Self {
            dir: dir.to_path_buf(),
            serial: serial.to_string(),
            profiles: BTreeMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Map a file stem to a profile name, if it belongs to this serial
    fn name_for(&self, stem: &str) -> Option<String> {
        if !is_valid_name(stem) {
            return None;
        }
        if stem == self.serial {
            return Some(DEFAULT_PROFILE.to_string());
        }
        stem.strip_prefix(&self.serial)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        if name == DEFAULT_PROFILE {
            self.dir.join(format!("{}.json", self.serial))
        } else {
            self.dir.join(format!("{}-{}.json", self.serial, name))
        }
    }

    /// Re-read every profile file and elect the active one.
    pub fn reload(&mut self) -> Result<()> {
        let mut profiles = BTreeMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(name) = self.name_for(stem) else {
                continue;
            };
            match persist::read_json::<DeviceProfile>(&path) {
                Ok(mut profile) => {
                    profile.path = path.to_string_lossy().into_owned();
                    profiles.insert(name, profile);
                }
                Err(e) => warn!("{}: skipping profile {}: {e}", self.serial, path.display()),
            }
        }
        self.profiles = profiles;
        self.elect();
        debug!(
            "{}: loaded {} profiles, active {:?}",
            self.serial,
            self.profiles.len(),
            self.active_name()
        );
        Ok(())
    }

    /// Keep exactly one active profile, preferring `default` on ties
    fn elect(&mut self) {
        let flagged: Vec<String> = self
            .profiles
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(n, _)| n.clone())
            .collect();
        let winner = if flagged.iter().any(|n| n == DEFAULT_PROFILE) && flagged.len() > 1 {
            Some(DEFAULT_PROFILE.to_string())
        } else if let Some(first) = flagged.first() {
            Some(first.clone())
        } else if self.profiles.contains_key(DEFAULT_PROFILE) {
            Some(DEFAULT_PROFILE.to_string())
        } else {
            self.profiles.keys().next().cloned()
        };
        for (name, profile) in self.profiles.iter_mut() {
            profile.active = winner.as_deref() == Some(name.as_str());
        }
    }

    /// Write `make()` as the default profile when none exists.
    pub fn ensure_default<F>(&mut self, make: F) -> Result<bool>
    where
        F: FnOnce() -> DeviceProfile,
    {
        if !self.profiles.is_empty() {
            return Ok(false);
        }
        let mut profile = make();
        profile.active = true;
        let path = self.path_for(DEFAULT_PROFILE);
        profile.path = path.to_string_lossy().into_owned();
        persist::write_json_atomic(&path, &profile)?;
        info!("{}: created default profile", self.serial);
        self.reload()?;
        Ok(true)
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&DeviceProfile> {
        self.profiles.get(name)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.profiles
            .iter()
            .find(|(_, p)| p.active)
            .map(|(n, _)| n.as_str())
    }

    pub fn active(&self) -> Option<&DeviceProfile> {
        self.profiles.values().find(|p| p.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut DeviceProfile> {
        self.profiles.values_mut().find(|p| p.active)
    }

    /// Persist the active profile and reload the directory.
    pub fn save_active(&mut self) -> Result<()> {
        let name = self
            .active_name()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Profile(format!("{}: no active profile", self.serial)))?;
        self.write(&name)?;
        self.reload()
    }

    fn write(&mut self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if let Some(profile) = self.profiles.get_mut(name) {
            profile.path = path.to_string_lossy().into_owned();
            persist::write_json_atomic(&path, profile)?;
        }
        Ok(())
    }

    /// Copy the active profile under a new name (not activated).
    pub fn save_as(&mut self, name: &str) -> Status {
        if !is_valid_name(name) || name == DEFAULT_PROFILE {
            return Status::Rejected;
        }
        let Some(mut copy) = self.active().cloned() else {
            return Status::Failure;
        };
        copy.active = false;
        let path = self.path_for(name);
        copy.path = path.to_string_lossy().into_owned();
        if let Err(e) = persist::write_json_atomic(&path, &copy) {
            warn!("{}: unable to save profile {name}: {e}", self.serial);
            return Status::Failure;
        }
        self.reload_logged()
    }

    /// Make `name` the active profile.
    pub fn switch(&mut self, name: &str) -> Status {
        if !self.profiles.contains_key(name) {
            return Status::Rejected;
        }
        let previous = self.active_name().map(str::to_string);
        for (n, p) in self.profiles.iter_mut() {
            p.active = n == name;
        }
        let mut names = vec![name.to_string()];
        names.extend(previous.filter(|p| p != name));
        for n in names {
            if let Err(e) = self.write(&n) {
                warn!("{}: unable to switch profile: {e}", self.serial);
                return Status::Failure;
            }
        }
        self.reload_logged()
    }

    /// Delete a non-active profile.
    pub fn delete(&mut self, name: &str) -> Status {
        let Some(profile) = self.profiles.get(name) else {
            return Status::Failure;
        };
        if profile.active {
            return Status::Rejected;
        }
        if name == DEFAULT_PROFILE {
            return Status::Forbidden;
        }
        if let Err(e) = std::fs::remove_file(self.path_for(name)) {
            warn!("{}: unable to delete profile {name}: {e}", self.serial);
            return Status::Failure;
        }
        self.profiles.remove(name);
        Status::Ok
    }

    fn reload_logged(&mut self) -> Status {
        match self.reload() {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("{}: profile reload failed: {e}", self.serial);
                Status::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, file: &str, body: &str) {
        std::fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn test_name_grammar() {
        assert!(is_valid_name("ABC-123"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a_b"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../x"));
    }

    #[test]
    fn test_only_matching_files_loaded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "SER.json", r#"{"active":true}"#);
        write(dir.path(), "SER-gaming.json", r#"{}"#);
        write(dir.path(), "OTHER.json", r#"{"active":true}"#);
        write(dir.path(), "SER_bad.json", r#"{}"#);
        write(dir.path(), "SER-broken.json", "not json");
        write(dir.path(), "SER-notes.txt", "");
        let store = ProfileStore::load(dir.path(), "SER").unwrap();
        assert_eq!(store.names(), vec!["default", "gaming"]);
        assert_eq!(store.active_name(), Some("default"));
    }

    #[test]
    fn test_active_is_singleton() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "SER-a.json", r#"{"active":true}"#);
        write(dir.path(), "SER-b.json", r#"{"active":true}"#);
        let store = ProfileStore::load(dir.path(), "SER").unwrap();
        let active: Vec<_> = store.names().into_iter().filter(|n| store.get(n).unwrap().active).collect();
        assert_eq!(active, vec!["a"]);
    }

    #[test]
    fn test_ensure_default_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load(dir.path(), "SER").unwrap();
        assert!(store.ensure_default(|| DeviceProfile::new("SER", "Hub")).unwrap());
        assert!(!store.ensure_default(|| DeviceProfile::new("SER", "Hub")).unwrap());
        assert!(dir.path().join("SER.json").exists());
        assert_eq!(store.active().unwrap().product, "Hub");
    }

    #[test]
    fn test_save_switch_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load(dir.path(), "SER").unwrap();
        store.ensure_default(|| DeviceProfile::new("SER", "Hub")).unwrap();

        assert_eq!(store.save_as("gaming"), Status::Ok);
        assert_eq!(store.save_as("bad name"), Status::Rejected);
        assert_eq!(store.active_name(), Some("default"));

        assert_eq!(store.switch("gaming"), Status::Ok);
        assert_eq!(store.active_name(), Some("gaming"));
        assert_eq!(store.delete("gaming"), Status::Rejected);
        assert_eq!(store.switch("missing"), Status::Rejected);

        assert_eq!(store.switch("default"), Status::Ok);
        assert_eq!(store.delete("gaming"), Status::Ok);
        assert!(!dir.path().join("SER-gaming.json").exists());
        assert!(store.get("gaming").is_none());
    }

    #[test]
    fn test_save_active_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load(dir.path(), "SER").unwrap();
        store.ensure_default(|| DeviceProfile::new("SER", "Hub")).unwrap();
        store.active_mut().unwrap().labels.insert(2, "Rear".into());
        store.save_active().unwrap();

        let first = std::fs::read_to_string(dir.path().join("SER.json")).unwrap();
        let reloaded = ProfileStore::load(dir.path(), "SER").unwrap();
        assert_eq!(reloaded.active().unwrap().label(2), "Rear");
        let mut again = reloaded;
        again.save_active().unwrap();
        let second = std::fs::read_to_string(dir.path().join("SER.json")).unwrap();
        assert_eq!(first, second);
    }
}
