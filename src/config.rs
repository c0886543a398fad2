//! Runtime configuration.
//!
//! Loaded from `<config_path>/config.toml`; every key is optional.
//!
//! ```toml
//! manual = false          # disable the speed controller
//! graph_profiles = false  # interpolate speed graphs instead of curve bands
//! refresh_on_start = true # rediscover iCUE LINK devices after software mode
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Environment variable overriding the config directory
pub const CONFIG_PATH_ENV: &str = "LINKHUB_CONFIG_PATH";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Disable the speed controller entirely
    pub manual: bool,
    /// Select graph interpolation for speed profiles
    pub graph_profiles: bool,
    /// Rediscover iCUE LINK devices after entering software mode
    pub refresh_on_start: bool,
    /// Override the per-device RGB frame interval (ms)
    pub frame_interval_ms: Option<u64>,
    /// Print the metrics exposition when the daemon exits
    pub print_metrics: bool,
}

/// Settings plus the directory they came from.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    /// Config rooted at `path` with default settings (nothing read).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            settings: Settings::default(),
        }
    }

    /// Load `config.toml` from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = path.into();
        let file = config_path.join(CONFIG_FILE);
        let settings = if file.exists() {
            let text = std::fs::read_to_string(&file)?;
            toml::from_str(&text)?
        } else {
            Settings::default()
        };
        Ok(Self {
            config_path,
            settings,
        })
    }

    /// Resolve the config directory: explicit, env, XDG, HOME.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Some(p) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        dirs_path()
    }

    fn database(&self) -> PathBuf {
        self.config_path.join("database")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.database().join("profiles")
    }

    pub fn rgb_dir(&self) -> PathBuf {
        self.database().join("rgb")
    }

    pub fn led_dir(&self) -> PathBuf {
        self.database().join("led")
    }

    pub fn keyboard_dir(&self) -> PathBuf {
        self.database().join("keyboard")
    }

    pub fn temperatures_file(&self) -> PathBuf {
        self.database().join("temperatures.json")
    }

    /// Create the database directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.profiles_dir(),
            self.rgb_dir(),
            self.led_dir(),
            self.keyboard_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn dirs_path() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("linkhub")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config/linkhub")
    } else {
        PathBuf::from("/tmp/linkhub")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert!(!cfg.settings.manual);
        assert!(cfg.settings.frame_interval_ms.is_none());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "manual = true\n").unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert!(cfg.settings.manual);
        assert!(!cfg.settings.graph_profiles);
    }

    #[test]
    fn test_layout() {
        let cfg = Config::with_path("/srv/linkhub");
        assert_eq!(
            cfg.profiles_dir(),
            PathBuf::from("/srv/linkhub/database/profiles")
        );
        assert_eq!(
            cfg.temperatures_file(),
            PathBuf::from("/srv/linkhub/database/temperatures.json")
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let p = Config::resolve_path(Some(Path::new("/opt/cfg")));
        assert_eq!(p, PathBuf::from("/opt/cfg"));
    }
}
