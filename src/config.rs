//! Bench configuration
//!
//! Loaded from an optional TOML file. Every field has a default so a partial
//! file (or none at all) describes a working bench.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BenchError, BenchResult};

/// Baud rate of the bench controller board
pub const DEFAULT_BAUD: u32 = 115200;

#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM35";
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Top-level bench configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub serial: SerialSection,
    pub session: SessionSection,
}

/// Serial link to the controller board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Serial port path (e.g., /dev/ttyUSB0, COM35)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// How long a single read may block before the cancel flag is re-checked
    pub read_timeout_ms: u64,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD,
            read_timeout_ms: 500,
        }
    }
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Directory that receives `<battery>_<current>.csv` logs
    pub log_dir: PathBuf,
    /// Create `log_dir` when it does not exist
    pub create_log_dir: bool,
    /// Pause between the command byte and the first read
    pub settle_ms: u64,
    /// Stop when nothing arrives for this long (unset waits forever)
    pub idle_limit_secs: Option<u64>,
    /// Prefix console echo with a local timestamp
    pub show_timestamps: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            create_log_dir: true,
            settle_ms: 1000,
            idle_limit_secs: None,
            show_timestamps: false,
        }
    }
}

impl SerialSection {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl SessionSection {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn idle_limit(&self) -> Option<Duration> {
        self.idle_limit_secs.map(Duration::from_secs)
    }
}

impl BenchConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| BenchError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::parse_content(&content, path)
    }

    /// Parse TOML content; `origin` is only used in error messages
    pub fn parse_content(content: &str, origin: &Path) -> BenchResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| BenchError::Config {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        log::debug!("loaded configuration from {}", origin.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> BenchResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> BenchResult<String> {
        toml::to_string_pretty(self).map_err(|e| BenchError::Config {
            path: PathBuf::from("<generated>"),
            reason: e.to_string(),
        })
    }
}
