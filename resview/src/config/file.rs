//! INI configuration file.
//!
//! ```ini
//! [registry]
//! max_entries = 1024
//! snapshot_cache = true
//! snapshot_dir = /home/me/.cache/resview/snapshots
//!
//! [queue]
//! workers = 8
//!
//! [notifier]
//! tick_ms = 16
//!
//! [artifacts]
//! scope_ttl_secs = 300
//! max_payloads = 512
//!
//! [ids]
//! dynamic_package = 0x7f
//!
//! [logging]
//! level = info
//! directory = /home/me/.resview/logs
//! ```
//!
//! Missing keys keep their defaults; a missing file is all defaults.

use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::artifacts::{DEFAULT_MAX_PAYLOADS, DEFAULT_SCOPE_TTL};
use crate::ids::DEFAULT_DYNAMIC_PACKAGE;
use crate::notify::DEFAULT_TICK;
use crate::registry::DEFAULT_MAX_ENTRIES;

const CONFIG_DIR: &str = ".resview";
const CONFIG_FILE: &str = "config.ini";

/// Default log level when neither the file nor `RUST_LOG` says otherwise.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// `~/.resview/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// `~/.resview`, or `./.resview` if there is no home directory.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

fn default_snapshot_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(config_dir)
        .join("resview")
        .join("snapshots")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub max_entries: u64,
    pub snapshot_cache: bool,
    pub snapshot_dir: PathBuf,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            snapshot_cache: true,
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSettings {
    /// `None` uses the available parallelism.
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierSettings {
    pub tick_ms: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSettings {
    pub scope_ttl_secs: u64,
    pub max_payloads: u64,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            scope_ttl_secs: DEFAULT_SCOPE_TTL.as_secs(),
            max_payloads: DEFAULT_MAX_PAYLOADS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSettings {
    pub dynamic_package: u8,
}

impl Default for IdSettings {
    fn default() -> Self {
        Self {
            dynamic_package: DEFAULT_DYNAMIC_PACKAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    /// Also write daily-rolling log files here when set.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub registry: RegistrySettings,
    pub queue: QueueSettings,
    pub notifier: NotifierSettings,
    pub artifacts: ArtifactSettings,
    pub ids: IdSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            source: ini::Error::Parse(e),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in super::ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in super::ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section())).set(key.key_name(), value);
            }
        }
        ini
    }
}
