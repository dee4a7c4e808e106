//! Typed `section.key` access to [`ConfigFile`] values.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

/// A known configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    RegistryMaxEntries,
    RegistrySnapshotCache,
    RegistrySnapshotDir,
    QueueWorkers,
    NotifierTickMs,
    ArtifactsScopeTtlSecs,
    ArtifactsMaxPayloads,
    IdsDynamicPackage,
    LoggingLevel,
    LoggingDirectory,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::RegistryMaxEntries,
    ConfigKey::RegistrySnapshotCache,
    ConfigKey::RegistrySnapshotDir,
    ConfigKey::QueueWorkers,
    ConfigKey::NotifierTickMs,
    ConfigKey::ArtifactsScopeTtlSecs,
    ConfigKey::ArtifactsMaxPayloads,
    ConfigKey::IdsDynamicPackage,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingDirectory,
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::RegistryMaxEntries | Self::RegistrySnapshotCache | Self::RegistrySnapshotDir => {
                "registry"
            }
            Self::QueueWorkers => "queue",
            Self::NotifierTickMs => "notifier",
            Self::ArtifactsScopeTtlSecs | Self::ArtifactsMaxPayloads => "artifacts",
            Self::IdsDynamicPackage => "ids",
            Self::LoggingLevel | Self::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::RegistryMaxEntries => "max_entries",
            Self::RegistrySnapshotCache => "snapshot_cache",
            Self::RegistrySnapshotDir => "snapshot_dir",
            Self::QueueWorkers => "workers",
            Self::NotifierTickMs => "tick_ms",
            Self::ArtifactsScopeTtlSecs => "scope_ttl_secs",
            Self::ArtifactsMaxPayloads => "max_payloads",
            Self::IdsDynamicPackage => "dynamic_package",
            Self::LoggingLevel => "level",
            Self::LoggingDirectory => "directory",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::RegistryMaxEntries => config.registry.max_entries.to_string(),
            Self::RegistrySnapshotCache => config.registry.snapshot_cache.to_string(),
            Self::RegistrySnapshotDir => config.registry.snapshot_dir.display().to_string(),
            Self::QueueWorkers => config
                .queue
                .workers
                .map(|w| w.to_string())
                .unwrap_or_default(),
            Self::NotifierTickMs => config.notifier.tick_ms.to_string(),
            Self::ArtifactsScopeTtlSecs => config.artifacts.scope_ttl_secs.to_string(),
            Self::ArtifactsMaxPayloads => config.artifacts.max_payloads.to_string(),
            Self::IdsDynamicPackage => format!("0x{:02x}", config.ids.dynamic_package),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validate and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let name = self.name();
        let value = value.trim();
        match self {
            Self::RegistryMaxEntries => {
                config.registry.max_entries = parse_positive(&name, value)?;
            }
            Self::RegistrySnapshotCache => {
                config.registry.snapshot_cache = parse_bool(&name, value)?;
            }
            Self::RegistrySnapshotDir => {
                if value.is_empty() {
                    return Err(ConfigError::invalid(&name, value, "path must not be empty"));
                }
                config.registry.snapshot_dir = PathBuf::from(value);
            }
            Self::QueueWorkers => {
                config.queue.workers = if value.is_empty() || value == "auto" {
                    None
                } else {
                    Some(parse_positive::<usize>(&name, value)?)
                };
            }
            Self::NotifierTickMs => {
                config.notifier.tick_ms = parse_positive(&name, value)?;
            }
            Self::ArtifactsScopeTtlSecs => {
                config.artifacts.scope_ttl_secs = parse_positive(&name, value)?;
            }
            Self::ArtifactsMaxPayloads => {
                config.artifacts.max_payloads = parse_positive(&name, value)?;
            }
            Self::IdsDynamicPackage => {
                config.ids.dynamic_package = parse_package(&name, value)?;
            }
            Self::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(ConfigError::invalid(
                        &name,
                        value,
                        format!("expected one of {}", LOG_LEVELS.join(", ")),
                    ));
                }
                config.logging.level = level;
            }
            Self::LoggingDirectory => {
                config.logging.directory = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_KEYS
            .iter()
            .find(|key| key.name() == s)
            .copied()
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = value
        .parse()
        .map_err(|_| ConfigError::invalid(name, value, "expected a positive integer"))?;
    if parsed <= T::default() {
        return Err(ConfigError::invalid(name, value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(name, value, "expected true or false")),
    }
}

fn parse_package(name: &str, value: &str) -> Result<u8, ConfigError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let package = u8::from_str_radix(digits, 16)
        .map_err(|_| ConfigError::invalid(name, value, "expected a hex byte such as 0x7f"))?;
    // 0x00 and 0x01 are reserved for the framework.
    if package < 0x02 {
        return Err(ConfigError::invalid(name, value, "packages 0x00 and 0x01 are reserved"));
    }
    Ok(package)
}
