//! Typed engine configuration derived from [`ConfigFile`].

use std::path::PathBuf;
use std::time::Duration;

use super::file::ConfigFile;
use crate::artifacts::ArtifactConfig;
use crate::ids::DEFAULT_DYNAMIC_PACKAGE;
use crate::notify::NotifierConfig;
use crate::queue::QueueConfig;
use crate::registry::RegistryConfig;

/// Everything [`ResourceEngine`](crate::engine::ResourceEngine) needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub queue: QueueConfig,
    pub notifier: NotifierConfig,
    pub artifacts: ArtifactConfig,
    pub dynamic_package: u8,
    /// Directory of the persistent snapshot store; `None` disables it.
    pub snapshot_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            registry: RegistryConfig {
                max_entries: config.registry.max_entries,
            },
            queue: QueueConfig {
                workers: config.queue.workers.unwrap_or_else(QueueConfig::default_workers),
            },
            notifier: NotifierConfig {
                tick: Duration::from_millis(config.notifier.tick_ms),
            },
            artifacts: ArtifactConfig {
                scope_ttl: Duration::from_secs(config.artifacts.scope_ttl_secs),
                max_payloads: config.artifacts.max_payloads,
            },
            dynamic_package: config.ids.dynamic_package,
            snapshot_dir: config
                .registry
                .snapshot_cache
                .then(|| config.registry.snapshot_dir.clone()),
        }
    }

    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }
}

impl Default for EngineConfig {
    /// Defaults without a persistent store.
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            queue: QueueConfig::default(),
            notifier: NotifierConfig::default(),
            artifacts: ArtifactConfig::default(),
            dynamic_package: DEFAULT_DYNAMIC_PACKAGE,
            snapshot_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_file() {
        let mut file = ConfigFile::default();
        file.queue.workers = Some(2);
        file.notifier.tick_ms = 25;
        file.registry.snapshot_cache = false;

        let config = EngineConfig::from_config_file(&file);
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.notifier.tick, Duration::from_millis(25));
        assert_eq!(config.snapshot_dir, None);
        assert_eq!(config.artifacts.scope_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_snapshot_dir_follows_cache_switch() {
        let file = ConfigFile::default();
        let config = EngineConfig::from_config_file(&file);
        assert_eq!(config.snapshot_dir, Some(file.registry.snapshot_dir.clone()));
        assert!(config.queue.workers > 0);
    }
}
