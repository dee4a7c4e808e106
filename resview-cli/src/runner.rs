//! Shared setup for commands that run the engine.
//!
//! Loads the config file, installs logging and owns the tokio runtime the
//! engine's background tasks run on.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};

use resview::config::{config_file_path, ConfigFile, EngineConfig};
use resview::engine::ResourceEngine;
use resview::logging::{init_logging, WorkerGuard};
use resview::repository::FileLayoutParser;

use crate::error::CliError;

pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration and initialize logging and the runtime.
    ///
    /// `log_level` overrides `logging.level` from the config file.
    pub fn new(log_level: Option<&str>) -> Result<Self, CliError> {
        let (mut config, load_error) = match ConfigFile::load() {
            Ok(config) => (config, None),
            Err(e) => (ConfigFile::default(), Some(e)),
        };
        if let Some(level) = log_level {
            config.logging.level = level.to_string();
        }

        let log_guard = init_logging(&config.logging)?;
        if let Some(e) = load_error {
            warn!(error = %e, "Using default configuration");
        }

        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("resview")
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = resview::VERSION,
            command,
            config = %config_file_path().display(),
            "resview starting"
        );
    }

    /// Start an engine over on-disk resource folders.
    pub fn start_engine(&self) -> Result<ResourceEngine, CliError> {
        let _entered = self.runtime.enter();
        let engine = ResourceEngine::start(
            EngineConfig::from_config_file(&self.config),
            Arc::new(FileLayoutParser::new()),
        )?;
        Ok(engine)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
