//! Configuration.
//!
//! [`ConfigFile`] is the on-disk INI file at [`config_file_path`];
//! [`ConfigKey`] addresses its values as `section.key` strings for the CLI;
//! [`EngineConfig`] is the typed form the engine is built from.

mod engine;
mod file;
mod keys;

pub use engine::EngineConfig;
pub use file::{
    config_dir, config_file_path, ArtifactSettings, ConfigError, ConfigFile, IdSettings,
    LoggingSettings, NotifierSettings, QueueSettings, RegistrySettings, DEFAULT_LOG_LEVEL,
};
pub use keys::ConfigKey;
