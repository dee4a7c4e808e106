//! CLI error type.

use std::fmt;
use std::io;

use resview::artifacts::ArtifactError;
use resview::config::ConfigError;
use resview::engine::EngineError;
use resview::ids::IdError;
use resview::logging::LoggingError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration or arguments.
    Config(String),
    /// Logging could not be initialized.
    Logging(LoggingError),
    /// The async runtime could not be built.
    Runtime(io::Error),
    /// The resource engine failed.
    Engine(EngineError),
    /// A symbol table or id could not be parsed.
    Ids(IdError),
    /// A derived artifact could not be generated.
    Artifact(ArtifactError),
    /// A directory could not be watched.
    Watch(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Engine(e) => write!(f, "{}", e),
            CliError::Ids(e) => write!(f, "{}", e),
            CliError::Artifact(e) => write!(f, "{}", e),
            CliError::Watch(msg) => write!(f, "Watch failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Engine(e) => Some(e),
            CliError::Ids(e) => Some(e),
            CliError::Artifact(e) => Some(e),
            CliError::Config(_) | CliError::Watch(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<IdError> for CliError {
    fn from(e: IdError) -> Self {
        CliError::Ids(e)
    }
}

impl From<ArtifactError> for CliError {
    fn from(e: ArtifactError) -> Self {
        CliError::Artifact(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_with_message() {
        let err: CliError = ConfigError::UnknownKey("nope.key".to_string()).into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("nope.key"));
    }

    #[test]
    fn test_watch_error_display() {
        let err = CliError::Watch("/missing: not found".to_string());
        assert_eq!(err.to_string(), "Watch failed: /missing: not found");
    }
}
