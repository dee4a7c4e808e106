//! Logging setup.
//!
//! Console output (stderr) always; a daily-rolling file when a log directory is
//! configured. `RUST_LOG` overrides the configured level.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

pub use tracing_appender::non_blocking::WorkerGuard;

/// File name prefix of rolled log files.
pub const LOG_FILE_PREFIX: &str = "resview.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("resview={level},resview_cli={level},warn")
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file logging should flush.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&settings.level)));

    let console = fmt::layer()
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(LocalTime::new(Rfc3339))
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

/// Subscriber writing through the test harness. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resview=debug")),
        )
        .with_test_writer()
        .try_init();
}
