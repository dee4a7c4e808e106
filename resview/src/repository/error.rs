//! Repository error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::LocationKey;

/// Errors surfaced by repository reads and scans.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// A single source failed to parse or scan.
    ///
    /// The source contributes no resources; siblings are unaffected.
    #[error("Failed to read resources from {location}: {message}")]
    Source { location: String, message: String },

    /// An internal invariant was violated, such as a cached repository whose
    /// identity does not match the key it was cached under.
    #[error("Cache consistency violation: expected {expected}, found {actual}")]
    Consistency { expected: String, actual: String },

    /// The operation observed a cancellation request and left state unchanged.
    #[error("Operation cancelled")]
    Cancelled,
}

impl RepositoryError {
    pub fn source(location: &LocationKey, message: impl Into<String>) -> Self {
        RepositoryError::Source {
            location: location.to_string(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RepositoryError::Cancelled)
    }
}

/// Errors reported by a [`ResourceParser`](super::ResourceParser).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Parse cancelled")]
    Cancelled,
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.into(),
            source,
        }
    }

    /// Convert into a repository error attributed to `location`.
    pub fn into_repository_error(self, location: &LocationKey) -> RepositoryError {
        match self {
            ParseError::Cancelled => RepositoryError::Cancelled,
            other => RepositoryError::source(location, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cancel_maps_to_cancelled() {
        let location = LocationKey::new("/res");
        let err = ParseError::Cancelled.into_repository_error(&location);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_parse_syntax_maps_to_source_error() {
        let location = LocationKey::new("/res");
        let err = ParseError::Syntax {
            path: PathBuf::from("/res/values/a.values"),
            line: 3,
            message: "missing '='".to_string(),
        }
        .into_repository_error(&location);

        match err {
            RepositoryError::Source { location, message } => {
                assert_eq!(location, "/res");
                assert!(message.contains(":3:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
