//! Derived artifact errors.

use thiserror::Error;

/// Errors surfaced by [`DerivedArtifactCache::generate`](super::DerivedArtifactCache::generate).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactError {
    /// More than one live generator scope claims the key. Not retried.
    #[error("Derived key '{key}' is claimed by {} scopes: {}", scopes.len(), scopes.join(", "))]
    Collision { key: String, scopes: Vec<String> },

    #[error("Generator for '{key}' failed: {message}")]
    Generator { key: String, message: String },
}

impl ArtifactError {
    pub fn generator(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Generator {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Collision { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_message_names_scopes() {
        let err = ArtifactError::Collision {
            key: "com.example.R".to_string(),
            scopes: vec!["app".to_string(), "lib".to_string()],
        };
        assert!(err.is_collision());
        assert_eq!(
            err.to_string(),
            "Derived key 'com.example.R' is claimed by 2 scopes: app, lib"
        );
    }
}
