//! File events.

use std::fmt;
use std::path::{Path, PathBuf};

/// A change observed on disk or reported by an editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileEvent {
    Created(PathBuf),
    Removed(PathBuf),
    Changed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Created(path) | FileEvent::Removed(path) | FileEvent::Changed(path) => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileEvent::Created(_) => "created",
            FileEvent::Removed(_) => "removed",
            FileEvent::Changed(_) => "changed",
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path().display())
    }
}
