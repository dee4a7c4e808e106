//! Resource records.
//!
//! A [`ResourceRecord`] is one definition of a resource as produced by a
//! parser. Several records may share a [`ResourceKey`] (for example one per
//! locale); repositories keep all of them and consumers pick the best match
//! for their configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::key::ResourceKey;
use super::location::LocationKey;

/// Visibility of a resource outside its defining library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
    #[default]
    Undefined,
}

/// Whether a record is backed by a whole file or by a value inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// The file itself is the resource (`layout/main.xml`, `drawable/icon.png`).
    File,
    /// The resource is a value declared inside a values file.
    Value,
}

/// Payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceValue {
    /// Textual value declared in a values file.
    Text(String),
    /// Resource backed by a file.
    File(PathBuf),
}

impl ResourceValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResourceValue::Text(text) => Some(text),
            ResourceValue::File(_) => None,
        }
    }
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::Text(text) => f.write_str(text),
            ResourceValue::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordOrigin {
    /// The source location (repository) that produced the record.
    pub location: LocationKey,

    /// The file inside the location, when known.
    ///
    /// Used by incremental patching to drop a file's records before
    /// re-parsing it.
    pub file: Option<PathBuf>,
}

impl RecordOrigin {
    pub fn new(location: LocationKey, file: Option<PathBuf>) -> Self {
        Self { location, file }
    }

    /// Whether this record was produced from the given file.
    pub fn is_from_file(&self, file: &Path) -> bool {
        self.file.as_deref() == Some(file)
    }
}

/// One definition of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub key: ResourceKey,
    pub value: ResourceValue,
    pub visibility: Visibility,
    pub origin: RecordOrigin,

    /// Configuration qualifiers of the folder the record came from
    /// (e.g. `"en-rGB"`, `"land"`); empty for the default configuration.
    pub qualifiers: String,
}

impl ResourceRecord {
    /// Create a value-based record with the default configuration.
    pub fn value(key: ResourceKey, text: impl Into<String>, origin: RecordOrigin) -> Self {
        Self {
            key,
            value: ResourceValue::Text(text.into()),
            visibility: Visibility::Undefined,
            origin,
            qualifiers: String::new(),
        }
    }

    /// Create a file-based record with the default configuration.
    pub fn file(key: ResourceKey, path: impl Into<PathBuf>, origin: RecordOrigin) -> Self {
        Self {
            key,
            value: ResourceValue::File(path.into()),
            visibility: Visibility::Undefined,
            origin,
            qualifiers: String::new(),
        }
    }

    pub fn with_qualifiers(mut self, qualifiers: impl Into<String>) -> Self {
        self.qualifiers = qualifiers.into();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn kind(&self) -> RecordKind {
        match self.value {
            ResourceValue::Text(_) => RecordKind::Value,
            ResourceValue::File(_) => RecordKind::File,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceType;

    fn origin() -> RecordOrigin {
        RecordOrigin::new(LocationKey::new("/res"), Some(PathBuf::from("/res/values/strings.values")))
    }

    #[test]
    fn test_record_kind() {
        let key = ResourceKey::res_auto(ResourceType::String, "title");
        let value = ResourceRecord::value(key.clone(), "Title", origin());
        assert_eq!(value.kind(), RecordKind::Value);
        assert_eq!(value.value.as_text(), Some("Title"));

        let file = ResourceRecord::file(key, "/res/layout/main.xml", origin());
        assert_eq!(file.kind(), RecordKind::File);
        assert_eq!(file.value.as_text(), None);
    }

    #[test]
    fn test_origin_matches_file() {
        let origin = origin();
        assert!(origin.is_from_file(Path::new("/res/values/strings.values")));
        assert!(!origin.is_from_file(Path::new("/res/values/colors.values")));
    }

    #[test]
    fn test_builder_helpers() {
        let key = ResourceKey::res_auto(ResourceType::String, "title");
        let record = ResourceRecord::value(key, "Titre", origin())
            .with_qualifiers("fr")
            .with_visibility(Visibility::Public);
        assert_eq!(record.qualifiers, "fr");
        assert_eq!(record.visibility, Visibility::Public);
    }
}
