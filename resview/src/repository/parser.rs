//! Parser contract consumed by leaf repositories.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::error::ParseError;
use crate::model::{LocationKey, ResourceNamespace, ResourceRecord};

/// Turns a source location into resource records.
///
/// Parsers run on worker threads and must check `cancel` at safe points
/// during long parses, returning [`ParseError::Cancelled`] when it fires.
pub trait ResourceParser: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Parse every resource under `location`.
    fn parse(
        &self,
        location: &LocationKey,
        namespace: &ResourceNamespace,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceRecord>, ParseError>;

    /// Parse one file inside `location`.
    ///
    /// Returns `None` when the parser cannot handle single files (or this
    /// particular path), in which case the caller falls back to a full
    /// [`parse`](Self::parse). A missing file parses to no records.
    fn parse_file(
        &self,
        _location: &LocationKey,
        _namespace: &ResourceNamespace,
        _file: &Path,
    ) -> Option<Result<Vec<ResourceRecord>, ParseError>> {
        None
    }

    /// Whether a change to `file` can affect parse results.
    fn is_relevant(&self, _file: &Path) -> bool {
        true
    }
}

/// Parser serving records from memory.
///
/// Backs synthetic repositories whose content is produced by code rather
/// than read from disk: callers [`set`](Self::set) the records for a location
/// and then rescan the repository.
#[derive(Debug, Default)]
pub struct StaticParser {
    records: RwLock<HashMap<LocationKey, Vec<ResourceRecord>>>,
}

impl StaticParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records served for `location`.
    pub fn set(&self, location: LocationKey, records: Vec<ResourceRecord>) {
        self.records.write().insert(location, records);
    }

    pub fn clear(&self, location: &LocationKey) {
        self.records.write().remove(location);
    }
}

impl ResourceParser for StaticParser {
    fn name(&self) -> &str {
        "static"
    }

    fn parse(
        &self,
        location: &LocationKey,
        _namespace: &ResourceNamespace,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceRecord>, ParseError> {
        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }
        Ok(self.records.read().get(location).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordOrigin, ResourceKey, ResourceType};

    #[test]
    fn test_static_parser_serves_records() {
        let parser = StaticParser::new();
        let location = LocationKey::new("/synthetic");
        let key = ResourceKey::res_auto(ResourceType::String, "generated");
        parser.set(
            location.clone(),
            vec![ResourceRecord::value(
                key,
                "value",
                RecordOrigin::new(location.clone(), None),
            )],
        );

        let records = parser
            .parse(&location, &ResourceNamespace::res_auto(), &CancellationToken::new())
            .unwrap();
        assert_eq!(records.len(), 1);

        parser.clear(&location);
        let records = parser
            .parse(&location, &ResourceNamespace::res_auto(), &CancellationToken::new())
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_static_parser_honours_cancellation() {
        let parser = StaticParser::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = parser.parse(
            &LocationKey::new("/synthetic"),
            &ResourceNamespace::res_auto(),
            &cancel,
        );
        assert!(matches!(result, Err(ParseError::Cancelled)));
    }
}
