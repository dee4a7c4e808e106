//! Immutable resource snapshots.
//!
//! A [`ResourceSnapshot`] is the published state of one leaf repository.
//! Snapshots are never mutated after construction; a rescan or patch builds
//! a new one and swaps it in, so readers holding the old `Arc` keep a
//! consistent view.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::model::{LocationKey, ResourceKey, ResourceNamespace, ResourceRecord, ResourceType};

/// Immutable multimap of resource key to records.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    location: LocationKey,
    namespace: ResourceNamespace,
    generation: u64,
    records: BTreeMap<ResourceKey, Vec<Arc<ResourceRecord>>>,
}

impl ResourceSnapshot {
    /// An empty snapshot at generation 0.
    pub fn empty(location: LocationKey, namespace: ResourceNamespace) -> Self {
        Self {
            location,
            namespace,
            generation: 0,
            records: BTreeMap::new(),
        }
    }

    /// Build a snapshot from parsed records.
    ///
    /// Records keep their parse order within a key.
    pub fn from_records(
        location: LocationKey,
        namespace: ResourceNamespace,
        generation: u64,
        records: impl IntoIterator<Item = ResourceRecord>,
    ) -> Self {
        let mut map: BTreeMap<ResourceKey, Vec<Arc<ResourceRecord>>> = BTreeMap::new();
        for record in records {
            map.entry(record.key.clone())
                .or_default()
                .push(Arc::new(record));
        }
        Self {
            location,
            namespace,
            generation,
            records: map,
        }
    }

    pub fn location(&self) -> &LocationKey {
        &self.location
    }

    pub fn namespace(&self) -> &ResourceNamespace {
        &self.namespace
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    /// Number of records across all keys.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> &[Arc<ResourceRecord>] {
        self.records.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lookup(
        &self,
        namespace: &ResourceNamespace,
        ty: ResourceType,
        name: &str,
    ) -> Vec<Arc<ResourceRecord>> {
        let key = ResourceKey::new(namespace.clone(), ty, name);
        self.get(&key).to_vec()
    }

    pub fn types_present(&self, namespace: &ResourceNamespace) -> BTreeSet<ResourceType> {
        self.records
            .keys()
            .filter(|key| &key.namespace == namespace)
            .map(|key| key.ty)
            .collect()
    }

    pub fn namespaces_present(&self) -> BTreeSet<ResourceNamespace> {
        self.records.keys().map(|key| key.namespace.clone()).collect()
    }

    /// Iterate records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceRecord>> {
        self.records.values().flatten()
    }

    /// All records as owned values, e.g. for persisting.
    pub fn to_records(&self) -> Vec<ResourceRecord> {
        self.iter().map(|record| record.as_ref().clone()).collect()
    }

    /// Records produced from `file` or from anything below it.
    pub fn records_from(&self, file: &Path) -> Vec<Arc<ResourceRecord>> {
        self.iter()
            .filter(|record| originates_under(record, file))
            .cloned()
            .collect()
    }

    /// Build the successor snapshot with `file`'s records replaced.
    ///
    /// Records whose origin is `file` (or lies below it, for a removed
    /// directory) are dropped and `replacement` is appended.
    pub fn patched(
        &self,
        file: &Path,
        replacement: Vec<ResourceRecord>,
        generation: u64,
    ) -> Self {
        let mut records: BTreeMap<ResourceKey, Vec<Arc<ResourceRecord>>> = BTreeMap::new();
        for (key, list) in &self.records {
            let kept: Vec<_> = list
                .iter()
                .filter(|record| !originates_under(record, file))
                .cloned()
                .collect();
            if !kept.is_empty() {
                records.insert(key.clone(), kept);
            }
        }
        for record in replacement {
            records
                .entry(record.key.clone())
                .or_default()
                .push(Arc::new(record));
        }
        Self {
            location: self.location.clone(),
            namespace: self.namespace.clone(),
            generation,
            records,
        }
    }

    /// Return a copy carrying a different generation.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Whether two snapshots hold the same records, ignoring generation.
    pub fn same_content(&self, other: &ResourceSnapshot) -> bool {
        if self.records.len() != other.records.len() {
            return false;
        }
        self.records.iter().zip(other.records.iter()).all(|((ka, va), (kb, vb))| {
            ka == kb
                && va.len() == vb.len()
                && va.iter().zip(vb.iter()).all(|(a, b)| a.as_ref() == b.as_ref())
        })
    }
}

fn originates_under(record: &ResourceRecord, file: &Path) -> bool {
    record
        .origin
        .file
        .as_deref()
        .is_some_and(|origin| origin.starts_with(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordOrigin;
    use std::path::PathBuf;

    fn record(ty: ResourceType, name: &str, value: &str, file: &str) -> ResourceRecord {
        ResourceRecord::value(
            ResourceKey::res_auto(ty, name),
            value,
            RecordOrigin::new(LocationKey::new("/res"), Some(PathBuf::from(file))),
        )
    }

    fn snapshot(records: Vec<ResourceRecord>) -> ResourceSnapshot {
        ResourceSnapshot::from_records(
            LocationKey::new("/res"),
            ResourceNamespace::res_auto(),
            1,
            records,
        )
    }

    #[test]
    fn test_lookup_keeps_all_variants() {
        let snap = snapshot(vec![
            record(ResourceType::String, "title", "Title", "/res/values/a.values"),
            record(ResourceType::String, "title", "Titre", "/res/values-fr/a.values"),
        ]);
        let found = snap.lookup(&ResourceNamespace::res_auto(), ResourceType::String, "title");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value.as_text(), Some("Title"));
        assert_eq!(found[1].value.as_text(), Some("Titre"));
        assert_eq!(snap.key_count(), 1);
        assert_eq!(snap.record_count(), 2);
    }

    #[test]
    fn test_unknown_namespace_is_empty() {
        let snap = snapshot(vec![record(
            ResourceType::Color,
            "accent",
            "#fff",
            "/res/values/c.values",
        )]);
        let other = ResourceNamespace::from_package("com.other");
        assert!(snap.lookup(&other, ResourceType::Color, "accent").is_empty());
        assert!(snap.types_present(&other).is_empty());
    }

    #[test]
    fn test_types_and_namespaces() {
        let snap = snapshot(vec![
            record(ResourceType::Color, "a", "#000", "/res/values/c.values"),
            record(ResourceType::String, "b", "B", "/res/values/s.values"),
        ]);
        let types = snap.types_present(&ResourceNamespace::res_auto());
        assert!(types.contains(&ResourceType::Color));
        assert!(types.contains(&ResourceType::String));
        assert_eq!(snap.namespaces_present().len(), 1);
    }

    #[test]
    fn test_patched_replaces_file_records() {
        let snap = snapshot(vec![
            record(ResourceType::String, "a", "A", "/res/values/s.values"),
            record(ResourceType::String, "b", "B", "/res/values/s.values"),
            record(ResourceType::Color, "c", "#000", "/res/values/c.values"),
        ]);
        let patched = snap.patched(
            Path::new("/res/values/s.values"),
            vec![record(ResourceType::String, "a", "A2", "/res/values/s.values")],
            2,
        );

        assert_eq!(patched.generation(), 2);
        let ns = ResourceNamespace::res_auto();
        assert_eq!(
            patched.lookup(&ns, ResourceType::String, "a")[0].value.as_text(),
            Some("A2")
        );
        assert!(patched.lookup(&ns, ResourceType::String, "b").is_empty());
        assert_eq!(patched.lookup(&ns, ResourceType::Color, "c").len(), 1);
    }

    #[test]
    fn test_patched_removes_directory_contents() {
        let snap = snapshot(vec![
            record(ResourceType::String, "a", "A", "/res/values-fr/s.values"),
            record(ResourceType::String, "a", "A", "/res/values/s.values"),
        ]);
        let patched = snap.patched(Path::new("/res/values-fr"), Vec::new(), 2);
        assert_eq!(patched.record_count(), 1);
    }

    #[test]
    fn test_same_content_ignores_generation() {
        let records = vec![record(ResourceType::String, "a", "A", "/res/values/s.values")];
        let a = snapshot(records.clone());
        let b = snapshot(records).with_generation(9);
        assert!(a.same_content(&b));

        let c = snapshot(vec![record(ResourceType::String, "a", "B", "/res/values/s.values")]);
        assert!(!a.same_content(&c));
    }
}
