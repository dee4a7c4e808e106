//! Shadowing merge over child repositories.
//!
//! A [`CompositeRepository`] presents an ordered list of children as one
//! repository. Children live in three buckets with fixed precedence:
//!
//! ```text
//!   lookup(ns, type, name)
//!        │
//!        ▼
//!   ┌──────────┐   ┌──────────────────┐   ┌──────────────┐
//!   │ primary  │ → │ library (in      │ → │ synthetic    │
//!   │ sources  │   │ dependency order)│   │ providers    │
//!   └──────────┘   └──────────────────┘   └──────────────┘
//!        first child with any record for the key wins
//! ```
//!
//! Lookups shadow rather than merge: the first child holding the key
//! contributes all of its records for that key and later children are not
//! consulted. [`types_present`](ResourceRepository::types_present) and
//! [`namespaces_present`](ResourceRepository::namespaces_present) are unions.
//!
//! # Concurrency
//!
//! The child list is an immutable `Arc<ChildList>` swapped under a single
//! structural lock. Readers clone the `Arc` at the start of a query, so a
//! query sees either the old or the new list, never a mix.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::RepositoryError;
use super::generation::DerivedGeneration;
use super::links::ParentLinks;
use super::traits::{Records, RepositoryId, ResourceRepository, VisitResult};
use crate::diagnostics::FailureLog;
use crate::model::{ResourceNamespace, ResourceRecord, ResourceType};

/// Shared handle to any repository.
pub type RepositoryRef = Arc<dyn ResourceRepository>;

/// Precedence class of a composite child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// The module's own sources.
    Primary,
    /// Dependencies, in dependency order.
    Library,
    /// Code-generated providers.
    Synthetic,
}

impl Bucket {
    /// Query order.
    pub const ORDER: [Bucket; 3] = [Bucket::Primary, Bucket::Library, Bucket::Synthetic];

    fn slot(self) -> usize {
        match self {
            Bucket::Primary => 0,
            Bucket::Library => 1,
            Bucket::Synthetic => 2,
        }
    }
}

/// Immutable child list and the generation offset that goes with it.
#[derive(Default, Clone)]
struct ChildList {
    buckets: [Vec<RepositoryRef>; 3],
    offset: u64,
}

impl ChildList {
    fn iter(&self) -> impl Iterator<Item = &RepositoryRef> {
        self.buckets.iter().flatten()
    }

    fn generation_sum(&self) -> u64 {
        self.iter()
            .fold(0u64, |sum, child| sum.wrapping_add(child.generation()))
    }

    /// Identity of the list: children and their order.
    fn layout(&self) -> Vec<(usize, RepositoryId)> {
        self.buckets
            .iter()
            .enumerate()
            .flat_map(|(slot, children)| children.iter().map(move |c| (slot, c.id())))
            .collect()
    }

    fn contains(&self, id: RepositoryId) -> bool {
        self.iter().any(|c| c.id() == id)
    }
}

/// Ordered, bucketed merge of child repositories.
pub struct CompositeRepository {
    id: RepositoryId,
    name: String,
    this: Weak<CompositeRepository>,
    children: RwLock<Arc<ChildList>>,
    structure: Mutex<()>,
    generation: DerivedGeneration,
    links: ParentLinks,
    failures: FailureLog,
    disposed: AtomicBool,
}

impl CompositeRepository {
    /// Create an empty composite.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            id: RepositoryId::next(),
            name,
            this: this.clone(),
            children: RwLock::new(Arc::new(ChildList::default())),
            structure: Mutex::new(()),
            generation: DerivedGeneration::new(),
            links: ParentLinks::new(),
            failures: FailureLog::default(),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Children of one bucket, in order.
    pub fn children(&self, bucket: Bucket) -> Vec<RepositoryRef> {
        self.children.read().buckets[bucket.slot()].clone()
    }

    /// All children in query order.
    pub fn all_children(&self) -> Vec<RepositoryRef> {
        self.children.read().iter().cloned().collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().iter().count()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Structural changes
    // =========================================================================

    /// Replace every bucket at once.
    pub fn set_children(
        &self,
        primary: Vec<RepositoryRef>,
        library: Vec<RepositoryRef>,
        synthetic: Vec<RepositoryRef>,
    ) {
        self.restructure(|_| ChildList {
            buckets: [primary, library, synthetic],
            offset: 0,
        });
    }

    /// Replace the children of one bucket.
    pub fn set_bucket(&self, bucket: Bucket, children: Vec<RepositoryRef>) {
        self.restructure(|current| {
            let mut next = current.clone();
            next.buckets[bucket.slot()] = children;
            next
        });
    }

    /// Append a child to a bucket.
    ///
    /// A child already present anywhere in this composite is left where it
    /// is.
    pub fn add_child(&self, bucket: Bucket, child: RepositoryRef) {
        self.restructure(|current| {
            let mut next = current.clone();
            if !current.contains(child.id()) {
                next.buckets[bucket.slot()].push(child);
            }
            next
        });
    }

    /// Remove a child wherever it is. Returns whether it was present.
    pub fn remove_child(&self, id: RepositoryId) -> bool {
        let mut removed = false;
        self.restructure(|current| {
            let mut next = current.clone();
            for bucket in next.buckets.iter_mut() {
                let before = bucket.len();
                bucket.retain(|c| c.id() != id);
                removed |= bucket.len() != before;
            }
            next
        });
        removed
    }

    fn restructure(&self, build: impl FnOnce(&ChildList) -> ChildList) {
        let _guard = self.structure.lock();
        if self.is_disposed() {
            warn!(composite = %self.name, "Ignoring structural change on disposed composite");
            return;
        }

        let current = self.children.read().clone();
        let mut next = build(&current);

        // A composite never contains itself
        for bucket in next.buckets.iter_mut() {
            bucket.retain(|c| c.id() != self.id);
        }

        if next.layout() == current.layout() {
            return;
        }

        for child in next.iter() {
            if !current.contains(child.id()) {
                child.parent_links().attach(self.id, self.this.clone());
            }
        }
        for child in current.iter() {
            if !next.contains(child.id()) {
                child.parent_links().detach(self.id);
            }
        }

        let generation = self.publish(&current, next);

        debug!(
            composite = %self.name,
            children = self.child_count(),
            generation,
            "Composite children changed"
        );
    }

    /// Swap in `next` with an offset one past every generation observed so
    /// far. Callers hold the structure lock.
    fn publish(&self, current: &ChildList, mut next: ChildList) -> u64 {
        let observed = self
            .generation
            .observe(current.offset, current.generation_sum());
        let (offset, generation) = self.generation.rebase(observed, next.generation_sum());
        next.offset = offset;
        *self.children.write() = Arc::new(next);
        generation
    }

    /// A child dropped its content; move the generation forward.
    pub fn child_reset(&self, child: RepositoryId) {
        let _guard = self.structure.lock();
        let current = self.children.read().clone();
        let generation = self.publish(&current, (*current).clone());
        debug!(composite = %self.name, child = %child, generation, "Child repository reset");
    }

    /// Release this composite's links to its children.
    ///
    /// Children are not disposed; they may be shared with other composites
    /// or still cached by the registry.
    pub fn dispose(&self) {
        let _guard = self.structure.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let current = self.children.read().clone();
        for child in current.iter() {
            child.parent_links().detach(self.id);
        }
        self.publish(&current, ChildList::default());
        debug!(composite = %self.name, released = current.iter().count(), "Disposed composite");
    }

    fn record_failure(&self, child: &RepositoryRef, err: &RepositoryError) {
        if err.is_cancelled() {
            return;
        }
        self.failures.record(
            &child.display_name(),
            "Child repository failed; contributing no resources",
            err,
        );
    }
}

impl std::fmt::Debug for CompositeRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeRepository")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("children", &self.child_count())
            .finish()
    }
}

impl ResourceRepository for CompositeRepository {
    fn id(&self) -> RepositoryId {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn generation(&self) -> u64 {
        let children = self.children.read().clone();
        self.generation
            .observe(children.offset, children.generation_sum())
    }

    fn lookup(
        &self,
        namespace: &ResourceNamespace,
        ty: ResourceType,
        name: &str,
    ) -> Result<Records, RepositoryError> {
        let children = self.children.read().clone();
        for child in children.iter() {
            match child.lookup(namespace, ty, name) {
                Ok(records) if !records.is_empty() => return Ok(records),
                Ok(_) => {}
                Err(e) => self.record_failure(child, &e),
            }
        }
        Ok(Vec::new())
    }

    fn types_present(
        &self,
        namespace: &ResourceNamespace,
    ) -> Result<BTreeSet<ResourceType>, RepositoryError> {
        let children = self.children.read().clone();
        let mut types = BTreeSet::new();
        for child in children.iter() {
            match child.types_present(namespace) {
                Ok(found) => types.extend(found),
                Err(e) => self.record_failure(child, &e),
            }
        }
        Ok(types)
    }

    fn namespaces_present(&self) -> Result<BTreeSet<ResourceNamespace>, RepositoryError> {
        let children = self.children.read().clone();
        let mut namespaces = BTreeSet::new();
        for child in children.iter() {
            match child.namespaces_present() {
                Ok(found) => namespaces.extend(found),
                Err(e) => self.record_failure(child, &e),
            }
        }
        Ok(namespaces)
    }

    fn visit(
        &self,
        visitor: &mut dyn FnMut(&Arc<ResourceRecord>) -> VisitResult,
    ) -> Result<VisitResult, RepositoryError> {
        let children = self.children.read().clone();
        for child in children.iter() {
            match child.visit(visitor) {
                Ok(VisitResult::Abort) => return Ok(VisitResult::Abort),
                Ok(VisitResult::Continue) => {}
                Err(e) => self.record_failure(child, &e),
            }
        }
        Ok(VisitResult::Continue)
    }

    fn parent_links(&self) -> &ParentLinks {
        &self.links
    }
}

impl Drop for CompositeRepository {
    fn drop(&mut self) {
        let children = self.children.get_mut().clone();
        for child in children.iter() {
            child.parent_links().detach(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocationKey, RecordOrigin, RegistryKey, ResourceKey, ResourceValue};
    use crate::repository::{Generations, SourceRepository, StaticParser};
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        parser: Arc<StaticParser>,
        generations: Arc<Generations>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                parser: Arc::new(StaticParser::new()),
                generations: Arc::new(Generations::new()),
            }
        }

        fn leaf(&self, location: &str, strings: &[(&str, &str)]) -> Arc<SourceRepository> {
            let location_key = LocationKey::new(location);
            let records = strings
                .iter()
                .map(|(name, value)| {
                    ResourceRecord::value(
                        ResourceKey::res_auto(ResourceType::String, *name),
                        *value,
                        RecordOrigin::new(location_key.clone(), None),
                    )
                })
                .collect();
            self.parser.set(location_key, records);
            let repo = Arc::new(SourceRepository::new(
                RegistryKey::flat(location),
                self.parser.clone(),
                self.generations.clone(),
            ));
            repo.scan(&CancellationToken::new()).unwrap();
            repo
        }
    }

    fn text(records: &Records) -> Vec<String> {
        records
            .iter()
            .map(|r| match &r.value {
                ResourceValue::Text(t) => t.clone(),
                ResourceValue::File(p) => p.display().to_string(),
            })
            .collect()
    }

    struct BrokenRepository {
        links: ParentLinks,
        id: RepositoryId,
    }

    impl ResourceRepository for BrokenRepository {
        fn id(&self) -> RepositoryId {
            self.id
        }
        fn display_name(&self) -> String {
            "broken".to_string()
        }
        fn generation(&self) -> u64 {
            0
        }
        fn lookup(
            &self,
            _: &ResourceNamespace,
            _: ResourceType,
            _: &str,
        ) -> Result<Records, RepositoryError> {
            Err(RepositoryError::source(&LocationKey::new("/broken"), "unreadable"))
        }
        fn types_present(
            &self,
            _: &ResourceNamespace,
        ) -> Result<BTreeSet<ResourceType>, RepositoryError> {
            Err(RepositoryError::source(&LocationKey::new("/broken"), "unreadable"))
        }
        fn namespaces_present(&self) -> Result<BTreeSet<ResourceNamespace>, RepositoryError> {
            Err(RepositoryError::source(&LocationKey::new("/broken"), "unreadable"))
        }
        fn visit(
            &self,
            _: &mut dyn FnMut(&Arc<ResourceRecord>) -> VisitResult,
        ) -> Result<VisitResult, RepositoryError> {
            Err(RepositoryError::source(&LocationKey::new("/broken"), "unreadable"))
        }
        fn parent_links(&self) -> &ParentLinks {
            &self.links
        }
    }

    #[test]
    fn test_first_child_shadows_later_children() {
        let fx = Fixture::new();
        let app = fx.leaf("/app", &[("title", "App")]);
        let lib = fx.leaf("/lib", &[("title", "Lib"), ("only_lib", "L")]);

        let composite = CompositeRepository::new("app");
        composite.set_children(vec![app], vec![lib], vec![]);

        let ns = ResourceNamespace::res_auto();
        let title = composite.lookup(&ns, ResourceType::String, "title").unwrap();
        assert_eq!(text(&title), vec!["App"]);

        let only_lib = composite.lookup(&ns, ResourceType::String, "only_lib").unwrap();
        assert_eq!(text(&only_lib), vec!["L"]);
    }

    #[test]
    fn test_bucket_precedence_beats_insertion_order() {
        let fx = Fixture::new();
        let synthetic = fx.leaf("/gen", &[("k", "synthetic")]);
        let library = fx.leaf("/lib", &[("k", "library")]);

        let composite = CompositeRepository::new("app");
        composite.add_child(Bucket::Synthetic, synthetic);
        composite.add_child(Bucket::Library, library);

        let found = composite
            .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "k")
            .unwrap();
        assert_eq!(text(&found), vec!["library"]);
    }

    #[test]
    fn test_empty_composite_is_empty_repository() {
        let composite = CompositeRepository::new("empty");
        let ns = ResourceNamespace::res_auto();
        assert!(composite.lookup(&ns, ResourceType::String, "x").unwrap().is_empty());
        assert!(composite.types_present(&ns).unwrap().is_empty());
        assert!(composite.namespaces_present().unwrap().is_empty());
        assert_eq!(composite.visit(&mut |_| VisitResult::Continue).unwrap(), VisitResult::Continue);
    }

    #[test]
    fn test_failing_child_contributes_nothing() {
        let fx = Fixture::new();
        let broken: RepositoryRef = Arc::new(BrokenRepository {
            links: ParentLinks::new(),
            id: RepositoryId::next(),
        });
        let lib = fx.leaf("/lib", &[("title", "Lib")]);

        let composite = CompositeRepository::new("app");
        composite.set_children(vec![broken], vec![lib], vec![]);

        let ns = ResourceNamespace::res_auto();
        let found = composite.lookup(&ns, ResourceType::String, "title").unwrap();
        assert_eq!(text(&found), vec!["Lib"]);
        assert_eq!(composite.namespaces_present().unwrap().len(), 1);
    }

    #[test]
    fn test_reorder_bumps_generation() {
        let fx = Fixture::new();
        let a = fx.leaf("/a", &[("k", "a")]);
        let b = fx.leaf("/b", &[("k", "b")]);

        let composite = CompositeRepository::new("app");
        composite.set_children(vec![], vec![a.clone(), b.clone()], vec![]);
        let before = composite.generation();

        composite.set_bucket(Bucket::Library, vec![b, a]);
        assert!(composite.generation() > before);

        let found = composite
            .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "k")
            .unwrap();
        assert_eq!(text(&found), vec!["b"]);
    }

    #[test]
    fn test_generation_monotonic_across_removal() {
        let fx = Fixture::new();
        let a = fx.leaf("/a", &[("k", "a")]);
        let b = fx.leaf("/b", &[("k", "b")]);

        let composite = CompositeRepository::new("app");
        composite.set_children(vec![a.clone(), b.clone()], vec![], vec![]);
        let mut last = composite.generation();

        assert!(composite.remove_child(b.id()));
        assert!(composite.generation() > last);
        last = composite.generation();

        fx.parser.set(LocationKey::new("/a"), vec![]);
        a.scan(&CancellationToken::new()).unwrap();
        assert!(composite.generation() > last);
    }

    #[test]
    fn test_noop_change_keeps_generation() {
        let fx = Fixture::new();
        let a = fx.leaf("/a", &[("k", "a")]);
        let composite = CompositeRepository::new("app");
        composite.add_child(Bucket::Primary, a.clone());
        let before = composite.generation();
        composite.add_child(Bucket::Primary, a);
        assert_eq!(composite.generation(), before);
        assert_eq!(composite.child_count(), 1);
    }

    #[test]
    fn test_shared_child_survives_parent_disposal() {
        let fx = Fixture::new();
        let lib = fx.leaf("/lib", &[("k", "v")]);

        let first = CompositeRepository::new("first");
        let second = CompositeRepository::new("second");
        first.add_child(Bucket::Library, lib.clone());
        second.add_child(Bucket::Library, lib.clone());
        assert_eq!(lib.parent_links().count(), 2);

        first.dispose();
        assert!(first.is_disposed());
        assert_eq!(first.child_count(), 0);
        assert_eq!(lib.parent_links().count(), 1);

        let found = second
            .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "k")
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_dropped_parent_disappears_from_links() {
        let fx = Fixture::new();
        let lib = fx.leaf("/lib", &[("k", "v")]);
        {
            let parent = CompositeRepository::new("temp");
            parent.add_child(Bucket::Library, lib.clone());
            assert_eq!(lib.parent_links().count(), 1);
        }
        assert_eq!(lib.parent_links().count(), 0);
    }

    #[test]
    fn test_leaf_reset_bumps_parent() {
        let fx = Fixture::new();
        let lib = fx.leaf("/lib", &[("k", "v")]);
        let parent = CompositeRepository::new("app");
        parent.add_child(Bucket::Library, lib.clone());
        let before = parent.generation();

        lib.reset();
        assert!(parent.generation() > before);
        assert!(parent
            .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "k")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_nested_composites() {
        let fx = Fixture::new();
        let lib = fx.leaf("/lib", &[("k", "lib")]);
        let inner = CompositeRepository::new("inner");
        inner.add_child(Bucket::Library, lib);

        let outer = CompositeRepository::new("outer");
        outer.add_child(Bucket::Primary, inner.clone());
        // Self-insertion is ignored
        outer.add_child(Bucket::Primary, outer.clone());

        assert_eq!(outer.child_count(), 1);
        let found = outer
            .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "k")
            .unwrap();
        assert_eq!(text(&found), vec!["lib"]);
        assert_eq!(inner.parent_links().count(), 1);
    }

    #[test]
    fn test_visit_abort_stops_across_children() {
        let fx = Fixture::new();
        let a = fx.leaf("/a", &[("x", "1"), ("y", "2")]);
        let b = fx.leaf("/b", &[("z", "3")]);
        let composite = CompositeRepository::new("app");
        composite.set_children(vec![a], vec![b], vec![]);

        let mut count = 0;
        let result = composite
            .visit(&mut |_| {
                count += 1;
                VisitResult::Abort
            })
            .unwrap();
        assert_eq!(result, VisitResult::Abort);
        assert_eq!(count, 1);

        let mut all = 0;
        composite
            .visit(&mut |_| {
                all += 1;
                VisitResult::Continue
            })
            .unwrap();
        assert_eq!(all, 3);
    }
}
