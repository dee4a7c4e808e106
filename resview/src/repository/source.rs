//! Leaf repositories backed by a single source location.
//!
//! A [`SourceRepository`] publishes an immutable [`ResourceSnapshot`] that is
//! swapped atomically on every successful rescan or patch. Readers clone the
//! current `Arc` and never block on a scan in progress.
//!
//! ```text
//!   scan / patch_file ──parse──► candidate snapshot
//!                                     │ cancelled? → drop, keep current
//!                                     │ same content? → keep current
//!                                     ▼
//!                          swap + new generation
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{ParseError, RepositoryError};
use super::generation::Generations;
use super::links::ParentLinks;
use super::parser::ResourceParser;
use super::snapshot::ResourceSnapshot;
use super::traits::{Records, RepositoryId, ResourceRepository, VisitResult};
use crate::diagnostics::FailureLog;
use crate::model::{
    LocationKey, RegistryKey, ResourceNamespace, ResourceRecord, ResourceType,
};

/// Leaf repository over one location.
pub struct SourceRepository {
    id: RepositoryId,
    key: RegistryKey,
    namespace: ResourceNamespace,
    parser: Arc<dyn ResourceParser>,
    generations: Arc<Generations>,
    failures: Arc<FailureLog>,
    snapshot: RwLock<Arc<ResourceSnapshot>>,
    /// Serializes read-modify-write of the snapshot.
    publish_lock: Mutex<()>,
    pending: Mutex<HashSet<PathBuf>>,
    links: ParentLinks,
}

impl SourceRepository {
    /// Create an empty repository. Call [`scan`](Self::scan) to populate it.
    pub fn new(
        key: RegistryKey,
        parser: Arc<dyn ResourceParser>,
        generations: Arc<Generations>,
    ) -> Self {
        let namespace = key.namespacing.namespace();
        let empty = ResourceSnapshot::empty(key.location.clone(), namespace.clone());
        Self {
            id: RepositoryId::next(),
            key,
            namespace,
            parser,
            generations,
            failures: Arc::new(FailureLog::default()),
            snapshot: RwLock::new(Arc::new(empty)),
            publish_lock: Mutex::new(()),
            pending: Mutex::new(HashSet::new()),
            links: ParentLinks::new(),
        }
    }

    /// Share a failure log with other repositories.
    pub fn with_failure_log(mut self, failures: Arc<FailureLog>) -> Self {
        self.failures = failures;
        self
    }

    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    pub fn location(&self) -> &LocationKey {
        &self.key.location
    }

    pub fn namespace(&self) -> &ResourceNamespace {
        &self.namespace
    }

    pub fn parser(&self) -> &Arc<dyn ResourceParser> {
        &self.parser
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<ResourceSnapshot> {
        self.snapshot.read().clone()
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Re-parse the whole location and publish the result.
    ///
    /// Returns whether the published content changed. On a parse failure the
    /// repository publishes an empty snapshot and returns the error; on
    /// cancellation the current snapshot is kept.
    pub fn scan(&self, cancel: &CancellationToken) -> Result<bool, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let parsed = self.parser.parse(&self.key.location, &self.namespace, cancel);
        match parsed {
            Ok(records) => {
                if cancel.is_cancelled() {
                    debug!(location = %self.key.location, "Scan cancelled before publish");
                    return Err(RepositoryError::Cancelled);
                }
                self.failures.clear(&self.failure_key());
                Ok(self.publish(records))
            }
            Err(ParseError::Cancelled) => {
                debug!(location = %self.key.location, "Scan cancelled");
                Err(RepositoryError::Cancelled)
            }
            Err(e) => {
                let err = e.into_repository_error(&self.key.location);
                self.failures.record(
                    &self.failure_key(),
                    "Resource source failed to parse; contributing no resources",
                    &err,
                );
                self.publish(Vec::new());
                Err(err)
            }
        }
    }

    /// Publish a full set of records.
    ///
    /// The generation is bumped only when the content differs from the
    /// current snapshot. Returns whether it did.
    pub fn publish(&self, records: Vec<ResourceRecord>) -> bool {
        let _guard = self.publish_lock.lock();
        let current = self.snapshot();
        let candidate = ResourceSnapshot::from_records(
            self.key.location.clone(),
            self.namespace.clone(),
            current.generation(),
            records,
        );
        if candidate.same_content(&current) && current.generation() != 0 {
            return false;
        }
        self.swap(candidate)
    }

    /// Re-parse a single file and patch its records into the snapshot.
    ///
    /// Falls back to a full [`scan`](Self::scan) when the parser cannot
    /// handle the file on its own.
    pub fn patch_file(&self, file: &Path, cancel: &CancellationToken) -> Result<bool, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let Some(parsed) = self
            .parser
            .parse_file(&self.key.location, &self.namespace, file)
        else {
            debug!(location = %self.key.location, file = %file.display(), "Single-file parse unsupported; rescanning");
            return self.scan(cancel);
        };

        let (records, failure) = match parsed {
            Ok(records) => (records, None),
            Err(ParseError::Cancelled) => return Err(RepositoryError::Cancelled),
            Err(e) => (Vec::new(), Some(e.into_repository_error(&self.key.location))),
        };

        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let changed = {
            let _guard = self.publish_lock.lock();
            let current = self.snapshot();
            let candidate = current.patched(file, records, current.generation());
            if candidate.same_content(&current) {
                false
            } else {
                self.swap(candidate)
            }
        };

        match failure {
            Some(err) => {
                self.failures.record(
                    &file.display().to_string(),
                    "Resource file failed to parse; contributing no resources",
                    &err,
                );
                Err(err)
            }
            None => {
                self.failures.clear(&file.display().to_string());
                Ok(changed)
            }
        }
    }

    fn swap(&self, candidate: ResourceSnapshot) -> bool {
        let generation = self.generations.next();
        let snapshot = Arc::new(candidate.with_generation(generation));
        debug!(
            location = %self.key.location,
            generation,
            records = snapshot.record_count(),
            "Published snapshot"
        );
        *self.snapshot.write() = snapshot;
        true
    }

    fn failure_key(&self) -> String {
        self.key.location.to_string()
    }

    // =========================================================================
    // Pending scans
    // =========================================================================

    /// Mark `file` as needing a rescan.
    ///
    /// Returns false if a rescan of the same file is already pending, in
    /// which case the caller should not enqueue another one.
    pub fn schedule_rescan(&self, file: impl Into<PathBuf>) -> bool {
        self.pending.lock().insert(file.into())
    }

    pub fn is_scan_pending(&self, file: &Path) -> bool {
        self.pending.lock().contains(file)
    }

    /// Claim a pending rescan. Returns false if it was already handled,
    /// e.g. by [`sync`](Self::sync).
    pub fn take_pending(&self, file: &Path) -> bool {
        self.pending.lock().remove(file)
    }

    pub fn pending_scans(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = self.pending.lock().iter().cloned().collect();
        files.sort();
        files
    }

    /// Run every pending rescan now, on the calling thread.
    ///
    /// Returns the number of files patched. Failures of individual files are
    /// logged and do not stop the remaining ones.
    pub fn sync(&self, cancel: &CancellationToken) -> Result<usize, RepositoryError> {
        let files: Vec<PathBuf> = self.pending.lock().drain().collect();
        let mut patched = 0;
        for file in files {
            match self.patch_file(&file, cancel) {
                Ok(_) => patched += 1,
                Err(RepositoryError::Cancelled) => return Err(RepositoryError::Cancelled),
                Err(_) => {}
            }
        }
        Ok(patched)
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Drop all content and tell parent composites.
    ///
    /// Used when the registry forgets this repository while composites may
    /// still hold it.
    pub fn reset(&self) {
        self.pending.lock().clear();
        {
            let _guard = self.publish_lock.lock();
            let empty =
                ResourceSnapshot::empty(self.key.location.clone(), self.namespace.clone());
            self.swap(empty);
        }
        let parents = self.links.parents();
        info!(
            location = %self.key.location,
            parents = parents.len(),
            "Reset resource repository"
        );
        for parent in parents {
            parent.child_reset(self.id);
        }
    }
}

impl std::fmt::Debug for SourceRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRepository")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("parser", &self.parser.name())
            .field("generation", &self.generation())
            .finish()
    }
}

impl ResourceRepository for SourceRepository {
    fn id(&self) -> RepositoryId {
        self.id
    }

    fn display_name(&self) -> String {
        self.key.to_string()
    }

    fn generation(&self) -> u64 {
        self.snapshot.read().generation()
    }

    fn lookup(
        &self,
        namespace: &ResourceNamespace,
        ty: ResourceType,
        name: &str,
    ) -> Result<Records, RepositoryError> {
        Ok(self.snapshot().lookup(namespace, ty, name))
    }

    fn types_present(
        &self,
        namespace: &ResourceNamespace,
    ) -> Result<BTreeSet<ResourceType>, RepositoryError> {
        Ok(self.snapshot().types_present(namespace))
    }

    fn namespaces_present(&self) -> Result<BTreeSet<ResourceNamespace>, RepositoryError> {
        Ok(self.snapshot().namespaces_present())
    }

    fn visit(
        &self,
        visitor: &mut dyn FnMut(&Arc<ResourceRecord>) -> VisitResult,
    ) -> Result<VisitResult, RepositoryError> {
        let snapshot = self.snapshot();
        for record in snapshot.iter() {
            if visitor(record) == VisitResult::Abort {
                return Ok(VisitResult::Abort);
            }
        }
        Ok(VisitResult::Continue)
    }

    fn parent_links(&self) -> &ParentLinks {
        &self.links
    }
}
