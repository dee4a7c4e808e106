//! Process-wide cache of leaf repositories.
//!
//! The registry maps a [`RegistryKey`] (location × namespacing mode) to its
//! [`SourceRepository`]. Construction runs the slow scan outside any shared
//! lock; concurrent `get` calls for the same key wait for one construction
//! and share its result, while other keys proceed independently.
//!
//! ```text
//!   get(key) ──► moka cache ──hit──► consistency check ──► repo
//!                   │ miss
//!                   ▼
//!          try_get_with (single flight)
//!                   │
//!        snapshot store? ──valid──► restore
//!                   │ missing / stale / corrupt
//!                   ▼
//!               full scan ──► save to store
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stats::{RegistryStats, RegistryStatsSnapshot};
use super::store::SnapshotStore;
use crate::diagnostics::FailureLog;
use crate::model::{LocationKey, RegistryKey};
use crate::repository::{
    Generations, RepositoryError, ResourceParser, ResourceRepository, SourceRepository,
};

/// Default bound on cached repositories.
pub const DEFAULT_MAX_ENTRIES: u64 = 1024;

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of cached repositories; least recently used entries
    /// are evicted beyond this.
    pub max_entries: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Cache of leaf repositories keyed by location and namespacing mode.
pub struct RepositoryRegistry {
    cache: Cache<RegistryKey, Arc<SourceRepository>>,
    parser: Arc<dyn ResourceParser>,
    generations: Arc<Generations>,
    failures: Arc<FailureLog>,
    store: Option<Arc<dyn SnapshotStore>>,
    stats: Arc<RegistryStats>,
    cancel: CancellationToken,
}

impl RepositoryRegistry {
    pub fn new(
        config: RegistryConfig,
        parser: Arc<dyn ResourceParser>,
        generations: Arc<Generations>,
    ) -> Self {
        let stats = Arc::new(RegistryStats::new());
        let listener_stats = Arc::clone(&stats);
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .eviction_listener(move |key: Arc<RegistryKey>, _repo, cause| {
                if cause != RemovalCause::Replaced {
                    listener_stats.record_eviction();
                    debug!(key = %key, cause = ?cause, "Repository left registry");
                }
            })
            .build();

        Self {
            cache,
            parser,
            generations,
            failures: Arc::new(FailureLog::default()),
            store: None,
            stats,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a persistent store to skip scans of unchanged locations.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Abort in-flight constructions when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn generations(&self) -> &Arc<Generations> {
        &self.generations
    }

    pub fn failures(&self) -> &Arc<FailureLog> {
        &self.failures
    }

    pub fn parser(&self) -> &Arc<dyn ResourceParser> {
        &self.parser
    }

    // =========================================================================
    // Lookup and construction
    // =========================================================================

    /// Get the repository for `key`, constructing it on first access.
    ///
    /// Blocks the calling thread while the repository is scanned; async
    /// callers should run this on a blocking thread.
    pub fn get(&self, key: &RegistryKey) -> Result<Arc<SourceRepository>, RepositoryError> {
        if let Some(repo) = self.cache.get(key) {
            if repo.key() == key {
                self.stats.record_hit();
                return Ok(repo);
            }
            let violation = RepositoryError::Consistency {
                expected: key.to_string(),
                actual: repo.key().to_string(),
            };
            error!(error = %violation, "Evicting inconsistent registry entry");
            self.stats.record_consistency_failure();
            self.cache.invalidate(key);
        }

        self.stats.record_miss();
        self.cache
            .try_get_with(key.clone(), || self.construct(key))
            .map_err(|e| e.as_ref().clone())
    }

    /// The cached repository for `key`, without constructing one.
    pub fn peek(&self, key: &RegistryKey) -> Option<Arc<SourceRepository>> {
        self.cache.get(key).filter(|repo| repo.key() == key)
    }

    /// Register an externally built repository (e.g. a synthetic provider).
    pub fn insert(&self, key: RegistryKey, repo: Arc<SourceRepository>) {
        self.cache.insert(key, repo);
    }

    fn construct(&self, key: &RegistryKey) -> Result<Arc<SourceRepository>, RepositoryError> {
        let repo = SourceRepository::new(
            key.clone(),
            Arc::clone(&self.parser),
            Arc::clone(&self.generations),
        )
        .with_failure_log(Arc::clone(&self.failures));

        if let Some(store) = &self.store {
            match store.load(key) {
                Ok(Some(records)) => {
                    repo.publish(records);
                    self.stats.record_restored();
                    return Ok(Arc::new(repo));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(location = %key.location, error = %e, "Stored snapshot unusable; rescanning");
                }
            }
        }

        self.stats.record_construction();
        match repo.scan(&self.cancel.child_token()) {
            Ok(_) => {
                if let Some(store) = &self.store {
                    if let Err(e) = store.save(key, &repo.snapshot().to_records()) {
                        warn!(location = %key.location, error = %e, "Failed to store snapshot");
                    }
                }
            }
            Err(RepositoryError::Cancelled) => return Err(RepositoryError::Cancelled),
            // Already logged by the repository; it is cached with no resources
            Err(_) => {}
        }

        info!(
            key = %key,
            generation = repo.generation(),
            records = repo.snapshot().record_count(),
            "Constructed resource repository"
        );
        Ok(Arc::new(repo))
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Forget the repository for `key`; the next `get` rebuilds it.
    pub fn invalidate(&self, key: &RegistryKey) {
        self.cache.invalidate(key);
    }

    /// Forget every repository at `location`, in every namespacing mode.
    pub fn invalidate_location(&self, location: &LocationKey) -> usize {
        let keys: Vec<RegistryKey> = self
            .cache
            .iter()
            .filter(|(key, _)| &key.location == location)
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in &keys {
            self.cache.invalidate(key);
        }
        keys.len()
    }

    /// Forget every repository.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Forget `key` and reset the evicted repository so composites still
    /// holding it stop serving its content.
    pub fn reset(&self, key: &RegistryKey) -> bool {
        match self.cache.remove(key) {
            Some(repo) => {
                repo.reset();
                true
            }
            None => false,
        }
    }

    /// Evict every repository whose location is not in `live`.
    ///
    /// Safe to run concurrently with [`get`](Self::get). Returns the number
    /// of evicted entries.
    pub fn remove_stale(&self, live: &HashSet<LocationKey>) -> usize {
        let stale: Vec<RegistryKey> = self
            .cache
            .iter()
            .filter(|(key, _)| !live.contains(&key.location))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &stale {
            self.cache.invalidate(key);
        }
        if !stale.is_empty() {
            info!(evicted = stale.len(), "Removed stale repositories");
        }
        stale.len()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Cached repositories whose location contains `file`.
    pub fn containing(&self, file: &Path) -> Vec<Arc<SourceRepository>> {
        let mut repos: Vec<Arc<SourceRepository>> = self
            .cache
            .iter()
            .filter(|(key, _)| key.location.contains(file))
            .map(|(_, repo)| repo)
            .collect();
        repos.sort_by(|a, b| a.key().to_string().cmp(&b.key().to_string()));
        repos
    }

    /// Every cached repository.
    pub fn repositories(&self) -> Vec<Arc<SourceRepository>> {
        self.cache.iter().map(|(_, repo)| repo).collect()
    }

    /// Number of cached repositories.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Save every cached repository to the snapshot store.
    pub fn persist_all(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let mut saved = 0;
        for (key, repo) in self.cache.iter() {
            match store.save(&key, &repo.snapshot().to_records()) {
                Ok(()) => saved += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to store snapshot"),
            }
        }
        saved
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("entries", &self.cache.entry_count())
            .field("parser", &self.parser.name())
            .field("store", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Namespacing, ResourceNamespace};
    use crate::repository::FileLayoutParser;
    use std::fs;
    use tempfile::TempDir;

    fn registry() -> RepositoryRegistry {
        RepositoryRegistry::new(
            RegistryConfig::default(),
            Arc::new(FileLayoutParser::new()),
            Arc::new(Generations::new()),
        )
    }

    fn location(temp: &TempDir, name: &str) -> LocationKey {
        let path = temp.path().join(name);
        fs::create_dir_all(path.join("values")).unwrap();
        fs::write(path.join("values/strings.values"), "string title = Title\n").unwrap();
        LocationKey::new(path)
    }

    #[test]
    fn test_get_caches_instance() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let key = RegistryKey::flat(location(&temp, "app"));

        let first = registry.get(&key).unwrap();
        let second = registry.get(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.snapshot().record_count(), 1);

        let stats = registry.stats();
        assert_eq!(stats.constructions, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_namespacing_modes_cached_separately() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let loc = location(&temp, "lib");

        let flat = registry.get(&RegistryKey::flat(loc.clone())).unwrap();
        let namespaced = registry
            .get(&RegistryKey::new(
                loc,
                Namespacing::Namespaced(ResourceNamespace::from_package("com.lib")),
            ))
            .unwrap();

        assert!(!Arc::ptr_eq(&flat, &namespaced));
        assert!(flat.namespace().is_res_auto());
        assert_eq!(namespaced.namespace().package_name(), Some("com.lib"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_invalidate_rebuilds() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let key = RegistryKey::flat(location(&temp, "app"));

        let first = registry.get(&key).unwrap();
        registry.invalidate(&key);
        let second = registry.get(&key).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_remove_stale() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let a = location(&temp, "a");
        let b = location(&temp, "b");
        registry.get(&RegistryKey::flat(a.clone())).unwrap();
        registry.get(&RegistryKey::flat(b.clone())).unwrap();

        let live: HashSet<LocationKey> = [a.clone()].into_iter().collect();
        assert_eq!(registry.remove_stale(&live), 1);
        assert!(registry.peek(&RegistryKey::flat(a)).is_some());
        assert!(registry.peek(&RegistryKey::flat(b)).is_none());
    }

    #[test]
    fn test_inconsistent_entry_is_evicted_not_returned() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let app = RegistryKey::flat(location(&temp, "app"));
        let lib = RegistryKey::flat(location(&temp, "lib"));

        let lib_repo = registry.get(&lib).unwrap();
        registry.insert(app.clone(), lib_repo);

        let repo = registry.get(&app).unwrap();
        assert_eq!(repo.key(), &app);
        assert_eq!(registry.stats().consistency_failures, 1);
    }

    #[test]
    fn test_reset_empties_evicted_repository() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let key = RegistryKey::flat(location(&temp, "app"));
        let repo = registry.get(&key).unwrap();

        assert!(registry.reset(&key));
        assert!(repo.snapshot().is_empty());
        assert!(registry.peek(&key).is_none());
        assert!(!registry.reset(&key));
    }

    #[test]
    fn test_containing_finds_repositories_for_file() {
        let temp = TempDir::new().unwrap();
        let registry = registry();
        let app = location(&temp, "app");
        registry.get(&RegistryKey::flat(app.clone())).unwrap();
        registry.get(&RegistryKey::flat(location(&temp, "lib"))).unwrap();

        let file = app.path().join("values/strings.values");
        let found = registry.containing(&file);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location(), &app);
    }

    #[test]
    fn test_broken_location_cached_as_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken");
        fs::create_dir_all(path.join("values")).unwrap();
        fs::write(path.join("values/bad.values"), "garbage\n").unwrap();

        let registry = registry();
        let repo = registry.get(&RegistryKey::flat(path)).unwrap();
        assert!(repo.snapshot().is_empty());
    }
}
