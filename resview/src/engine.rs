//! Application-lifetime service bundle.
//!
//! `ResourceEngine` owns every shared service and wires them together:
//!
//! ```text
//!   PollingWatcher ──► EventRouter ──► UpdateQueue ──► SourceRepository
//!                          │                              (registry)
//!                          ▼                                  │
//!                    ChangeNotifier ◄── LocationBarrier ◄─────┘
//!                          │
//!                          ▼
//!                     listeners ──► DerivedArtifactCache ◄── IdentifierAllocator
//! ```
//!
//! # Startup Sequence
//!
//! 1. Registry, with the persistent snapshot store when configured
//! 2. Update queue on the current runtime
//! 3. Notifier, gated on the queue through a [`LocationBarrier`]
//! 4. Identifier allocator and derived artifact cache
//! 5. Event router
//!
//! # Example
//!
//! ```ignore
//! use resview::config::{ConfigFile, EngineConfig};
//! use resview::engine::ResourceEngine;
//! use resview::repository::FileLayoutParser;
//!
//! let config = EngineConfig::from_config_file(&ConfigFile::load()?);
//! let engine = ResourceEngine::start(config, Arc::new(FileLayoutParser))?;
//! let repo = engine.repository(&RegistryKey::flat("/app/res")).await?;
//! engine.shutdown();
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactPayload, DerivedArtifactCache, RClassStubGenerator};
use crate::config::EngineConfig;
use crate::events::{EventRouter, PollingWatcher};
use crate::ids::{CompiledIdSource, IdentifierAllocator};
use crate::model::{LocationKey, RegistryKey};
use crate::notify::{
    ChangeListener, ChangeNotifier, ListenerScope, LocationBarrier, Reason, VersionStamp,
};
use crate::queue::{blocking, BoxFuture, QueueError, UpdateHandle, UpdateOutcome, UpdateQueue};
use crate::registry::{BincodeSnapshotStore, RepositoryRegistry};
use crate::repository::{
    Bucket, CompositeRepository, Generations, RepositoryError, RepositoryRef, ResourceParser,
    ResourceRepository, SourceRepository,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine requires a tokio runtime: {0}")]
    Runtime(#[from] QueueError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Gates notifier delivery on the queue: a location's batch is delivered
/// once every update queued for the repositories at that location finished.
struct QueueBarrier {
    registry: Arc<RepositoryRegistry>,
    queue: UpdateQueue<RegistryKey>,
}

impl LocationBarrier for QueueBarrier {
    fn wait_for(&self, location: &LocationKey) -> BoxFuture<'static, ()> {
        let keys: Vec<RegistryKey> = self
            .registry
            .repositories()
            .iter()
            .filter(|repo| repo.location() == location)
            .map(|repo| repo.key().clone())
            .collect();
        let queue = self.queue.clone();
        Box::pin(async move {
            join_all(keys.into_iter().map(|key| queue.barrier(key))).await;
        })
    }
}

/// Every shared service, created once per process.
pub struct ResourceEngine {
    config: EngineConfig,
    registry: Arc<RepositoryRegistry>,
    queue: UpdateQueue<RegistryKey>,
    notifier: ChangeNotifier,
    ids: Arc<IdentifierAllocator>,
    artifacts: Arc<DerivedArtifactCache>,
    router: Arc<EventRouter>,
    runtime: Handle,
    cancellation: CancellationToken,
}

impl ResourceEngine {
    /// Start the engine on the current tokio runtime.
    pub fn start(config: EngineConfig, parser: Arc<dyn ResourceParser>) -> Result<Self, EngineError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        info!(
            workers = config.queue.workers,
            max_entries = config.registry.max_entries,
            snapshot_dir = ?config.snapshot_dir,
            "Starting resource engine"
        );

        let cancellation = CancellationToken::new();

        // 1. Registry
        let mut registry = RepositoryRegistry::new(
            config.registry.clone(),
            parser,
            Arc::new(Generations::new()),
        )
        .with_cancellation(cancellation.child_token());
        if let Some(dir) = &config.snapshot_dir {
            registry = registry.with_store(Arc::new(BincodeSnapshotStore::new(dir.clone())));
        }
        let registry = Arc::new(registry);

        // 2. Queue
        let queue = UpdateQueue::new(config.queue.clone(), runtime.clone());

        // 3. Notifier
        let notifier = ChangeNotifier::new(config.notifier.clone(), runtime.clone());
        notifier.set_barrier(Arc::new(QueueBarrier {
            registry: Arc::clone(&registry),
            queue: queue.clone(),
        }));

        // 4. Ids and artifacts
        let ids = Arc::new(IdentifierAllocator::with_dynamic_package(config.dynamic_package));
        let artifacts = Arc::new(DerivedArtifactCache::new(config.artifacts.clone()));

        // 5. Router
        let router = Arc::new(EventRouter::new(
            Arc::clone(&registry),
            queue.clone(),
            notifier.clone(),
        ));

        info!("Resource engine started");
        Ok(Self {
            config,
            registry,
            queue,
            notifier,
            ids,
            artifacts,
            router,
            runtime,
            cancellation,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &UpdateQueue<RegistryKey> {
        &self.queue
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn ids(&self) -> &Arc<IdentifierAllocator> {
        &self.ids
    }

    pub fn artifacts(&self) -> &Arc<DerivedArtifactCache> {
        &self.artifacts
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    /// Get or construct the leaf for `key` without blocking the runtime.
    pub async fn repository(&self, key: &RegistryKey) -> Result<Arc<SourceRepository>, EngineError> {
        let registry = Arc::clone(&self.registry);
        let key = key.clone();
        let repo = tokio::task::spawn_blocking(move || registry.get(&key))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;
        Ok(repo)
    }

    /// Build a composite from registry leaves plus synthetic children.
    pub async fn compose(
        &self,
        name: &str,
        primary: &[RegistryKey],
        library: &[RegistryKey],
        synthetic: Vec<RepositoryRef>,
    ) -> Result<Arc<CompositeRepository>, EngineError> {
        let composite = CompositeRepository::new(name);
        let primary = self.leaves(primary).await?;
        let library = self.leaves(library).await?;
        composite.set_children(primary, library, synthetic);
        info!(
            name,
            primary = composite.children(Bucket::Primary).len(),
            library = composite.children(Bucket::Library).len(),
            synthetic = composite.children(Bucket::Synthetic).len(),
            "Composed repository"
        );
        Ok(composite)
    }

    async fn leaves(&self, keys: &[RegistryKey]) -> Result<Vec<RepositoryRef>, EngineError> {
        let mut leaves = Vec::with_capacity(keys.len());
        for key in keys {
            let leaf: RepositoryRef = self.repository(key).await?;
            leaves.push(leaf);
        }
        Ok(leaves)
    }

    /// Queue a full rescan of `key`, replacing a rescan still waiting.
    pub fn rescan(&self, key: &RegistryKey) -> UpdateHandle {
        let registry = Arc::clone(&self.registry);
        let target = key.clone();
        let handle = self.queue.enqueue_superseding(
            key.clone(),
            "rescan",
            blocking(format!("rescan {key}"), move |ctx| {
                let repo = match registry.get(&target) {
                    Ok(repo) => repo,
                    Err(e) => return UpdateOutcome::from(Err::<(), _>(e)),
                };
                repo.scan(ctx.cancellation_token()).into()
            }),
        );
        self.notifier
            .notify(Reason::ResourceEdit, Some(key.location.clone()));
        handle
    }

    /// Run the pending per-file rescans of `key` now.
    pub async fn sync(&self, key: &RegistryKey) -> Result<usize, EngineError> {
        let repo = self.repository(key).await?;
        let token = self.cancellation.child_token();
        let patched = tokio::task::spawn_blocking(move || repo.sync(&token))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;
        if patched > 0 {
            self.notifier.notify(Reason::Sync, Some(key.location.clone()));
        }
        Ok(patched)
    }

    /// Drop registry entries whose location is no longer in use.
    pub fn remove_stale(&self, live: &HashSet<LocationKey>) -> usize {
        self.registry.remove_stale(live)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn subscribe(&self, scope: ListenerScope, listener: Arc<dyn ChangeListener>) -> VersionStamp {
        self.notifier.add_listener(scope, listener)
    }

    pub fn unsubscribe(&self, scope: &ListenerScope, listener: &Arc<dyn ChangeListener>) -> bool {
        self.notifier.remove_listener(scope, listener)
    }

    // =========================================================================
    // Ids and artifacts
    // =========================================================================

    /// Replace the compiled ids, e.g. after a build.
    pub fn load_compiled_ids(&self, source: &dyn CompiledIdSource) {
        self.ids.reset_compiled(source);
        self.notifier.notify(Reason::Build, None);
    }

    /// Generate `R` classes for `package` from `repository`.
    pub fn register_class_generator(&self, package: &str, repository: &Arc<dyn ResourceRepository>) {
        let generator = RClassStubGenerator::new(package, repository, Arc::clone(&self.ids));
        self.artifacts.register(repository, Arc::new(generator));
    }

    pub fn generate(&self, key: &str) -> Result<Option<Arc<ArtifactPayload>>, ArtifactError> {
        self.artifacts.generate(key)
    }

    // =========================================================================
    // Watching
    // =========================================================================

    /// Run `watcher` until the engine shuts down.
    pub fn spawn_watcher(&self, watcher: PollingWatcher) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let cancel = self.cancellation.child_token();
        self.runtime.spawn(watcher.run(router, cancel))
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Wait until queued updates and pending notifications are done.
    pub async fn drain(&self) {
        self.queue.wait_idle().await;
        self.notifier.wait_idle().await;
    }

    /// Stop background work and persist snapshots.
    ///
    /// Shuts down in reverse order of startup: watchers and in-flight scans
    /// are cancelled, then the queue and notifier stop, then snapshots are
    /// written to the store.
    pub fn shutdown(self) {
        info!("Shutting down resource engine");
        self.cancellation.cancel();
        self.queue.shutdown();
        self.notifier.shutdown();

        if self.config.snapshot_dir.is_some() {
            let saved = self.registry.persist_all();
            info!(saved, "Persisted repository snapshots");
        }

        let stats = self.registry.stats();
        if stats.consistency_failures > 0 {
            warn!(
                failures = stats.consistency_failures,
                "Registry saw consistency failures during this run"
            );
        }
        info!("Resource engine shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ResourceId, SymbolTable};
    use crate::model::{ResourceKey, ResourceNamespace, ResourceType};
    use crate::notify::ReasonSet;
    use crate::repository::FileLayoutParser;
    use parking_lot::Mutex;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    fn res_dir(root: &Path, name: &str, app_name: &str) -> PathBuf {
        let res = root.join(name);
        fs::create_dir_all(res.join("values")).unwrap();
        fs::write(
            res.join("values/strings.values"),
            format!("string app_name = {app_name}\n"),
        )
        .unwrap();
        res
    }

    fn engine() -> ResourceEngine {
        let mut config = EngineConfig::default();
        config.notifier.tick = Duration::from_millis(5);
        config.queue.workers = 2;
        ResourceEngine::start(config, Arc::new(FileLayoutParser)).unwrap()
    }

    #[test]
    fn test_start_requires_runtime() {
        let result = ResourceEngine::start(EngineConfig::default(), Arc::new(FileLayoutParser));
        assert!(matches!(result, Err(EngineError::Runtime(QueueError::NoRuntime))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_compose_shadows_library() {
        let dir = TempDir::new().unwrap();
        let app = res_dir(dir.path(), "app", "App");
        let lib = res_dir(dir.path(), "lib", "Lib");
        let engine = engine();

        let composite = engine
            .compose("app", &[RegistryKey::flat(app)], &[RegistryKey::flat(lib)], Vec::new())
            .await
            .unwrap();
        let records = composite
            .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "app_name")
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value.as_text(), Some("App"));
        engine.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rescan_delivers_after_update() {
        let dir = TempDir::new().unwrap();
        let app = res_dir(dir.path(), "app", "Before");
        let engine = engine();
        let key = RegistryKey::flat(app.clone());
        let repo = engine.repository(&key).await.unwrap();

        let observed = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&observed);
        let watched = Arc::clone(&repo);
        engine.subscribe(
            ListenerScope::global(),
            Arc::new(move |_: ReasonSet| {
                let value = watched
                    .lookup(&ResourceNamespace::res_auto(), ResourceType::String, "app_name")
                    .unwrap()
                    .first()
                    .and_then(|r| r.value.as_text().map(str::to_string))
                    .unwrap_or_default();
                sink.lock().push(value);
            }),
        );

        fs::write(app.join("values/strings.values"), "string app_name = After\n").unwrap();
        let handle = engine.rescan(&key);
        assert!(handle.wait().await.is_completed());
        engine.drain().await;

        assert_eq!(*observed.lock(), vec!["After".to_string()]);
        engine.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_generate_r_class_with_compiled_ids() {
        let dir = TempDir::new().unwrap();
        let app = res_dir(dir.path(), "app", "App");
        let engine = engine();
        let repo: Arc<dyn ResourceRepository> =
            engine.repository(&RegistryKey::flat(app)).await.unwrap();

        let table = SymbolTable::parse(
            "int string app_name 0x7f0e0001\n",
            &ResourceNamespace::res_auto(),
        )
        .unwrap();
        engine.load_compiled_ids(&table);
        assert_eq!(
            engine
                .ids()
                .compiled_id(&ResourceKey::res_auto(ResourceType::String, "app_name")),
            Some(ResourceId::from_raw(0x7f0e_0001))
        );

        engine.register_class_generator("com.example", &repo);
        let payload = engine.generate("com.example.R$string").unwrap().unwrap();
        assert!(payload.content.contains("app_name = 0x7f0e0001"));
        engine.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_snapshot_store_survives_restart() {
        let dir = TempDir::new().unwrap();
        let app = res_dir(dir.path(), "app", "App");
        let store = dir.path().join("snapshots");
        let key = RegistryKey::flat(app);

        let config = || {
            let mut config = EngineConfig::default().with_snapshot_dir(Some(store.clone()));
            config.queue.workers = 2;
            config
        };

        let first = ResourceEngine::start(config(), Arc::new(FileLayoutParser)).unwrap();
        first.repository(&key).await.unwrap();
        first.shutdown();

        let second = ResourceEngine::start(config(), Arc::new(FileLayoutParser)).unwrap();
        let repo = second.repository(&key).await.unwrap();
        assert_eq!(repo.snapshot().record_count(), 1);
        assert_eq!(second.registry().stats().restored, 1);
        second.shutdown();
    }
}
