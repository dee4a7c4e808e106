//! Derived artifact cache.
//!
//! ```text
//!   generate("com.example.R$string")
//!        │
//!        ▼
//!   ┌─────────────────┐  miss   ┌──────────────────────────────┐
//!   │ scopes (TTL)    │───────► │ generators                    │
//!   │ package → [id]  │         │ repo id → (Weak<repo>, gen)   │
//!   └─────────────────┘         └──────────────────────────────┘
//!        │ 0 scopes → None, 2+ scopes → Collision
//!        ▼
//!   ┌─────────────────┐  stale stamp
//!   │ payloads        │────────────► generator.generate()
//!   └─────────────────┘
//! ```
//!
//! Generators are keyed by the identity of the repository they read, held
//! weakly: once the repository is dropped its scope stops resolving and the
//! slot is purged on the next lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use moka::sync::Cache;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::error::ArtifactError;
use super::generator::{ArtifactStamp, ClassGenerator, DerivedKey};
use crate::repository::{RepositoryId, ResourceRepository};

/// How long a package's scope list is trusted before it is recomputed.
pub const DEFAULT_SCOPE_TTL: Duration = Duration::from_secs(300);

/// Maximum number of generated payloads kept.
pub const DEFAULT_MAX_PAYLOADS: u64 = 512;

/// Configuration for [`DerivedArtifactCache`].
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub scope_ttl: Duration,
    pub max_payloads: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            scope_ttl: DEFAULT_SCOPE_TTL,
            max_payloads: DEFAULT_MAX_PAYLOADS,
        }
    }
}

/// A generated artifact and the inputs it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPayload {
    pub key: String,
    pub scope: RepositoryId,
    pub stamp: ArtifactStamp,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct ArtifactStats {
    generated: AtomicU64,
    reused: AtomicU64,
    collisions: AtomicU64,
    purged: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactStatsSnapshot {
    pub generated: u64,
    pub reused: u64,
    pub collisions: u64,
    pub purged: u64,
}

impl ArtifactStats {
    pub fn snapshot(&self) -> ArtifactStatsSnapshot {
        ArtifactStatsSnapshot {
            generated: self.generated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}

struct GeneratorSlot {
    repository: Weak<dyn ResourceRepository>,
    name: String,
    generator: Arc<dyn ClassGenerator>,
}

impl GeneratorSlot {
    fn is_live(&self) -> bool {
        self.repository.strong_count() > 0
    }
}

/// Time-boxed cache of generated artifacts.
pub struct DerivedArtifactCache {
    generators: RwLock<HashMap<RepositoryId, GeneratorSlot>>,
    scopes: Cache<String, Arc<Vec<RepositoryId>>>,
    payloads: Cache<String, Arc<ArtifactPayload>>,
    stats: ArtifactStats,
}

impl DerivedArtifactCache {
    pub fn new(config: ArtifactConfig) -> Self {
        Self {
            generators: RwLock::new(HashMap::new()),
            scopes: Cache::builder().time_to_live(config.scope_ttl).build(),
            payloads: Cache::builder().max_capacity(config.max_payloads).build(),
            stats: ArtifactStats::default(),
        }
    }

    /// Register the generator reading `repository`, replacing any previous
    /// generator for the same repository.
    pub fn register(
        &self,
        repository: &Arc<dyn ResourceRepository>,
        generator: Arc<dyn ClassGenerator>,
    ) {
        let id = repository.id();
        let package = generator.package().to_string();
        let previous = self.generators.write().insert(
            id,
            GeneratorSlot {
                repository: Arc::downgrade(repository),
                name: repository.display_name(),
                generator,
            },
        );
        if let Some(previous) = previous {
            self.scopes.invalidate(previous.generator.package());
        }
        self.scopes.invalidate(&package);
        debug!(repository = %id, package = %package, "Registered class generator");
    }

    /// Forget the generator for `repository`.
    pub fn unregister(&self, repository: RepositoryId) -> bool {
        let removed = self.generators.write().remove(&repository);
        match removed {
            Some(slot) => {
                self.scopes.invalidate(slot.generator.package());
                true
            }
            None => false,
        }
    }

    /// Generate the artifact named `key`.
    ///
    /// Returns `Ok(None)` when `key` is not a derived key or no live scope
    /// owns its package, and [`ArtifactError::Collision`] when several do.
    pub fn generate(&self, key: &str) -> Result<Option<Arc<ArtifactPayload>>, ArtifactError> {
        let Some(derived) = DerivedKey::parse(key) else {
            return Ok(None);
        };

        let mut live = self.live_scopes(&derived.package);
        if live.len() != self.scope_ids(&derived.package).len() {
            // A repository went away since the scope list was computed.
            self.purge();
            live = self.live_scopes(&derived.package);
        }

        let (scope, generator) = match live.len() {
            0 => return Ok(None),
            1 => live.remove(0),
            _ => {
                self.stats.collisions.fetch_add(1, Ordering::Relaxed);
                let scopes = self.scope_names(&live);
                warn!(key = %key, scopes = ?scopes, "Derived key claimed by multiple scopes");
                return Err(ArtifactError::Collision {
                    key: key.to_string(),
                    scopes,
                });
            }
        };

        let stamp = generator.stamp();
        if let Some(payload) = self.payloads.get(key) {
            if payload.scope == scope && payload.stamp == stamp {
                self.stats.reused.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(payload));
            }
        }

        let Some(content) = generator.generate(&derived)? else {
            self.payloads.invalidate(key);
            return Ok(None);
        };
        let payload = Arc::new(ArtifactPayload {
            key: key.to_string(),
            scope,
            stamp,
            content,
        });
        self.payloads.insert(key.to_string(), Arc::clone(&payload));
        self.stats.generated.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, scope = %scope, "Generated derived artifact");
        Ok(Some(payload))
    }

    /// Drop generators whose repository is gone. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let mut generators = self.generators.write();
        let before = generators.len();
        generators.retain(|_, slot| slot.is_live());
        let removed = before - generators.len();
        drop(generators);

        if removed > 0 {
            self.scopes.invalidate_all();
            self.stats.purged.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Purged generators of dropped repositories");
        }
        removed
    }

    /// Forget every cached scope list and payload. Generators stay registered.
    pub fn reset(&self) {
        self.scopes.invalidate_all();
        self.payloads.invalidate_all();
    }

    /// Packages contributing generators changed; recompute their scopes.
    pub fn invalidate_package(&self, package: &str) {
        self.scopes.invalidate(package);
    }

    pub fn generator_count(&self) -> usize {
        self.generators.read().len()
    }

    pub fn stats(&self) -> ArtifactStatsSnapshot {
        self.stats.snapshot()
    }

    fn scope_ids(&self, package: &str) -> Arc<Vec<RepositoryId>> {
        self.scopes.get_with(package.to_string(), || {
            let generators = self.generators.read();
            let mut ids: Vec<RepositoryId> = generators
                .iter()
                .filter(|(_, slot)| slot.is_live() && slot.generator.package() == package)
                .map(|(id, _)| *id)
                .collect();
            ids.sort();
            Arc::new(ids)
        })
    }

    fn live_scopes(&self, package: &str) -> Vec<(RepositoryId, Arc<dyn ClassGenerator>)> {
        let ids = self.scope_ids(package);
        let generators = self.generators.read();
        ids.iter()
            .filter_map(|id| {
                let slot = generators.get(id)?;
                slot.is_live().then(|| (*id, Arc::clone(&slot.generator)))
            })
            .collect()
    }

    fn scope_names(&self, scopes: &[(RepositoryId, Arc<dyn ClassGenerator>)]) -> Vec<String> {
        let generators = self.generators.read();
        scopes
            .iter()
            .map(|(id, _)| {
                generators
                    .get(id)
                    .map(|slot| slot.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect()
    }
}

impl Default for DerivedArtifactCache {
    fn default() -> Self {
        Self::new(ArtifactConfig::default())
    }
}
