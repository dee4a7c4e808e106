//! Identifier allocation.
//!
//! Two tables live side by side:
//!
//! - **compiled**: loaded from an authoritative build output, frozen until
//!   the next [`IdentifierAllocator::reset_compiled`].
//! - **dynamic**: assigned on demand for references the build has not seen
//!   yet, discarded by [`IdentifierAllocator::reset_dynamic`].
//!
//! A reference with a compiled id always resolves to it; dynamic allocation
//! never shadows it and never hands out a numeric id that a compiled
//! reference owns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::encoding::{IdError, ResourceId};
use crate::model::{ResourceKey, ResourceType};

/// Package byte used for dynamic ids unless configured otherwise.
pub const DEFAULT_DYNAMIC_PACKAGE: u8 = 0x7f;

/// An authoritative set of compiled ids.
pub trait CompiledIdSource {
    fn compiled_ids(&self) -> Vec<(ResourceKey, ResourceId)>;
}

impl CompiledIdSource for Vec<(ResourceKey, ResourceId)> {
    fn compiled_ids(&self) -> Vec<(ResourceKey, ResourceId)> {
        self.clone()
    }
}

#[derive(Default)]
struct IdTable {
    by_key: HashMap<ResourceKey, ResourceId>,
    by_id: HashMap<ResourceId, ResourceKey>,
}

impl IdTable {
    fn insert(&mut self, key: ResourceKey, id: ResourceId) {
        if let Some(old) = self.by_key.insert(key.clone(), id) {
            self.by_id.remove(&old);
        }
        self.by_id.insert(id, key);
    }

    fn remove(&mut self, key: &ResourceKey) {
        if let Some(id) = self.by_key.remove(key) {
            self.by_id.remove(&id);
        }
    }

    fn clear(&mut self) {
        self.by_key.clear();
        self.by_id.clear();
    }

    fn len(&self) -> usize {
        self.by_key.len()
    }
}

#[derive(Default)]
struct Tables {
    compiled: IdTable,
    dynamic: IdTable,
    next_entry: HashMap<ResourceType, u32>,
}

/// Assigns and resolves resource ids.
pub struct IdentifierAllocator {
    package: u8,
    tables: RwLock<Tables>,
    generation: AtomicU64,
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self::with_dynamic_package(DEFAULT_DYNAMIC_PACKAGE)
    }

    pub fn with_dynamic_package(package: u8) -> Self {
        Self {
            package,
            tables: RwLock::new(Tables::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn dynamic_package(&self) -> u8 {
        self.package
    }

    /// Compiled id for `key`, if the build assigned one.
    pub fn compiled_id(&self, key: &ResourceKey) -> Option<ResourceId> {
        self.tables.read().compiled.by_key.get(key).copied()
    }

    /// Id for `key`, allocating a dynamic one when it has neither.
    pub fn dynamic_id(&self, key: &ResourceKey) -> Result<ResourceId, IdError> {
        {
            let tables = self.tables.read();
            if let Some(id) = tables.compiled.by_key.get(key) {
                return Ok(*id);
            }
            if let Some(id) = tables.dynamic.by_key.get(key) {
                return Ok(*id);
            }
        }

        let mut tables = self.tables.write();
        // Another caller may have allocated while the read lock was released.
        if let Some(id) = tables.compiled.by_key.get(key) {
            return Ok(*id);
        }
        if let Some(id) = tables.dynamic.by_key.get(key) {
            return Ok(*id);
        }

        let mut entry = tables.next_entry.get(&key.ty).copied().unwrap_or(0);
        let id = loop {
            let Ok(raw_entry) = u16::try_from(entry) else {
                return Err(IdError::Exhausted(key.ty));
            };
            let candidate = ResourceId::for_type(self.package, key.ty, raw_entry);
            entry += 1;
            if !tables.compiled.by_id.contains_key(&candidate) {
                break candidate;
            }
        };
        tables.next_entry.insert(key.ty, entry);
        tables.dynamic.insert(key.clone(), id);

        debug!(key = %key, id = %id, "Allocated dynamic id");
        Ok(id)
    }

    /// Reference owning `id`, compiled ids first.
    pub fn resolve(&self, id: ResourceId) -> Option<ResourceKey> {
        let tables = self.tables.read();
        tables
            .compiled
            .by_id
            .get(&id)
            .or_else(|| tables.dynamic.by_id.get(&id))
            .cloned()
    }

    /// Drop every dynamic id; compiled ids are untouched.
    pub fn reset_dynamic(&self) {
        let mut tables = self.tables.write();
        let dropped = tables.dynamic.len();
        tables.dynamic.clear();
        tables.next_entry.clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(dropped, generation, "Reset dynamic ids");
    }

    /// Replace the compiled table from an authoritative source.
    ///
    /// Dynamic ids survive unless their reference became compiled or their
    /// numeric id now belongs to a compiled reference.
    pub fn reset_compiled(&self, source: &dyn CompiledIdSource) {
        let entries = source.compiled_ids();
        let mut tables = self.tables.write();

        tables.compiled.clear();
        for (key, id) in entries {
            tables.compiled.insert(key, id);
        }

        let Tables {
            compiled, dynamic, ..
        } = &mut *tables;
        let superseded: Vec<ResourceKey> = dynamic
            .by_key
            .iter()
            .filter(|(key, id)| compiled.by_key.contains_key(*key) || compiled.by_id.contains_key(*id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &superseded {
            dynamic.remove(key);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            compiled = tables.compiled.len(),
            dropped_dynamic = superseded.len(),
            generation,
            "Loaded compiled ids"
        );
    }

    /// Changes on every reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn compiled_count(&self) -> usize {
        self.tables.read().compiled.len()
    }

    pub fn dynamic_count(&self) -> usize {
        self.tables.read().dynamic.len()
    }
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self::new()
    }
}
