//! Child-to-parent back links.
//!
//! Composites own strong references to their children; children only hold
//! weak references back. A child shared by several composites therefore
//! survives the disposal of any one of them, and a dropped composite vanishes
//! from its children's links on the next read.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::composite::CompositeRepository;
use super::traits::RepositoryId;

/// Weak links from a repository to the composites containing it.
#[derive(Debug, Default)]
pub struct ParentLinks {
    parents: Mutex<Vec<(RepositoryId, Weak<CompositeRepository>)>>,
}

impl ParentLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parent. Registering the same parent twice is a no-op.
    pub fn attach(&self, parent: RepositoryId, link: Weak<CompositeRepository>) {
        let mut parents = self.parents.lock();
        if !parents.iter().any(|(id, _)| *id == parent) {
            parents.push((parent, link));
        }
    }

    /// Remove a parent. Returns true if it was registered.
    pub fn detach(&self, parent: RepositoryId) -> bool {
        let mut parents = self.parents.lock();
        let before = parents.len();
        parents.retain(|(id, _)| *id != parent);
        parents.len() != before
    }

    /// Live parents. Dead links are pruned.
    pub fn parents(&self) -> Vec<Arc<CompositeRepository>> {
        let mut parents = self.parents.lock();
        parents.retain(|(_, link)| link.strong_count() > 0);
        parents.iter().filter_map(|(_, link)| link.upgrade()).collect()
    }

    /// Number of live parents.
    pub fn count(&self) -> usize {
        let mut parents = self.parents.lock();
        parents.retain(|(_, link)| link.strong_count() > 0);
        parents.len()
    }

    pub fn contains(&self, parent: RepositoryId) -> bool {
        self.parents
            .lock()
            .iter()
            .any(|(id, link)| *id == parent && link.strong_count() > 0)
    }
}
