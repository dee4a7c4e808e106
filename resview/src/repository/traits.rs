//! The repository query interface shared by leaves and composites.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::RepositoryError;
use super::links::ParentLinks;
use crate::model::{ResourceNamespace, ResourceRecord, ResourceType};

/// Global counter for repository identities.
static NEXT_REPOSITORY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a repository instance.
///
/// Two repositories built for the same location (e.g. before and after an
/// eviction) have different identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryId(u64);

impl RepositoryId {
    pub fn next() -> Self {
        Self(NEXT_REPOSITORY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repo#{}", self.0)
    }
}

/// Whether a visit should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    Continue,
    Abort,
}

/// Records returned by a lookup.
///
/// Records are shared with the snapshot they came from.
pub type Records = Vec<Arc<ResourceRecord>>;

/// Read interface over a set of resources.
///
/// Implementations must be safe to query from any thread while updates are
/// in progress; a query observes either the state before or after an update,
/// never a mixture.
pub trait ResourceRepository: Send + Sync {
    /// Identity of this repository instance.
    fn id(&self) -> RepositoryId;

    /// Human-readable name for logs.
    fn display_name(&self) -> String;

    /// Current generation. Never decreases.
    fn generation(&self) -> u64;

    /// All records for the exact key.
    ///
    /// An unknown namespace yields an empty result, not an error.
    fn lookup(
        &self,
        namespace: &ResourceNamespace,
        ty: ResourceType,
        name: &str,
    ) -> Result<Records, RepositoryError>;

    /// Resource types with at least one record in `namespace`.
    fn types_present(
        &self,
        namespace: &ResourceNamespace,
    ) -> Result<BTreeSet<ResourceType>, RepositoryError>;

    /// Namespaces with at least one record.
    fn namespaces_present(&self) -> Result<BTreeSet<ResourceNamespace>, RepositoryError>;

    /// Visit every record until the visitor aborts.
    fn visit(
        &self,
        visitor: &mut dyn FnMut(&Arc<ResourceRecord>) -> VisitResult,
    ) -> Result<VisitResult, RepositoryError>;

    /// Composites currently holding this repository as a child.
    fn parent_links(&self) -> &ParentLinks;
}
