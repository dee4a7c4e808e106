//! Repository registry and persistent snapshot store.

#[allow(clippy::module_inception)]
mod registry;
mod stats;
mod store;

pub use registry::{RegistryConfig, RepositoryRegistry, DEFAULT_MAX_ENTRIES};
pub use stats::{RegistryStats, RegistryStatsSnapshot};
pub use store::{
    fingerprint, BincodeSnapshotStore, SnapshotStore, SnapshotStoreKey, StoreError,
    StoredSnapshot, SNAPSHOT_EXTENSION,
};
