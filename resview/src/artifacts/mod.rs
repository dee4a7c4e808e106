//! Derived artifacts.
//!
//! Generated classes (`R` stubs) cached against the repository generation and
//! allocator generation they were produced from.

mod cache;
mod error;
mod generator;

pub use cache::{
    ArtifactConfig, ArtifactPayload, ArtifactStats, ArtifactStatsSnapshot, DerivedArtifactCache,
    DEFAULT_MAX_PAYLOADS, DEFAULT_SCOPE_TTL,
};
pub use error::ArtifactError;
pub use generator::{ArtifactStamp, ClassGenerator, DerivedKey, RClassStubGenerator};
