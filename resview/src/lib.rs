//! resview - a live, merged view over layered resource repositories.
//!
//! Leaf repositories ([`repository::SourceRepository`]) hold immutable
//! snapshots of one resource location. Composites merge them with shadowing
//! precedence (primary, then library, then synthetic). File events are
//! turned into per-repository updates on a bounded [`queue::UpdateQueue`],
//! and listeners hear about the result through a coalescing
//! [`notify::ChangeNotifier`]. [`engine::ResourceEngine`] wires it all up.

pub mod artifacts;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod events;
pub mod ids;
pub mod logging;
pub mod model;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod repository;

/// Crate version, recorded in persisted snapshots.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
