//! Version stamps.

use std::fmt;

/// Tuple of independent change counters observed by a listener.
///
/// Counters only grow, so equal stamps mean nothing observable changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VersionStamp {
    /// Generation of the observed aggregate repository.
    pub repository_generation: u64,
    /// Edit counter of the observed file, if any.
    pub file_stamp: u64,
    /// Counter of active-configuration changes.
    pub configuration_generation: u64,
    /// Counter of configuration-manager state changes (SDK switches).
    pub configuration_manager_state: u64,
    /// Counter of sync, build, variant and SDK events.
    pub other_generation: u64,
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}.f{}.c{}.m{}.o{}",
            self.repository_generation,
            self.file_stamp,
            self.configuration_generation,
            self.configuration_manager_state,
            self.other_generation
        )
    }
}
