//! Listeners and their scopes.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::reason::ReasonSet;
use super::stamp::VersionStamp;
use crate::repository::ResourceRepository;

/// Receives coalesced change notifications.
///
/// Called on the notifier's delivery task, one listener at a time.
pub trait ChangeListener: Send + Sync {
    fn resources_changed(&self, reasons: ReasonSet);
}

impl<F> ChangeListener for F
where
    F: Fn(ReasonSet) + Send + Sync,
{
    fn resources_changed(&self, reasons: ReasonSet) {
        self(reasons)
    }
}

/// What a listener observes.
#[derive(Clone, Default)]
pub struct ListenerScope {
    /// Aggregate repository whose generation feeds the version stamp.
    pub repository: Option<Arc<dyn ResourceRepository>>,
    /// File whose edits feed the version stamp.
    pub file: Option<PathBuf>,
    /// Configuration the listener renders with; changes to other named
    /// configurations are not delivered.
    pub configuration: Option<String>,
}

impl ListenerScope {
    /// Scope observing an aggregate repository.
    pub fn repository(repository: Arc<dyn ResourceRepository>) -> Self {
        Self {
            repository: Some(repository),
            ..Self::default()
        }
    }

    /// A scope observing nothing in particular; never short-circuited.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = Some(configuration.into());
        self
    }
}

impl PartialEq for ListenerScope {
    fn eq(&self, other: &Self) -> bool {
        let same_repository = match (&self.repository, &other.repository) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (None, None) => true,
            _ => false,
        };
        same_repository && self.file == other.file && self.configuration == other.configuration
    }
}

impl std::fmt::Debug for ListenerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerScope")
            .field(
                "repository",
                &self.repository.as_ref().map(|r| r.display_name()),
            )
            .field("file", &self.file)
            .field("configuration", &self.configuration)
            .finish()
    }
}

/// A registered listener and the last stamp it was delivered at.
pub(crate) struct Registration {
    pub(crate) scope: ListenerScope,
    pub(crate) listener: Arc<dyn ChangeListener>,
    pub(crate) last_seen: Mutex<VersionStamp>,
}

impl Registration {
    pub(crate) fn matches(&self, scope: &ListenerScope, listener: &Arc<dyn ChangeListener>) -> bool {
        Arc::ptr_eq(&self.listener, listener) && &self.scope == scope
    }
}
