//! Routes file events to the repositories that contain them.
//!
//! ```text
//!   FileEvent ──► parser relevant? ──► registry.containing(path)
//!                                    │ for each leaf not filtered out
//!                                    ▼
//!                   schedule_rescan(path) already pending? ── yes ──► skip
//!                                    │ no
//!                                    ▼
//!                   queue.enqueue(leaf key, patch_file(path))
//!                                    │
//!                                    ▼
//!                   notifier.notify(ResourceEdit, leaf location)
//! ```
//!
//! The notification is gated by the notifier's location barrier, so
//! listeners see the patched snapshot.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::event::FileEvent;
use super::filter::RelevanceFilter;
use crate::model::{LocationKey, RegistryKey};
use crate::notify::{ChangeNotifier, Reason};
use crate::queue::{blocking, UpdateOutcome, UpdateQueue};
use crate::registry::RepositoryRegistry;
use crate::repository::SourceRepository;

/// Counters of routed events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub events: u64,
    pub ignored: u64,
    pub scheduled: u64,
    pub deduplicated: u64,
}

#[derive(Default)]
struct Counters {
    events: AtomicU64,
    ignored: AtomicU64,
    scheduled: AtomicU64,
    deduplicated: AtomicU64,
}

/// Turns file events into queued patches and change notifications.
pub struct EventRouter {
    registry: Arc<RepositoryRegistry>,
    queue: UpdateQueue<RegistryKey>,
    notifier: ChangeNotifier,
    filter: RelevanceFilter,
    counters: Counters,
}

impl EventRouter {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        queue: UpdateQueue<RegistryKey>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            registry,
            queue,
            notifier,
            filter: RelevanceFilter::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_filter(mut self, filter: RelevanceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Route one event. Returns the number of patches enqueued.
    pub fn route(&self, event: &FileEvent) -> usize {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        let path = event.path();

        if !self.registry.parser().is_relevant(path) {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            trace!(event = %event, "Ignoring irrelevant file event");
            return 0;
        }

        let affected: Vec<_> = self
            .registry
            .containing(path)
            .into_iter()
            .filter(|repo| self.filter.is_relevant_in(repo.location().path(), path))
            .collect();
        if affected.is_empty() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            trace!(event = %event, "No repository takes the file");
            return 0;
        }

        let mut scheduled = 0;
        let mut locations = BTreeSet::new();
        for repository in affected {
            locations.insert(repository.location().clone());
            if self.schedule(repository, event) {
                scheduled += 1;
            }
        }

        for location in locations {
            self.notifier.notify(Reason::ResourceEdit, Some(location));
        }
        scheduled
    }

    /// Route a batch of events, e.g. one watcher poll.
    pub fn route_all<'a>(&self, events: impl IntoIterator<Item = &'a FileEvent>) -> usize {
        events.into_iter().map(|event| self.route(event)).sum()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            events: self.counters.events.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
        }
    }

    pub fn locations(&self) -> Vec<LocationKey> {
        let mut locations: Vec<_> = self
            .registry
            .repositories()
            .iter()
            .map(|repo| repo.location().clone())
            .collect();
        locations.sort();
        locations.dedup();
        locations
    }

    fn schedule(&self, repository: Arc<SourceRepository>, event: &FileEvent) -> bool {
        let file = event.path().to_path_buf();
        if !repository.schedule_rescan(file.clone()) {
            self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            trace!(
                location = %repository.location(),
                file = %file.display(),
                "Rescan already pending"
            );
            return false;
        }

        debug!(
            location = %repository.location(),
            event = %event,
            "Scheduling file patch"
        );
        let identity = repository.key().clone();
        self.queue.enqueue(
            identity,
            blocking(format!("patch {}", file.display()), move |ctx| {
                // Already handled by a synchronous sync().
                if !repository.take_pending(&file) {
                    return UpdateOutcome::Completed;
                }
                repository
                    .patch_file(&file, ctx.cancellation_token())
                    .into()
            }),
        );
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        true
    }
}
