//! Coalescing change notifier.
//!
//! ```text
//!  notify(reason, loc) ─┐
//!  notify(reason, loc) ─┼─► pending {reasons ∪, locations} ──tick──► batch
//!  notify(reason, ---) ─┘                                             │
//!                                        completion counter ◄─────────┤
//!                               (1 + one share per location barrier)  │
//!                                               │ reaches 0           │
//!                                               ▼                     │
//!                                    delivery task (single) ◄─────────┘
//!                                               │
//!                           for each listener: stamp moved? ──► call
//! ```
//!
//! Notifications arriving before the next tick are merged into one batch.
//! A batch is delivered only after the updates pending for its affected
//! locations have finished, as reported by a [`LocationBarrier`]. Delivery
//! runs on one task, so listeners are never called concurrently and never
//! from inside the code that triggered the notification.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::completion::CompletionCounter;
use super::listener::{ChangeListener, ListenerScope, Registration};
use super::reason::{Reason, ReasonSet};
use super::stamp::VersionStamp;
use crate::model::LocationKey;
use crate::queue::{BoxFuture, QueueError};

/// Default coalescing tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Notifier configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Delay between the first notification of a batch and its delivery.
    pub tick: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { tick: DEFAULT_TICK }
    }
}

/// Waits for the updates pending on a location.
pub trait LocationBarrier: Send + Sync {
    /// Resolve once every update enqueued for `location` so far has finished.
    fn wait_for(&self, location: &LocationKey) -> BoxFuture<'static, ()>;
}

/// Counters of notifier activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    pub notifications: u64,
    pub batches: u64,
    pub invocations: u64,
    pub skipped: u64,
    pub listener_failures: u64,
}

#[derive(Default)]
struct Counters {
    notifications: AtomicU64,
    batches: AtomicU64,
    invocations: AtomicU64,
    skipped: AtomicU64,
    listener_failures: AtomicU64,
}

#[derive(Default)]
struct Pending {
    reasons: ReasonSet,
    locations: Vec<LocationKey>,
    changes: ConfigurationChanges,
    scheduled: bool,
}

/// Which configurations a batch's `ConfigurationChanged` applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ConfigurationChanges {
    all: bool,
    named: Vec<String>,
}

impl ConfigurationChanges {
    fn record(&mut self, configuration: Option<String>) {
        match configuration {
            None => self.all = true,
            Some(name) => {
                if !self.named.contains(&name) {
                    self.named.push(name);
                }
            }
        }
    }

    fn affects(&self, scope: &ListenerScope) -> bool {
        match &scope.configuration {
            None => true,
            Some(name) => self.all || self.named.contains(name),
        }
    }
}

#[derive(Default)]
struct Generations {
    files: Mutex<HashMap<PathBuf, u64>>,
    configuration: AtomicU64,
    configuration_manager: AtomicU64,
    other: AtomicU64,
}

struct Batch {
    reasons: ReasonSet,
    changes: ConfigurationChanges,
}

struct Inner {
    config: NotifierConfig,
    runtime: Handle,
    pending: Mutex<Pending>,
    listeners: RwLock<Arc<Vec<Arc<Registration>>>>,
    generations: Generations,
    barrier: RwLock<Option<Arc<dyn LocationBarrier>>>,
    deliveries: mpsc::UnboundedSender<Batch>,
    in_flight: AtomicUsize,
    idle: Notify,
    counters: Counters,
    shutdown: CancellationToken,
}

/// Coalescing, single-context change notifier.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

impl ChangeNotifier {
    /// Create a notifier whose tick and delivery tasks run on `runtime`.
    pub fn new(config: NotifierConfig, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            runtime: runtime.clone(),
            pending: Mutex::new(Pending::default()),
            listeners: RwLock::new(Arc::new(Vec::new())),
            generations: Generations::default(),
            barrier: RwLock::new(None),
            deliveries: tx,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
        });
        runtime.spawn(delivery_loop(Arc::downgrade(&inner), rx, inner.shutdown.clone()));
        Self { inner }
    }

    /// Create a notifier on the current tokio runtime.
    pub fn current(config: NotifierConfig) -> Result<Self, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(Self::new(config, runtime))
    }

    /// Delay deliveries until location-scoped updates finish.
    pub fn set_barrier(&self, barrier: Arc<dyn LocationBarrier>) {
        *self.inner.barrier.write() = Some(barrier);
    }

    // =========================================================================
    // Listener registry
    // =========================================================================

    /// Register a listener and return the stamp it starts from.
    pub fn add_listener(
        &self,
        scope: ListenerScope,
        listener: Arc<dyn ChangeListener>,
    ) -> VersionStamp {
        let stamp = self.current_version(&scope);
        let registration = Arc::new(Registration {
            scope,
            listener,
            last_seen: Mutex::new(stamp),
        });
        let mut listeners = self.inner.listeners.write();
        let mut next = listeners.as_ref().clone();
        next.push(registration);
        *listeners = Arc::new(next);
        stamp
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, scope: &ListenerScope, listener: &Arc<dyn ChangeListener>) -> bool {
        let mut listeners = self.inner.listeners.write();
        let next: Vec<_> = listeners
            .iter()
            .filter(|r| !r.matches(scope, listener))
            .cloned()
            .collect();
        let removed = next.len() != listeners.len();
        *listeners = Arc::new(next);
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Compute the version stamp of `scope` now.
    pub fn current_version(&self, scope: &ListenerScope) -> VersionStamp {
        self.inner.current_version(scope)
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Record a change. Never calls listeners directly.
    ///
    /// A `ConfigurationChanged` recorded here reaches every listener; use
    /// [`ChangeNotifier::notify_configuration`] to reach only the listeners
    /// rendering with one configuration.
    pub fn notify(&self, reason: Reason, affected: Option<LocationKey>) {
        self.record(reason, affected, None);
    }

    /// Record a change of one named configuration.
    ///
    /// Listeners scoped to a different configuration do not see it.
    pub fn notify_configuration(&self, configuration: impl Into<String>) {
        self.record(Reason::ConfigurationChanged, None, Some(configuration.into()));
    }

    fn record(&self, reason: Reason, affected: Option<LocationKey>, configuration: Option<String>) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        inner.counters.notifications.fetch_add(1, Ordering::Relaxed);
        inner.bump_generations(reason, affected.as_ref());

        let schedule = {
            let mut pending = inner.pending.lock();
            pending.reasons.insert(reason);
            if reason == Reason::ConfigurationChanged {
                pending.changes.record(configuration);
            }
            if let Some(location) = affected {
                if !pending.locations.contains(&location) {
                    pending.locations.push(location);
                }
            }
            if pending.scheduled {
                false
            } else {
                pending.scheduled = true;
                true
            }
        };

        trace!(reason = %reason, scheduled = schedule, "Change notified");
        if schedule {
            inner.in_flight.fetch_add(1, Ordering::AcqRel);
            let task_inner = Arc::clone(inner);
            inner.runtime.spawn(async move {
                tokio::select! {
                    biased;
                    _ = task_inner.shutdown.cancelled() => {
                        task_inner.finish_batch();
                    }
                    _ = tokio::time::sleep(task_inner.config.tick) => {
                        Inner::fire(Arc::clone(&task_inner));
                    }
                }
            });
        }
    }

    /// Wait until no batch is pending or being delivered.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> NotifierStats {
        let c = &self.inner.counters;
        NotifierStats {
            notifications: c.notifications.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
            invocations: c.invocations.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            listener_failures: c.listener_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop delivering. Pending batches are discarded.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    fn current_version(&self, scope: &ListenerScope) -> VersionStamp {
        let file_stamp = scope
            .file
            .as_ref()
            .and_then(|file| self.generations.files.lock().get(file).copied())
            .unwrap_or(0);
        VersionStamp {
            repository_generation: scope
                .repository
                .as_ref()
                .map(|repo| repo.generation())
                .unwrap_or(0),
            file_stamp,
            configuration_generation: self.generations.configuration.load(Ordering::Acquire),
            configuration_manager_state: self
                .generations
                .configuration_manager
                .load(Ordering::Acquire),
            other_generation: self.generations.other.load(Ordering::Acquire),
        }
    }

    fn bump_generations(&self, reason: Reason, affected: Option<&LocationKey>) {
        let generations = &self.generations;
        match reason {
            Reason::ConfigurationChanged => {
                generations.configuration.fetch_add(1, Ordering::AcqRel);
            }
            Reason::SdkChanged => {
                generations.configuration_manager.fetch_add(1, Ordering::AcqRel);
            }
            Reason::Edit => {
                if let Some(location) = affected {
                    *generations
                        .files
                        .lock()
                        .entry(location.path().to_path_buf())
                        .or_insert(0) += 1;
                }
            }
            _ => {}
        }
        if reason.bumps_other_generation() {
            generations.other.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Take the pending batch and hand it to delivery once its location
    /// barriers complete.
    fn fire(inner: Arc<Inner>) {
        let (reasons, locations, changes) = {
            let mut pending = inner.pending.lock();
            pending.scheduled = false;
            (
                std::mem::take(&mut pending.reasons),
                std::mem::take(&mut pending.locations),
                std::mem::take(&mut pending.changes),
            )
        };

        if reasons.is_empty() {
            inner.finish_batch();
            return;
        }

        let sender = inner.deliveries.clone();
        let weak = Arc::downgrade(&inner);
        let creator = CompletionCounter::new(move || {
            if sender.send(Batch { reasons, changes }).is_err() {
                if let Some(inner) = weak.upgrade() {
                    inner.finish_batch();
                }
            }
        });

        let barrier = inner.barrier.read().clone();
        if let Some(barrier) = barrier {
            for location in &locations {
                let share = creator.retain();
                let wait = barrier.wait_for(location);
                inner.runtime.spawn(async move {
                    wait.await;
                    drop(share);
                });
            }
        }

        debug!(
            reasons = %reasons,
            locations = locations.len(),
            "Change batch waiting for location updates"
        );
        drop(creator);
    }

    fn finish_batch(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn deliver(&self, batch: Batch) {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        // Copy-on-iterate: listeners may be added or removed meanwhile
        let listeners = self.listeners.read().clone();

        for registration in listeners.iter() {
            let mut reasons = batch.reasons;
            if !batch.changes.affects(&registration.scope) {
                reasons.remove(Reason::ConfigurationChanged);
            }
            if reasons.is_empty() {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                trace!("Listener skipped; configuration not observed");
                continue;
            }

            let stamp = self.current_version(&registration.scope);
            {
                let mut last_seen = registration.last_seen.lock();
                if reasons.allows_short_circuit()
                    && registration.scope.repository.is_some()
                    && *last_seen == stamp
                {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    trace!(stamp = %stamp, "Listener skipped; nothing changed");
                    continue;
                }
                *last_seen = stamp;
            }

            let listener = Arc::clone(&registration.listener);
            let result = catch_unwind(AssertUnwindSafe(move || listener.resources_changed(reasons)));
            self.counters.invocations.fetch_add(1, Ordering::Relaxed);
            if result.is_err() {
                self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
                warn!(reasons = %reasons, "Change listener panicked");
            }
        }
    }
}

/// The single delivery context.
async fn delivery_loop(
    inner: std::sync::Weak<Inner>,
    mut batches: mpsc::UnboundedReceiver<Batch>,
    shutdown: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            batch = batches.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.deliver(batch);
        inner.finish_batch();
    }
    debug!("Change delivery stopped");
}
