//! Per-identity FIFO update queue over a bounded worker pool.
//!
//! ```text
//!  enqueue(id, action)          lanes (DashMap)                 workers
//!  ───────────────────►  ┌──────────────────────────┐     ┌──────────────┐
//!   never blocks         │ id A: [a1, a2, a3] ▶ run │ ──► │ semaphore    │
//!                        │ id B: [b1]         ▶ run │ ──► │ (N permits)  │
//!                        │ id C: []             idle│     └──────────────┘
//!                        └──────────────────────────┘
//! ```
//!
//! Each identity has a lane drained by at most one task at a time, so
//! updates for the same identity run one after another in enqueue order.
//! Different identities run in parallel, bounded by the worker semaphore.
//!
//! Every update gets a child of the queue's shutdown token. Cancelling an
//! update before it starts skips it; cancelling a running update is
//! cooperative. A failing or panicking action is logged and the lane moves
//! on to the next update.

use std::collections::VecDeque;
use std::fmt::Display;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::action::{UpdateAction, UpdateContext, UpdateOutcome};
use super::handle::{UpdateHandle, UpdateStatus};

// =============================================================================
// Sequence Number Generator
// =============================================================================

/// Global sequence counter for updates.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Configuration and errors
// =============================================================================

/// Update queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of actions running at once across all identities.
    pub workers: usize,
}

impl QueueConfig {
    /// Worker count matching the available parallelism.
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
        }
    }
}

/// Update queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Update queue requires a running tokio runtime")]
    NoRuntime,

    #[error("Update queue has been shut down")]
    ShutDown,
}

// =============================================================================
// Lanes
// =============================================================================

/// A queued update. Lanes live in a shared map, so the action sits behind a
/// mutex; it is only ever taken by the draining task.
struct PendingUpdate {
    sequence: u64,
    action: Mutex<Box<dyn UpdateAction>>,
    supersede_key: Option<String>,
    cancel: CancellationToken,
    done: oneshot::Sender<UpdateStatus>,
    enqueued_at: Instant,
}

impl PendingUpdate {
    fn finish(self, status: UpdateStatus) {
        // The handle may have been dropped; nobody is waiting then
        let _ = self.done.send(status);
    }
}

#[derive(Default)]
struct Lane {
    queue: VecDeque<PendingUpdate>,
    running: bool,
}

/// Counters of queue activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub superseded: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
}

struct Inner<K> {
    lanes: DashMap<K, Lane>,
    workers: Arc<Semaphore>,
    runtime: Handle,
    shutdown: CancellationToken,
    outstanding: AtomicUsize,
    idle: Notify,
    counters: Counters,
}

// =============================================================================
// Update queue
// =============================================================================

/// Background update queue keyed by repository identity.
pub struct UpdateQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for UpdateQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> UpdateQueue<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    /// Create a queue spawning its work on `runtime`.
    pub fn new(config: QueueConfig, runtime: Handle) -> Self {
        let workers = config.workers.max(1);
        debug!(workers, "Creating update queue");
        Self {
            inner: Arc::new(Inner {
                lanes: DashMap::new(),
                workers: Arc::new(Semaphore::new(workers)),
                runtime,
                shutdown: CancellationToken::new(),
                outstanding: AtomicUsize::new(0),
                idle: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a queue on the current tokio runtime.
    pub fn current(config: QueueConfig) -> Result<Self, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(Self::new(config, runtime))
    }

    /// Enqueue an action for `identity`. Never blocks.
    pub fn enqueue(&self, identity: K, action: impl UpdateAction) -> UpdateHandle {
        self.push(identity, Box::new(action), None)
    }

    /// Enqueue an action, dropping queued (not yet running) updates for the
    /// same identity that carry the same `supersede_key`.
    pub fn enqueue_superseding(
        &self,
        identity: K,
        supersede_key: impl Into<String>,
        action: impl UpdateAction,
    ) -> UpdateHandle {
        self.push(identity, Box::new(action), Some(supersede_key.into()))
    }

    /// Enqueue, failing instead of resolving the handle if shut down.
    pub fn try_enqueue(
        &self,
        identity: K,
        action: impl UpdateAction,
    ) -> Result<UpdateHandle, QueueError> {
        if self.is_shut_down() {
            return Err(QueueError::ShutDown);
        }
        Ok(self.enqueue(identity, action))
    }

    fn push(
        &self,
        identity: K,
        action: Box<dyn UpdateAction>,
        supersede_key: Option<String>,
    ) -> UpdateHandle {
        let sequence = next_sequence();
        if self.inner.shutdown.is_cancelled() {
            warn!(identity = %identity, action = action.name(), "Update enqueued after shutdown");
            return UpdateHandle::resolved(sequence, UpdateStatus::Shutdown);
        }

        let cancel = self.inner.shutdown.child_token();
        let (tx, rx) = oneshot::channel();
        let update = PendingUpdate {
            sequence,
            action: Mutex::new(action),
            supersede_key,
            cancel: cancel.clone(),
            done: tx,
            enqueued_at: Instant::now(),
        };

        self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);

        let mut superseded = Vec::new();
        let start_drain = {
            let mut lane = self.inner.lanes.entry(identity.clone()).or_default();
            if let Some(key) = &update.supersede_key {
                let mut kept = VecDeque::with_capacity(lane.queue.len());
                for queued in lane.queue.drain(..) {
                    if queued.supersede_key.as_ref() == Some(key) {
                        superseded.push(queued);
                    } else {
                        kept.push_back(queued);
                    }
                }
                lane.queue = kept;
            }
            trace!(identity = %identity, sequence, action = update.action.lock().name(), "Enqueued update");
            lane.queue.push_back(update);
            if lane.running {
                false
            } else {
                lane.running = true;
                true
            }
        };

        for dropped in superseded {
            debug!(identity = %identity, sequence = dropped.sequence, "Update superseded");
            self.inner.counters.superseded.fetch_add(1, Ordering::Relaxed);
            dropped.finish(UpdateStatus::Superseded);
            self.inner.finish_one();
        }

        if start_drain {
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(drain(inner, identity));
        }

        UpdateHandle::new(sequence, cancel, rx)
    }

    /// Wait until everything enqueued for `identity` so far has finished.
    pub async fn barrier(&self, identity: K) -> UpdateStatus {
        self.enqueue(
            identity,
            super::action::action("barrier", |_| async { UpdateOutcome::Completed }),
        )
        .wait()
        .await
    }

    /// Wait until no update is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of updates queued or running.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Number of updates queued (not running) for `identity`.
    pub fn queued_for(&self, identity: &K) -> usize {
        self.inner
            .lanes
            .get(identity)
            .map(|lane| lane.queue.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.inner.counters;
        QueueStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            superseded: c.superseded.load(Ordering::Relaxed),
        }
    }

    /// Token cancelled on shutdown; parent of every update's token.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting work, cancel running updates and resolve queued ones
    /// as [`UpdateStatus::Shutdown`].
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        debug!(outstanding = self.outstanding(), "Shutting down update queue");
        self.inner.shutdown.cancel();
    }
}

impl<K> Inner<K> {
    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Drain one identity's lane until it is empty.
async fn drain<K>(inner: Arc<Inner<K>>, identity: K)
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    loop {
        let update = {
            let Some(mut lane) = inner.lanes.get_mut(&identity) else {
                return;
            };
            match lane.queue.pop_front() {
                Some(update) => update,
                None => {
                    lane.running = false;
                    drop(lane);
                    inner
                        .lanes
                        .remove_if(&identity, |_, lane| !lane.running && lane.queue.is_empty());
                    return;
                }
            }
        };

        let PendingUpdate {
            sequence,
            action,
            cancel,
            done,
            enqueued_at,
            ..
        } = update;

        let action = action.into_inner();
        let status = execute(&inner, &identity, sequence, action, cancel, enqueued_at).await;
        let _ = done.send(status);
        inner.finish_one();
    }
}

/// Run one update once a worker permit is available.
async fn execute<K: Display>(
    inner: &Inner<K>,
    identity: &K,
    sequence: u64,
    action: Box<dyn UpdateAction>,
    cancel: CancellationToken,
    enqueued_at: Instant,
) -> UpdateStatus {
    let name = action.name().to_string();
    let counters = &inner.counters;

    let skipped = |status: UpdateStatus| {
        counters.cancelled.fetch_add(1, Ordering::Relaxed);
        debug!(identity = %identity, sequence, action = %name, status = ?status, "Update skipped");
        status
    };

    if inner.shutdown.is_cancelled() {
        return skipped(UpdateStatus::Shutdown);
    }
    if cancel.is_cancelled() {
        return skipped(UpdateStatus::Cancelled);
    }

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let status = if inner.shutdown.is_cancelled() {
                UpdateStatus::Shutdown
            } else {
                UpdateStatus::Cancelled
            };
            return skipped(status);
        }
        permit = Arc::clone(&inner.workers).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return skipped(UpdateStatus::Shutdown),
        },
    };

    let ctx = UpdateContext::new(identity.to_string(), sequence, enqueued_at, cancel);
    let started = Instant::now();
    trace!(identity = %identity, sequence, action = %name, "Update started");

    let outcome = AssertUnwindSafe(async move { action.execute(ctx).await })
        .catch_unwind()
        .await;
    drop(permit);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(UpdateOutcome::Completed) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
            trace!(identity = %identity, sequence, action = %name, elapsed_ms, "Update completed");
            UpdateStatus::Completed
        }
        Ok(UpdateOutcome::Cancelled) => {
            counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(identity = %identity, sequence, action = %name, elapsed_ms, "Update cancelled");
            UpdateStatus::Cancelled
        }
        Ok(UpdateOutcome::Failed(message)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(identity = %identity, sequence, action = %name, error = %message, "Update failed");
            UpdateStatus::Failed(message)
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(identity = %identity, sequence, action = %name, "Update panicked");
            UpdateStatus::Failed("action panicked".to_string())
        }
    }
}
