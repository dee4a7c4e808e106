//! Update actions and their execution context.
//!
//! An action is one unit of background work bound to a repository identity,
//! typically a rescan or a single-file patch. Actions consume themselves:
//! each runs at most once.
//!
//! # Example
//!
//! ```ignore
//! use resview::queue::{blocking, UpdateOutcome};
//!
//! let rescan = blocking("rescan", move |ctx| {
//!     repo.scan(ctx.cancellation_token()).into()
//! });
//! queue.enqueue(repo.key().clone(), rescan);
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::repository::RepositoryError;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How an action finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Completed,
    /// Stopped at a cooperative checkpoint; state left unchanged.
    Cancelled,
    Failed(String),
}

impl<T> From<Result<T, RepositoryError>> for UpdateOutcome {
    fn from(result: Result<T, RepositoryError>) -> Self {
        match result {
            Ok(_) => UpdateOutcome::Completed,
            Err(RepositoryError::Cancelled) => UpdateOutcome::Cancelled,
            Err(e) => UpdateOutcome::Failed(e.to_string()),
        }
    }
}

/// Context handed to a running action.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    identity: String,
    sequence: u64,
    enqueued_at: Instant,
    cancel: CancellationToken,
}

impl UpdateContext {
    pub(crate) fn new(
        identity: String,
        sequence: u64,
        enqueued_at: Instant,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            sequence,
            enqueued_at,
            cancel,
        }
    }

    /// Display form of the repository identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queue-wide sequence number of this update.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time between enqueue and start.
    pub fn queued_for(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Whether the action should stop at its next checkpoint.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Background work bound to one repository identity.
pub trait UpdateAction: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run the action.
    ///
    /// Long-running actions should check [`UpdateContext::is_cancelled`] and
    /// return [`UpdateOutcome::Cancelled`] without publishing partial state.
    fn execute(self: Box<Self>, ctx: UpdateContext) -> BoxFuture<'static, UpdateOutcome>;
}

impl fmt::Debug for dyn UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateAction").field("name", &self.name()).finish()
    }
}

// =============================================================================
// Closure adapters
// =============================================================================

/// Action built from an async closure.
pub struct AsyncFnAction<F> {
    name: String,
    f: F,
}

impl<F, Fut> UpdateAction for AsyncFnAction<F>
where
    F: FnOnce(UpdateContext) -> Fut + Send + 'static,
    Fut: Future<Output = UpdateOutcome> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(self: Box<Self>, ctx: UpdateContext) -> BoxFuture<'static, UpdateOutcome> {
        Box::pin((self.f)(ctx))
    }
}

/// Wrap an async closure as an action.
pub fn action<F, Fut>(name: impl Into<String>, f: F) -> AsyncFnAction<F>
where
    F: FnOnce(UpdateContext) -> Fut + Send + 'static,
    Fut: Future<Output = UpdateOutcome> + Send + 'static,
{
    AsyncFnAction {
        name: name.into(),
        f,
    }
}

/// Action running a blocking closure on tokio's blocking pool.
pub struct BlockingAction<F> {
    name: String,
    f: F,
}

impl<F> UpdateAction for BlockingAction<F>
where
    F: FnOnce(&UpdateContext) -> UpdateOutcome + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(self: Box<Self>, ctx: UpdateContext) -> BoxFuture<'static, UpdateOutcome> {
        let f = self.f;
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || f(&ctx)).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => UpdateOutcome::Failed("action panicked".to_string()),
                Err(e) => UpdateOutcome::Failed(e.to_string()),
            }
        })
    }
}

/// Wrap a blocking closure (parsing, file I/O) as an action.
pub fn blocking<F>(name: impl Into<String>, f: F) -> BlockingAction<F>
where
    F: FnOnce(&UpdateContext) -> UpdateOutcome + Send + 'static,
{
    BlockingAction {
        name: name.into(),
        f,
    }
}
