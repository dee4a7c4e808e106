//! Background update queue.
//!
//! Repository updates (rescans, single-file patches) are enqueued against a
//! repository identity and run later on a bounded worker pool. Updates for
//! one identity never overlap and always run in enqueue order.

mod action;
mod handle;
#[allow(clippy::module_inception)]
mod queue;

pub use action::{
    action, blocking, AsyncFnAction, BlockingAction, BoxFuture, UpdateAction, UpdateContext,
    UpdateOutcome,
};
pub use handle::{UpdateHandle, UpdateStatus};
pub use queue::{QueueConfig, QueueError, QueueStats, UpdateQueue};
