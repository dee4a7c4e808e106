//! Handles to enqueued updates.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Final status of an enqueued update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The action ran to completion.
    Completed,
    /// Cancelled before it started, or stopped at a checkpoint.
    Cancelled,
    /// The action reported a failure or panicked.
    Failed(String),
    /// Superseded by a newer update before it started.
    Superseded,
    /// The queue shut down before the action could run.
    Shutdown,
}

impl UpdateStatus {
    /// Whether the action body actually ran to completion.
    pub fn is_completed(&self) -> bool {
        matches!(self, UpdateStatus::Completed)
    }
}

/// Handle to one enqueued update.
///
/// Dropping the handle does not cancel the update.
#[derive(Debug)]
pub struct UpdateHandle {
    sequence: u64,
    cancel: CancellationToken,
    done: oneshot::Receiver<UpdateStatus>,
}

impl UpdateHandle {
    pub(crate) fn new(
        sequence: u64,
        cancel: CancellationToken,
        done: oneshot::Receiver<UpdateStatus>,
    ) -> Self {
        Self {
            sequence,
            cancel,
            done,
        }
    }

    /// A handle that is already resolved.
    pub(crate) fn resolved(sequence: u64, status: UpdateStatus) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(status);
        Self::new(sequence, CancellationToken::new(), rx)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Request cancellation.
    ///
    /// A queued update is skipped; a running one sees the request at its
    /// next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the update to finish.
    pub async fn wait(self) -> UpdateStatus {
        // The sender is only dropped without sending if the runtime went away
        self.done.await.unwrap_or(UpdateStatus::Shutdown)
    }
}
