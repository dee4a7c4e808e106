//! Change notification.
//!
//! [`ChangeNotifier`] coalesces change events per tick, waits for the
//! location-scoped updates they triggered and delivers one batch of
//! [`ReasonSet`]s to each listener on a single delivery task. Listeners whose
//! [`VersionStamp`] did not move are skipped for plain resource edits.

mod completion;
mod listener;
mod notifier;
mod reason;
mod stamp;

pub use completion::{CompletionCounter, CompletionGuard};
pub use listener::{ChangeListener, ListenerScope};
pub use notifier::{
    ChangeNotifier, LocationBarrier, NotifierConfig, NotifierStats, DEFAULT_TICK,
};
pub use reason::{Reason, ReasonSet};
pub use stamp::VersionStamp;
