//! File event intake.
//!
//! [`PollingWatcher`] produces [`FileEvent`]s, [`EventRouter`] filters them
//! with a [`RelevanceFilter`] and turns them into queued patches plus change
//! notifications.

mod event;
mod filter;
mod router;
mod watcher;

pub use event::FileEvent;
pub use filter::{RelevanceFilter, DEFAULT_IGNORE_PATTERNS};
pub use router::{EventRouter, RouterStats};
pub use watcher::{PollingWatcher, DEFAULT_POLL_INTERVAL};
