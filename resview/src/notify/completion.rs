//! Completion counter.
//!
//! Starts at one (held by the creator), gains one per dependent operation
//! and fires its callback exactly once when the count returns to zero:
//!
//! ```text
//!   new()          1   creator's guard
//!   retain() ×2    3   one guard per dependent update
//!   drop creator   2
//!   update done    1
//!   update done    0 → fire
//! ```
//!
//! Counts are held by [`CompletionGuard`]s, so a dependent that panics or is
//! dropped still releases its share.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

/// Counter firing a callback when all holders are done.
pub struct CompletionCounter {
    count: AtomicUsize,
    on_zero: Mutex<Option<Callback>>,
}

impl CompletionCounter {
    /// Create a counter at one, returning the creator's guard.
    pub fn new(on_zero: impl FnOnce() + Send + 'static) -> CompletionGuard {
        let counter = Arc::new(Self {
            count: AtomicUsize::new(1),
            on_zero: Mutex::new(Some(Box::new(on_zero))),
        });
        CompletionGuard { counter }
    }

    fn release(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let callback = self.on_zero.lock().take();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// One share of a [`CompletionCounter`]; released on drop.
pub struct CompletionGuard {
    counter: Arc<CompletionCounter>,
}

impl CompletionGuard {
    /// Take another share for a dependent operation.
    pub fn retain(&self) -> CompletionGuard {
        self.counter.count.fetch_add(1, Ordering::AcqRel);
        CompletionGuard {
            counter: Arc::clone(&self.counter),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.counter.count()
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_fires_when_creator_releases_without_dependents() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let guard = CompletionCounter::new(move || flag.store(true, Ordering::SeqCst));
        assert_eq!(guard.outstanding(), 1);
        drop(guard);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_waits_for_every_dependent() {
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&fired);
        let creator = CompletionCounter::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        let a = creator.retain();
        let b = creator.retain();
        assert_eq!(creator.outstanding(), 3);

        drop(creator);
        drop(a);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_released_by_panicking_thread() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let creator = CompletionCounter::new(move || flag.store(true, Ordering::SeqCst));
        let share = creator.retain();
        let worker = std::thread::spawn(move || {
            let _share = share;
            panic!("dependent failed");
        });
        assert!(worker.join().is_err());
        drop(creator);
        assert!(fired.load(Ordering::SeqCst));
    }
}
