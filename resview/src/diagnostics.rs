//! Rate-limited failure logging.
//!
//! A source that fails to parse will usually fail again on every rescan until
//! the user fixes it. [`FailureLog`] logs the first failure for a key
//! immediately and then at most once per interval, reporting how many
//! repetitions were suppressed in between. Failures are never silenced
//! entirely.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

/// Default minimum time between two log lines for the same key.
pub const DEFAULT_FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct FailureState {
    last_logged: Instant,
    suppressed: u64,
    total: u64,
}

/// Per-key rate limiter for failure log lines.
#[derive(Debug)]
pub struct FailureLog {
    interval: Duration,
    states: Mutex<HashMap<String, FailureState>>,
}

impl FailureLog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether a failure for `key` should be logged now.
    ///
    /// Returns `Some(suppressed)` when the caller should log, where
    /// `suppressed` is the number of failures swallowed since the last
    /// logged one. Returns `None` when the failure is rate-limited.
    pub fn should_log(&self, key: &str, now: Instant) -> Option<u64> {
        let mut states = self.states.lock();
        match states.get_mut(key) {
            None => {
                states.insert(
                    key.to_string(),
                    FailureState {
                        last_logged: now,
                        suppressed: 0,
                        total: 1,
                    },
                );
                Some(0)
            }
            Some(state) => {
                state.total += 1;
                if now.saturating_duration_since(state.last_logged) >= self.interval {
                    let suppressed = state.suppressed;
                    state.suppressed = 0;
                    state.last_logged = now;
                    Some(suppressed)
                } else {
                    state.suppressed += 1;
                    None
                }
            }
        }
    }

    /// Record a failure and emit a `warn!` line unless rate-limited.
    pub fn record(&self, key: &str, context: &str, error: &dyn std::fmt::Display) {
        if let Some(suppressed) = self.should_log(key, Instant::now()) {
            warn!(source = key, suppressed, error = %error, "{}", context);
        }
    }

    /// Forget the failure history of a key (e.g. after it succeeded again).
    pub fn clear(&self, key: &str) {
        self.states.lock().remove(key);
    }

    /// Total failures recorded for a key, including suppressed ones.
    pub fn total_failures(&self, key: &str) -> u64 {
        self.states.lock().get(key).map(|s| s.total).unwrap_or(0)
    }
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_is_logged() {
        let log = FailureLog::new(Duration::from_secs(10));
        assert_eq!(log.should_log("a", Instant::now()), Some(0));
    }

    #[test]
    fn test_repeats_within_interval_are_suppressed() {
        let log = FailureLog::new(Duration::from_secs(10));
        let start = Instant::now();
        assert_eq!(log.should_log("a", start), Some(0));
        assert_eq!(log.should_log("a", start + Duration::from_secs(1)), None);
        assert_eq!(log.should_log("a", start + Duration::from_secs(2)), None);

        // Interval elapsed: logged again with the suppressed count
        assert_eq!(log.should_log("a", start + Duration::from_secs(11)), Some(2));
        assert_eq!(log.total_failures("a"), 4);
    }

    #[test]
    fn test_keys_are_independent() {
        let log = FailureLog::new(Duration::from_secs(10));
        let now = Instant::now();
        assert_eq!(log.should_log("a", now), Some(0));
        assert_eq!(log.should_log("b", now), Some(0));
        assert_eq!(log.should_log("a", now), None);
    }

    #[test]
    fn test_clear_resets_history() {
        let log = FailureLog::new(Duration::from_secs(10));
        let now = Instant::now();
        log.should_log("a", now);
        log.should_log("a", now);
        log.clear("a");
        assert_eq!(log.total_failures("a"), 0);
        assert_eq!(log.should_log("a", now), Some(0));
    }
}
