//! Polling file watcher.
//!
//! Walks each tracked root on an interval and diffs file size and mtime
//! against the previous walk. Coarse, but needs no platform support.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::FileEvent;
use super::router::EventRouter;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileState {
    len: u64,
    modified: Option<SystemTime>,
}

/// Produces [`FileEvent`]s by polling directories.
#[derive(Debug)]
pub struct PollingWatcher {
    interval: Duration,
    roots: Vec<PathBuf>,
    files: HashMap<PathBuf, FileState>,
}

impl PollingWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            roots: Vec::new(),
            files: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn tracked_files(&self) -> usize {
        self.files.len()
    }

    /// Start tracking `root`. Files already present produce no events.
    pub fn watch(&mut self, root: impl Into<PathBuf>) -> io::Result<()> {
        let root = root.into();
        if self.roots.contains(&root) {
            return Ok(());
        }
        let mut found = HashMap::new();
        walk(&root, &mut found)?;
        debug!(root = %root.display(), files = found.len(), "Watching directory");
        self.files.extend(found);
        self.roots.push(root);
        Ok(())
    }

    /// Stop tracking `root` and forget its files.
    pub fn unwatch(&mut self, root: &Path) -> bool {
        let before = self.roots.len();
        self.roots.retain(|r| r != root);
        self.files.retain(|path, _| !path.starts_with(root));
        self.roots.len() != before
    }

    /// Walk every root once and report what changed since the last poll.
    pub fn poll(&mut self) -> Vec<FileEvent> {
        let mut current = HashMap::with_capacity(self.files.len());
        for root in &self.roots {
            if let Err(e) = walk(root, &mut current) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(root = %root.display(), error = %e, "Failed to poll directory");
                    // Keep the previous view of an unreadable root.
                    for (path, state) in &self.files {
                        if path.starts_with(root) {
                            current.insert(path.clone(), *state);
                        }
                    }
                }
            }
        }

        let mut events = Vec::new();
        for (path, state) in &current {
            match self.files.get(path) {
                None => events.push(FileEvent::Created(path.clone())),
                Some(previous) if previous != state => events.push(FileEvent::Changed(path.clone())),
                Some(_) => {}
            }
        }
        for path in self.files.keys() {
            if !current.contains_key(path) {
                events.push(FileEvent::Removed(path.clone()));
            }
        }
        events.sort_by(|a, b| a.path().cmp(b.path()));

        self.files = current;
        events
    }

    /// Poll until cancelled, routing every event.
    pub async fn run(mut self, router: Arc<EventRouter>, cancel: CancellationToken) {
        info!(
            roots = self.roots.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Polling watcher started"
        );
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    let events = self.poll();
                    if !events.is_empty() {
                        let scheduled = router.route_all(&events);
                        debug!(events = events.len(), scheduled, "Routed polled changes");
                    }
                }
            }
        }
        info!("Polling watcher stopped");
    }
}

impl Default for PollingWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

fn walk(dir: &Path, out: &mut HashMap<PathBuf, FileState>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Removed between listing and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if metadata.is_dir() {
            match walk(&path, out) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        } else {
            out.insert(
                path,
                FileState {
                    len: metadata.len(),
                    modified: metadata.modified().ok(),
                },
            );
        }
    }
    Ok(())
}
