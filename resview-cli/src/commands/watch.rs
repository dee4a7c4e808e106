//! Watch command - keep a merged view live and report change batches.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::info;

use resview::events::{PollingWatcher, DEFAULT_POLL_INTERVAL};
use resview::notify::{ChangeListener, ListenerScope, ReasonSet};
use resview::repository::{RepositoryRef, ResourceRepository};

use super::common::registry_keys;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the watch command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Primary resource folders to watch, highest precedence first
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Library resource folders to watch, shadowed by primary folders
    #[arg(long = "library")]
    pub library: Vec<PathBuf>,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub interval: u64,

    /// Package namespace of the folders (flat when omitted)
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run the watch command until Ctrl+C.
pub fn run(args: WatchArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("watch");
    let package = args.namespace.as_deref();
    let primary = registry_keys(&args.paths, package)?;
    let library = registry_keys(&args.library, package)?;

    let engine = runner.start_engine()?;
    let composite = runner.block_on(engine.compose("watch", &primary, &library, Vec::new()))?;

    let mut watcher = PollingWatcher::new(Duration::from_millis(args.interval.max(1)));
    for key in primary.iter().chain(&library) {
        watcher
            .watch(key.location.path())
            .map_err(|e| CliError::Watch(format!("{}: {}", key.location, e)))?;
    }

    let observed = Arc::clone(&composite);
    let listener: Arc<dyn ChangeListener> = Arc::new(move |reasons: ReasonSet| {
        println!(
            "{} {}  generation {}",
            style("changed").yellow().bold(),
            reasons,
            observed.generation()
        );
    });
    let scope = ListenerScope::repository(composite.clone() as RepositoryRef);
    engine.subscribe(scope.clone(), Arc::clone(&listener));

    println!("Watching {} folder(s)", primary.len() + library.len());
    println!("  Poll interval: {} ms", args.interval);
    println!("  Tracked files: {}", watcher.tracked_files());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let watcher_task = engine.spawn_watcher(watcher);
    runner.block_on(shutdown.cancelled());

    let stats = engine.router().stats();
    info!(
        events = stats.events,
        scheduled = stats.scheduled,
        "Watch stopped"
    );
    engine.unsubscribe(&scope, &listener);
    runner.block_on(engine.drain());
    engine.shutdown();
    let _ = runner.block_on(watcher_task);

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  File events:     {}", stats.events);
    println!("  Ignored:         {}", stats.ignored);
    println!("  Updates queued:  {}", stats.scheduled);
    println!("  Deduplicated:    {}", stats.deduplicated);
    Ok(())
}
