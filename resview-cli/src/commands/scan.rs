//! Scan command - build repositories for resource folders and summarize them.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::common::registry_keys;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the scan command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Resource folders to scan
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Place resources in this package namespace instead of the flat one
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run the scan command.
pub fn run(args: ScanArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("scan");
    let keys = registry_keys(&args.paths, args.namespace.as_deref())?;
    let engine = runner.start_engine()?;

    let progress = ProgressBar::new(keys.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    progress.enable_steady_tick(Duration::from_millis(100));

    let mut repositories = Vec::with_capacity(keys.len());
    for key in &keys {
        progress.set_message(key.location.to_string());
        let repo = runner.block_on(engine.repository(key));
        progress.inc(1);
        repositories.push((key, repo));
    }
    progress.finish_and_clear();

    println!("{}", style("Scan Results").bold());
    println!();
    let mut failures = 0;
    for (key, repo) in &repositories {
        match repo {
            Ok(repo) => {
                let snapshot = repo.snapshot();
                let namespace = snapshot.namespace().clone();
                let types: Vec<String> = snapshot
                    .types_present(&namespace)
                    .iter()
                    .map(|t| t.to_string())
                    .collect();
                println!("{}", style(key).cyan());
                println!("  Records:    {}", snapshot.record_count());
                println!("  Keys:       {}", snapshot.key_count());
                println!("  Generation: {}", snapshot.generation());
                println!("  Types:      {}", types.join(", "));
            }
            Err(e) => {
                failures += 1;
                println!("{} {}", style(key).red(), e);
            }
        }
    }

    let stats = engine.registry().stats();
    println!();
    println!(
        "Registry: {} constructed, {} restored, {} cached",
        stats.constructions, stats.restored, stats.hits
    );
    engine.shutdown();

    if failures > 0 {
        return Err(CliError::Config(format!(
            "{} of {} folders could not be scanned",
            failures,
            keys.len()
        )));
    }
    Ok(())
}
