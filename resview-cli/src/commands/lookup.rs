//! Lookup command - resolve one resource through a merged view.

use std::path::PathBuf;

use clap::Args;
use console::style;

use resview::model::ResourceType;
use resview::repository::ResourceRepository;

use super::common::{lookup_namespace, registry_keys};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the lookup command.
#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Resource type (e.g. string, color, drawable)
    pub resource_type: String,

    /// Resource name
    pub name: String,

    /// Primary resource folders, highest precedence first
    #[arg(long = "primary", required = true)]
    pub primary: Vec<PathBuf>,

    /// Library resource folders, shadowed by primary folders
    #[arg(long = "library")]
    pub library: Vec<PathBuf>,

    /// Package namespace of the folders (flat when omitted)
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run the lookup command.
pub fn run(args: LookupArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("lookup");
    let ty: ResourceType = args
        .resource_type
        .parse()
        .map_err(|e| CliError::Config(format!("{}", e)))?;
    let package = args.namespace.as_deref();
    let primary = registry_keys(&args.primary, package)?;
    let library = registry_keys(&args.library, package)?;

    let engine = runner.start_engine()?;
    let composite =
        runner.block_on(engine.compose("lookup", &primary, &library, Vec::new()))?;
    let records = composite
        .lookup(&lookup_namespace(package), ty, &args.name)
        .map_err(|e| CliError::Engine(e.into()))?;

    if records.is_empty() {
        println!("{} {}/{} not found", style("✗").red(), ty, args.name);
    } else {
        println!("{} {}/{}", style("✓").green(), ty, args.name);
        for record in records.iter() {
            let qualifiers = if record.qualifiers.is_empty() {
                "default".to_string()
            } else {
                record.qualifiers.clone()
            };
            let source = record
                .origin
                .file
                .as_ref()
                .map(|f| f.display().to_string())
                .unwrap_or_else(|| record.origin.location.to_string());
            println!(
                "  [{}] {}  {}",
                qualifiers,
                style(&record.value).bold(),
                style(source).dim()
            );
        }
    }

    engine.shutdown();
    Ok(())
}
