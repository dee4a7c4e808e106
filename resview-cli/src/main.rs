//! resview CLI - inspect and watch merged resource repositories.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::generate::GenerateArgs;
use commands::ids::IdsArgs;
use commands::lookup::LookupArgs;
use commands::scan::ScanArgs;
use commands::watch::WatchArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "resview", version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan resource folders and summarize their contents
    Scan(ScanArgs),

    /// Look up one resource through a merged view of folders
    Lookup(LookupArgs),

    /// Inspect a compiled symbol table (R.txt) and id allocation
    Ids(IdsArgs),

    /// Print a generated R class for a package
    Generate(GenerateArgs),

    /// Watch folders and report change notifications until Ctrl+C
    Watch(WatchArgs),

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    // Config commands work on the file alone and stay quiet.
    if let Commands::Config { command } = cli.command {
        return commands::config::run(command);
    }

    let runner = CliRunner::new(cli.log_level.as_deref())?;
    match cli.command {
        Commands::Scan(args) => commands::scan::run(args, &runner),
        Commands::Lookup(args) => commands::lookup::run(args, &runner),
        Commands::Ids(args) => commands::ids::run(args, &runner),
        Commands::Generate(args) => commands::generate::run(args, &runner),
        Commands::Watch(args) => commands::watch::run(args, &runner),
        Commands::Config { .. } => Ok(()),
    }
}
