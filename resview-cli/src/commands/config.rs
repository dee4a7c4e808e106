//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path` commands
//! for viewing and modifying `~/.resview/config.ini` from the command line.

use clap::Subcommand;
use console::style;
use resview::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., queue.workers)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., queue.workers)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'resview config list' to see available keys.",
            key
        ))
    })
}

/// Print one value, or a placeholder for unset optional keys.
fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// Get a configuration value.
fn run_get(key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load()?;
    println!("{}", display_value(&config_key.get(&config)));
    Ok(())
}

/// Set a configuration value after validating it.
fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    config_key.set(&mut config, value)?;
    config.save()?;

    println!("Set {} = {}", config_key.name(), config_key.get(&config));
    Ok(())
}

/// List all configuration settings grouped by section.
fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let width = ConfigKey::all()
        .iter()
        .map(|k| k.key_name().len())
        .max()
        .unwrap_or(0);

    let mut section = None;
    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            if section.is_some() {
                println!();
            }
            println!("{}", style(format!("[{}]", key.section())).bold());
            section = Some(key.section());
        }
        println!(
            "  {:width$} = {}",
            key.key_name(),
            display_value(&key.get(&config)),
            width = width
        );
    }
    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}
