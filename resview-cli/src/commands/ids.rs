//! Ids command - inspect a compiled symbol table and dynamic allocation.

use std::path::PathBuf;

use clap::Args;
use console::style;

use resview::ids::{IdentifierAllocator, ResourceId, SymbolTable};
use resview::model::{ResourceKey, ResourceType};

use super::common::lookup_namespace;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the ids command.
#[derive(Debug, Args)]
pub struct IdsArgs {
    /// Compiled symbol table (R.txt)
    pub symbols: PathBuf,

    /// Resolve a numeric id (e.g. 0x7f0e0001) to its resource
    #[arg(long = "resolve")]
    pub resolve: Vec<String>,

    /// Show the id a resource gets (type/name), allocating one if needed
    #[arg(long = "id-of")]
    pub id_of: Vec<String>,

    /// Package namespace the symbol table belongs to (flat when omitted)
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run the ids command.
pub fn run(args: IdsArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("ids");
    let namespace = lookup_namespace(args.namespace.as_deref());
    let table = SymbolTable::load(&args.symbols, &namespace)?;

    let allocator = IdentifierAllocator::with_dynamic_package(runner.config().ids.dynamic_package);
    allocator.reset_compiled(&table);

    println!("Symbols: {}", args.symbols.display());
    println!("  Compiled ids:    {}", allocator.compiled_count());
    println!("  Dynamic package: 0x{:02x}", allocator.dynamic_package());

    if !args.resolve.is_empty() {
        println!();
        for raw in &args.resolve {
            let id: ResourceId = raw.parse()?;
            match allocator.resolve(id) {
                Some(key) => println!("  {} → {}", id, style(key).green()),
                None => println!("  {} → {}", id, style("unknown").red()),
            }
        }
    }

    if !args.id_of.is_empty() {
        println!();
        for entry in &args.id_of {
            let key = parse_key(entry, &args)?;
            let compiled = allocator.compiled_id(&key).is_some();
            let id = allocator.dynamic_id(&key)?;
            let origin = if compiled { "compiled" } else { "dynamic" };
            println!("  {} = {} ({})", key, style(id).bold(), origin);
        }
    }
    Ok(())
}

/// Parse `type/name` into a key in the command's namespace.
fn parse_key(entry: &str, args: &IdsArgs) -> Result<ResourceKey, CliError> {
    let (ty, name) = entry
        .split_once('/')
        .ok_or_else(|| CliError::Config(format!("Expected type/name, got '{}'", entry)))?;
    let ty: ResourceType = ty.parse().map_err(|e| CliError::Config(format!("{}", e)))?;
    Ok(ResourceKey::new(
        lookup_namespace(args.namespace.as_deref()),
        ty,
        name,
    ))
}
