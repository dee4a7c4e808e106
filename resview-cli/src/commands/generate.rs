//! Generate command - print a derived `R` class for a package.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use resview::artifacts::DerivedKey;
use resview::ids::SymbolTable;
use resview::repository::ResourceRepository;

use super::common::{lookup_namespace, registry_keys};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the generate command.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Class to generate: `<package>.R` or `<package>.R$<type>`
    pub class: String,

    /// Resource folders of the package, highest precedence first
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Compiled symbol table (R.txt) whose ids take precedence
    #[arg(long)]
    pub symbols: Option<PathBuf>,

    /// Package namespace of the folders (flat when omitted)
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run the generate command.
pub fn run(args: GenerateArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("generate");
    let package = DerivedKey::parse(&args.class)
        .map(|key| key.package)
        .ok_or_else(|| {
            CliError::Config(format!(
                "'{}' is not an R class name (expected <package>.R or <package>.R$<type>)",
                args.class
            ))
        })?;
    let keys = registry_keys(&args.paths, args.namespace.as_deref())?;

    let engine = runner.start_engine()?;
    if let Some(path) = &args.symbols {
        let table = SymbolTable::load(path, &lookup_namespace(args.namespace.as_deref()))?;
        engine.load_compiled_ids(&table);
    }

    let composite = runner.block_on(engine.compose(&package, &keys, &[], Vec::new()))?;
    let scope: Arc<dyn ResourceRepository> = composite;
    engine.register_class_generator(&package, &scope);

    let result = engine.generate(&args.class);
    engine.shutdown();

    match result? {
        Some(payload) => {
            print!("{}", payload.content);
            Ok(())
        }
        None => Err(CliError::Config(format!(
            "Nothing to generate for '{}'",
            args.class
        ))),
    }
}
