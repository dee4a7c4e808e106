//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use resview::model::{Namespacing, RegistryKey, ResourceNamespace};

use crate::error::CliError;

/// Registry key for a resource folder, optionally under a package namespace.
pub fn registry_key(path: &Path, package: Option<&str>) -> Result<RegistryKey, CliError> {
    let location = absolute(path)?;
    let namespacing = match package {
        Some(package) => Namespacing::Namespaced(ResourceNamespace::from_package(package)),
        None => Namespacing::Flat,
    };
    Ok(RegistryKey::new(location, namespacing))
}

/// Registry keys for a list of folders sharing one namespacing mode.
pub fn registry_keys(paths: &[PathBuf], package: Option<&str>) -> Result<Vec<RegistryKey>, CliError> {
    paths.iter().map(|p| registry_key(p, package)).collect()
}

/// Namespace lookups should use for `package`.
pub fn lookup_namespace(package: Option<&str>) -> ResourceNamespace {
    package
        .map(ResourceNamespace::from_package)
        .unwrap_or_else(ResourceNamespace::res_auto)
}

/// Resource folders must exist; locations are keyed by absolute path so
/// file events and registry entries agree.
fn absolute(path: &Path) -> Result<PathBuf, CliError> {
    if !path.is_dir() {
        return Err(CliError::Config(format!(
            "Resource directory not found: {}",
            path.display()
        )));
    }
    path.canonicalize()
        .map_err(|e| CliError::Config(format!("Cannot resolve {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_registry_key_is_absolute() {
        let dir = TempDir::new().unwrap();
        let key = registry_key(dir.path(), None).unwrap();
        assert!(key.location.path().is_absolute());
        assert_eq!(key.namespacing, Namespacing::Flat);
    }

    #[test]
    fn test_registry_key_namespaced() {
        let dir = TempDir::new().unwrap();
        let key = registry_key(dir.path(), Some("com.lib")).unwrap();
        assert_eq!(key.namespacing.namespace(), ResourceNamespace::from_package("com.lib"));
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let result = registry_key(Path::new("/definitely/not/here"), None);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_lookup_namespace_defaults_to_res_auto() {
        assert!(lookup_namespace(None).is_res_auto());
        assert_eq!(lookup_namespace(Some("a.b")).package_name(), Some("a.b"));
    }
}
