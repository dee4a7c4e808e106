//! Source locations and registry keys.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::key::ResourceNamespace;

/// Identity of a resource source: a directory, an archive, or a synthetic
/// provider's root path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey(PathBuf);

impl LocationKey {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Whether `file` lives inside this location.
    pub fn contains(&self, file: &Path) -> bool {
        file.starts_with(&self.0)
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&Path> for LocationKey {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for LocationKey {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&str> for LocationKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<&PathBuf> for LocationKey {
    fn from(path: &PathBuf) -> Self {
        Self::new(path.clone())
    }
}

/// How a location's resources are namespaced.
///
/// The same physical location produces structurally different repositories
/// depending on the mode, so the registry caches them separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespacing {
    /// All resources live in the shared flat namespace.
    Flat,
    /// Resources live in the given package namespace.
    Namespaced(ResourceNamespace),
}

impl Namespacing {
    /// Namespace assigned to records parsed under this mode.
    pub fn namespace(&self) -> ResourceNamespace {
        match self {
            Namespacing::Flat => ResourceNamespace::res_auto(),
            Namespacing::Namespaced(ns) => ns.clone(),
        }
    }
}

impl fmt::Display for Namespacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespacing::Flat => f.write_str("flat"),
            Namespacing::Namespaced(ns) => write!(f, "namespaced({})", ns),
        }
    }
}

/// Cache key of the repository registry: location × namespacing mode.
///
/// Also serves as the repository identity used by the update queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryKey {
    pub location: LocationKey,
    pub namespacing: Namespacing,
}

impl RegistryKey {
    pub fn new(location: impl Into<LocationKey>, namespacing: Namespacing) -> Self {
        Self {
            location: location.into(),
            namespacing,
        }
    }

    pub fn flat(location: impl Into<LocationKey>) -> Self {
        Self::new(location, Namespacing::Flat)
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.location, self.namespacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_contains() {
        let location = LocationKey::new("/project/app/res");
        assert!(location.contains(Path::new("/project/app/res/values/strings.values")));
        assert!(!location.contains(Path::new("/project/app/resources/x")));
        assert!(!location.contains(Path::new("/project/lib/res/values")));
    }

    #[test]
    fn test_registry_keys_differ_by_namespacing() {
        let flat = RegistryKey::flat("/res");
        let namespaced = RegistryKey::new(
            "/res",
            Namespacing::Namespaced(ResourceNamespace::from_package("com.example")),
        );
        assert_ne!(flat, namespaced);
        assert!(flat.namespacing.namespace().is_res_auto());
        assert_eq!(
            namespaced.namespacing.namespace().package_name(),
            Some("com.example")
        );
    }
}
