//! Class generators.
//!
//! A generator owns one package's derived classes. Keys name the outer class
//! (`com.example.R`) or one nested type class (`com.example.R$string`).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::{Arc, Weak};

use super::error::ArtifactError;
use crate::ids::IdentifierAllocator;
use crate::model::{ResourceKey, ResourceType};
use crate::repository::{ResourceRepository, VisitResult};

const CLASS_NAME: &str = "R";

/// A parsed derived-artifact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedKey {
    pub package: String,
    /// Nested type class, `None` for the outer class.
    pub nested: Option<ResourceType>,
}

impl DerivedKey {
    pub fn outer(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            nested: None,
        }
    }

    pub fn nested(package: impl Into<String>, ty: ResourceType) -> Self {
        Self {
            package: package.into(),
            nested: Some(ty),
        }
    }

    /// Parse `pkg.R` or `pkg.R$type`; anything else is not a derived key.
    pub fn parse(key: &str) -> Option<Self> {
        let (outer, nested) = match key.split_once('$') {
            Some((outer, nested)) => (outer, Some(ResourceType::from_str(nested).ok()?)),
            None => (key, None),
        };
        let package = outer.strip_suffix(CLASS_NAME)?.strip_suffix('.')?;
        if package.is_empty() {
            return None;
        }
        Some(Self {
            package: package.to_string(),
            nested,
        })
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, CLASS_NAME)?;
        if let Some(ty) = self.nested {
            write!(f, "${}", ty.name())?;
        }
        Ok(())
    }
}

/// Inputs a payload was generated from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArtifactStamp {
    pub repository_generation: u64,
    pub id_generation: u64,
}

/// Produces derived classes for one package.
pub trait ClassGenerator: Send + Sync {
    /// Package whose keys this generator owns.
    fn package(&self) -> &str;

    /// Changes whenever the generated output may change.
    fn stamp(&self) -> ArtifactStamp;

    /// Generate `key`, or `None` if the generator has nothing for it.
    fn generate(&self, key: &DerivedKey) -> Result<Option<String>, ArtifactError>;
}

/// Emits a textual `R` class listing `type.name = 0x...` for every resource
/// in a repository.
pub struct RClassStubGenerator {
    package: String,
    repository: Weak<dyn ResourceRepository>,
    ids: Arc<IdentifierAllocator>,
}

impl RClassStubGenerator {
    pub fn new(
        package: impl Into<String>,
        repository: &Arc<dyn ResourceRepository>,
        ids: Arc<IdentifierAllocator>,
    ) -> Self {
        Self {
            package: package.into(),
            repository: Arc::downgrade(repository),
            ids,
        }
    }

    fn collect(
        &self,
        repository: &dyn ResourceRepository,
        key: &DerivedKey,
    ) -> Result<BTreeMap<ResourceType, BTreeSet<ResourceKey>>, ArtifactError> {
        let mut by_type: BTreeMap<ResourceType, BTreeSet<ResourceKey>> = BTreeMap::new();
        repository
            .visit(&mut |record| {
                if key.nested.map_or(true, |ty| ty == record.key.ty) {
                    by_type
                        .entry(record.key.ty)
                        .or_default()
                        .insert(record.key.clone());
                }
                VisitResult::Continue
            })
            .map_err(|e| ArtifactError::generator(key.to_string(), e))?;
        Ok(by_type)
    }

    fn write_type_class(
        &self,
        out: &mut String,
        ty: ResourceType,
        keys: &BTreeSet<ResourceKey>,
        indent: &str,
        class_key: &DerivedKey,
    ) -> Result<(), ArtifactError> {
        let _ = writeln!(out, "{indent}public static final class {} {{", ty.name());
        for key in keys {
            let id = self
                .ids
                .dynamic_id(key)
                .map_err(|e| ArtifactError::generator(class_key.to_string(), e))?;
            let _ = writeln!(
                out,
                "{indent}    public static final int {} = {};",
                field_name(&key.name),
                id
            );
        }
        let _ = writeln!(out, "{indent}}}");
        Ok(())
    }
}

impl ClassGenerator for RClassStubGenerator {
    fn package(&self) -> &str {
        &self.package
    }

    fn stamp(&self) -> ArtifactStamp {
        ArtifactStamp {
            repository_generation: self.repository.upgrade().map_or(0, |r| r.generation()),
            id_generation: self.ids.generation(),
        }
    }

    fn generate(&self, key: &DerivedKey) -> Result<Option<String>, ArtifactError> {
        let Some(repository) = self.repository.upgrade() else {
            return Ok(None);
        };
        let by_type = self.collect(repository.as_ref(), key)?;

        let mut out = String::new();
        let _ = writeln!(out, "package {};\n", self.package);
        match key.nested {
            Some(ty) => {
                let Some(keys) = by_type.get(&ty) else {
                    return Ok(None);
                };
                self.write_type_class(&mut out, ty, keys, "", key)?;
            }
            None => {
                let _ = writeln!(out, "public final class {CLASS_NAME} {{");
                for (ty, keys) in &by_type {
                    self.write_type_class(&mut out, *ty, keys, "    ", key)?;
                }
                let _ = writeln!(out, "}}");
            }
        }
        Ok(Some(out))
    }
}

/// Field names cannot contain the dots resource names allow.
fn field_name(name: &str) -> String {
    name.replace(['.', '-', ':'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ResourceId;
    use crate::model::{LocationKey, RecordOrigin, RegistryKey, ResourceRecord};
    use crate::repository::{Generations, SourceRepository, StaticParser};

    fn repository(records: &[(ResourceType, &str)]) -> Arc<dyn ResourceRepository> {
        let location = LocationKey::new("/app/res");
        let repo = SourceRepository::new(
            RegistryKey::flat("/app/res"),
            Arc::new(StaticParser::new()),
            Arc::new(Generations::new()),
        );
        repo.publish(
            records
                .iter()
                .map(|(ty, name)| {
                    ResourceRecord::value(
                        ResourceKey::res_auto(*ty, *name),
                        "v",
                        RecordOrigin::new(location.clone(), None),
                    )
                })
                .collect(),
        );
        Arc::new(repo)
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(DerivedKey::parse("com.example.R"), Some(DerivedKey::outer("com.example")));
        assert_eq!(
            DerivedKey::parse("com.example.R$string"),
            Some(DerivedKey::nested("com.example", ResourceType::String))
        );
        assert_eq!(DerivedKey::parse("com.example.Rx"), None);
        assert_eq!(DerivedKey::parse("com.example.R$widget"), None);
        assert_eq!(DerivedKey::parse("R"), None);
        assert_eq!(DerivedKey::parse(".R"), None);
        assert_eq!(
            DerivedKey::nested("a.b", ResourceType::Color).to_string(),
            "a.b.R$color"
        );
    }

    #[test]
    fn test_outer_class_lists_every_type() {
        let repo = repository(&[
            (ResourceType::String, "app_name"),
            (ResourceType::String, "title.main"),
            (ResourceType::Color, "accent"),
        ]);
        let ids = Arc::new(IdentifierAllocator::new());
        ids.reset_compiled(&vec![(
            ResourceKey::res_auto(ResourceType::String, "app_name"),
            ResourceId::from_raw(0x7f0e_001b),
        )]);
        let generator = RClassStubGenerator::new("com.example", &repo, ids);

        let text = generator
            .generate(&DerivedKey::outer("com.example"))
            .unwrap()
            .unwrap();
        assert!(text.starts_with("package com.example;"));
        assert!(text.contains("public static final class string {"));
        assert!(text.contains("public static final class color {"));
        assert!(text.contains("public static final int app_name = 0x7f0e001b;"));
        assert!(text.contains("public static final int title_main = "));
    }

    #[test]
    fn test_nested_class_only_has_its_type() {
        let repo = repository(&[(ResourceType::String, "a"), (ResourceType::Color, "c")]);
        let generator =
            RClassStubGenerator::new("com.example", &repo, Arc::new(IdentifierAllocator::new()));

        let text = generator
            .generate(&DerivedKey::nested("com.example", ResourceType::Color))
            .unwrap()
            .unwrap();
        assert!(text.contains("class color"));
        assert!(!text.contains("class string"));

        let missing = generator
            .generate(&DerivedKey::nested("com.example", ResourceType::Dimen))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_dropped_repository_generates_nothing() {
        let repo = repository(&[(ResourceType::String, "a")]);
        let generator =
            RClassStubGenerator::new("com.example", &repo, Arc::new(IdentifierAllocator::new()));
        drop(repo);
        assert!(generator
            .generate(&DerivedKey::outer("com.example"))
            .unwrap()
            .is_none());
        assert_eq!(generator.stamp().repository_generation, 0);
    }
}
