//! Resource identity types.
//!
//! A resource is identified by the triple (namespace, type, name). Uniqueness
//! is per namespace: two libraries may both define `string/app_name` without
//! conflicting as long as they live in different namespaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Namespace string used for non-namespaced ("flat") resources.
pub const RES_AUTO: &str = "res-auto";

/// Opaque scope identifier partitioning resource keys.
///
/// Namespaced repositories use the owning package name; flat repositories all
/// share [`RES_AUTO`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceNamespace(String);

impl ResourceNamespace {
    /// The shared namespace of flat (non-namespaced) resources.
    pub fn res_auto() -> Self {
        Self(RES_AUTO.to_string())
    }

    /// Namespace owned by the given package.
    pub fn from_package(package: impl Into<String>) -> Self {
        Self(package.into())
    }

    /// Returns the package name, or `None` for the flat namespace.
    pub fn package_name(&self) -> Option<&str> {
        if self.is_res_auto() {
            None
        } else {
            Some(&self.0)
        }
    }

    pub fn is_res_auto(&self) -> bool {
        self.0 == RES_AUTO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ResourceNamespace {
    fn default() -> Self {
        Self::res_auto()
    }
}

impl fmt::Display for ResourceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of resource.
///
/// The discriminant order is stable: [`ResourceType::index`] feeds the 8-bit
/// type field of numeric resource ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Anim,
    Animator,
    Array,
    Attr,
    Bool,
    Color,
    Dimen,
    Drawable,
    Font,
    Fraction,
    Id,
    Integer,
    Interpolator,
    Layout,
    Menu,
    Mipmap,
    Navigation,
    Plurals,
    Raw,
    String,
    Style,
    Styleable,
    Transition,
    Xml,
}

impl ResourceType {
    /// Every resource type, in index order.
    pub const ALL: [ResourceType; 24] = [
        ResourceType::Anim,
        ResourceType::Animator,
        ResourceType::Array,
        ResourceType::Attr,
        ResourceType::Bool,
        ResourceType::Color,
        ResourceType::Dimen,
        ResourceType::Drawable,
        ResourceType::Font,
        ResourceType::Fraction,
        ResourceType::Id,
        ResourceType::Integer,
        ResourceType::Interpolator,
        ResourceType::Layout,
        ResourceType::Menu,
        ResourceType::Mipmap,
        ResourceType::Navigation,
        ResourceType::Plurals,
        ResourceType::Raw,
        ResourceType::String,
        ResourceType::Style,
        ResourceType::Styleable,
        ResourceType::Transition,
        ResourceType::Xml,
    ];

    /// Lowercase name as used in references (`@string/foo`) and symbol tables.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Anim => "anim",
            ResourceType::Animator => "animator",
            ResourceType::Array => "array",
            ResourceType::Attr => "attr",
            ResourceType::Bool => "bool",
            ResourceType::Color => "color",
            ResourceType::Dimen => "dimen",
            ResourceType::Drawable => "drawable",
            ResourceType::Font => "font",
            ResourceType::Fraction => "fraction",
            ResourceType::Id => "id",
            ResourceType::Integer => "integer",
            ResourceType::Interpolator => "interpolator",
            ResourceType::Layout => "layout",
            ResourceType::Menu => "menu",
            ResourceType::Mipmap => "mipmap",
            ResourceType::Navigation => "navigation",
            ResourceType::Plurals => "plurals",
            ResourceType::Raw => "raw",
            ResourceType::String => "string",
            ResourceType::Style => "style",
            ResourceType::Styleable => "styleable",
            ResourceType::Transition => "transition",
            ResourceType::Xml => "xml",
        }
    }

    /// One-based index used in the type byte of a numeric id.
    ///
    /// Zero is reserved so that a well-formed id never has an empty type field.
    pub fn index(&self) -> u8 {
        Self::ALL
            .iter()
            .position(|t| t == self)
            .map(|pos| pos as u8 + 1)
            .unwrap_or(0)
    }

    /// Inverse of [`ResourceType::index`].
    pub fn from_index(index: u8) -> Option<Self> {
        if index == 0 {
            return None;
        }
        Self::ALL.get(index as usize - 1).copied()
    }

    /// Whether resources of this type can be defined in a values file.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            ResourceType::Array
                | ResourceType::Attr
                | ResourceType::Bool
                | ResourceType::Color
                | ResourceType::Dimen
                | ResourceType::Fraction
                | ResourceType::Id
                | ResourceType::Integer
                | ResourceType::Plurals
                | ResourceType::String
                | ResourceType::Style
                | ResourceType::Styleable
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown resource type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.name() == s)
            .copied()
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// Identity of a resource: (namespace, type, name).
///
/// Also used as the "resource reference" handed to the identifier allocator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: ResourceNamespace,
    pub ty: ResourceType,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: ResourceNamespace, ty: ResourceType, name: impl Into<String>) -> Self {
        Self {
            namespace,
            ty,
            name: name.into(),
        }
    }

    /// Key in the flat namespace.
    pub fn res_auto(ty: ResourceType, name: impl Into<String>) -> Self {
        Self::new(ResourceNamespace::res_auto(), ty, name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_res_auto() {
            write!(f, "@{}/{}", self.ty, self.name)
        } else {
            write!(f, "@{}:{}/{}", self.namespace, self.ty, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_index_round_trip_is_one_based() {
        assert_eq!(ResourceType::Anim.index(), 1);
        assert_eq!(ResourceType::Xml.index(), 24);
        assert_eq!(ResourceType::from_index(0), None);
        assert_eq!(ResourceType::from_index(25), None);
        for ty in ResourceType::ALL {
            assert_eq!(ResourceType::from_index(ty.index()), Some(ty));
        }
    }

    #[test]
    fn test_type_from_str() {
        assert_eq!("string".parse::<ResourceType>(), Ok(ResourceType::String));
        assert_eq!("styleable".parse::<ResourceType>(), Ok(ResourceType::Styleable));
        assert!("strings".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_namespace_package_name() {
        assert_eq!(ResourceNamespace::res_auto().package_name(), None);
        let ns = ResourceNamespace::from_package("com.example.lib");
        assert_eq!(ns.package_name(), Some("com.example.lib"));
        assert!(!ns.is_res_auto());
    }

    #[test]
    fn test_key_display() {
        let flat = ResourceKey::res_auto(ResourceType::String, "app_name");
        assert_eq!(flat.to_string(), "@string/app_name");

        let namespaced = ResourceKey::new(
            ResourceNamespace::from_package("com.example"),
            ResourceType::Color,
            "accent",
        );
        assert_eq!(namespaced.to_string(), "@com.example:color/accent");
    }
}
