//! Core data model: resource keys, records, and source locations.

mod key;
mod location;
mod record;

pub use key::{ResourceKey, ResourceNamespace, ResourceType, UnknownResourceType, RES_AUTO};
pub use location::{LocationKey, Namespacing, RegistryKey};
pub use record::{RecordKind, RecordOrigin, ResourceRecord, ResourceValue, Visibility};
