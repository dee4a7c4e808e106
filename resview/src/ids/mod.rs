//! Resource identifiers.
//!
//! Stable 32-bit ids for resource references, split into a frozen compiled
//! set (loaded from a [`SymbolTable`]) and a resettable dynamic set.

mod allocator;
mod encoding;
mod symbols;

pub use allocator::{CompiledIdSource, IdentifierAllocator, DEFAULT_DYNAMIC_PACKAGE};
pub use encoding::{IdError, ResourceId};
pub use symbols::SymbolTable;
