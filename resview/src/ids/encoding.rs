//! Numeric resource ids.
//!
//! ```text
//!   31        24 23        16 15                       0
//!  ┌────────────┬────────────┬──────────────────────────┐
//!  │  package   │    type    │          entry           │
//!  └────────────┴────────────┴──────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::ResourceType;

/// Errors from id parsing and allocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid resource id '{0}'")]
    InvalidId(String),

    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("No dynamic ids left for type {0}")]
    Exhausted(ResourceType),

    #[error("Failed to read symbol table {path}: {message}")]
    Io { path: String, message: String },
}

/// A 32-bit resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(package: u8, type_index: u8, entry: u16) -> Self {
        Self(((package as u32) << 24) | ((type_index as u32) << 16) | entry as u32)
    }

    /// Id for `ty` using its stable type index.
    pub fn for_type(package: u8, ty: ResourceType, entry: u16) -> Self {
        Self::new(package, ty.index(), entry)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn package(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_index(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry(&self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| IdError::InvalidId(s.to_string()))?;
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| IdError::InvalidId(s.to_string()))
    }
}
