//! Compiled symbol tables (`R.txt`).
//!
//! Each line declares one compiled id:
//!
//! ```text
//! int string app_name 0x7f0e001b
//! int color accent 0x7f050000
//! int[] styleable Toolbar { 0x7f030001, 0x7f030002 }
//! int styleable Toolbar_title 0
//! ```
//!
//! Styleable lines describe attribute arrays and indices rather than ids and
//! are skipped.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::allocator::CompiledIdSource;
use super::encoding::{IdError, ResourceId};
use crate::model::{ResourceKey, ResourceNamespace, ResourceType};

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^int\s+([a-z]+)\s+([A-Za-z0-9_.]+)\s+(0[xX][0-9a-fA-F]+)$")
            .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
    })
}

/// Parsed compiled ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: Vec<(ResourceKey, ResourceId)>,
}

impl SymbolTable {
    /// Parse symbol table text; every id is placed in `namespace`.
    pub fn parse(text: &str, namespace: &ResourceNamespace) -> Result<Self, IdError> {
        let mut entries = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("int[]") || line.starts_with("int styleable ") {
                continue;
            }
            let malformed = |message: String| IdError::Malformed {
                line: index + 1,
                message,
            };

            let captures = line_pattern()
                .captures(line)
                .ok_or_else(|| malformed(format!("unrecognized declaration '{}'", line)))?;

            let ty = ResourceType::from_str(&captures[1]).map_err(|e| malformed(e.to_string()))?;
            let id = ResourceId::from_str(&captures[3]).map_err(|e| malformed(e.to_string()))?;
            entries.push((ResourceKey::new(namespace.clone(), ty, &captures[2]), id));
        }
        Ok(Self { entries })
    }

    /// Read and parse a symbol table file.
    pub fn load(path: &Path, namespace: &ResourceNamespace) -> Result<Self, IdError> {
        let text = fs::read_to_string(path).map_err(|e| IdError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&text, namespace)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(ResourceKey, ResourceId)] {
        &self.entries
    }
}

impl CompiledIdSource for SymbolTable {
    fn compiled_ids(&self) -> Vec<(ResourceKey, ResourceId)> {
        self.entries.clone()
    }
}
