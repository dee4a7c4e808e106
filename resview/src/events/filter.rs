//! Relevance predicate for file events.

use std::path::Path;

use glob::{MatchOptions, Pattern, PatternError};

/// Paths never worth a rescan: hidden files and directories, editor backups
/// and swap files.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/.*",
    "**/.*/**",
    "**/*~",
    "**/*.swp",
    "**/*.tmp",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides which file events reach the repositories.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    ignore: Vec<Pattern>,
}

impl RelevanceFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let ignore = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ignore })
    }

    /// Accept everything.
    pub fn permissive() -> Self {
        Self { ignore: Vec::new() }
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        !self
            .ignore
            .iter()
            .any(|pattern| pattern.matches_path_with(path, MATCH_OPTIONS))
    }

    /// Match `path` relative to `root`; hidden directories above the root
    /// do not count.
    pub fn is_relevant_in(&self, root: &Path, path: &Path) -> bool {
        self.is_relevant(path.strip_prefix(root).unwrap_or(path))
    }
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        let ignore = DEFAULT_IGNORE_PATTERNS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        Self { ignore }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ignores() {
        let filter = RelevanceFilter::default();
        assert!(filter.is_relevant(Path::new("/app/res/values/strings.values")));
        assert!(filter.is_relevant(Path::new("/app/res/drawable/icon.png")));
        assert!(!filter.is_relevant(Path::new("/app/res/values/.strings.values")));
        assert!(!filter.is_relevant(Path::new("/app/res/.git/HEAD")));
        assert!(!filter.is_relevant(Path::new("/app/res/values/strings.values~")));
        assert!(!filter.is_relevant(Path::new("/app/res/layout/main.swp")));
    }

    #[test]
    fn test_relative_to_root() {
        let filter = RelevanceFilter::default();
        let root = Path::new("/tmp/.tmpA1b2/app/res");
        assert!(!filter.is_relevant(&root.join("values/strings.values")));
        assert!(filter.is_relevant_in(root, &root.join("values/strings.values")));
        assert!(!filter.is_relevant_in(root, &root.join("values/.strings.values")));
        assert!(!filter.is_relevant_in(root, &root.join(".idea/workspace.values")));
    }

    #[test]
    fn test_custom_patterns() {
        let filter = RelevanceFilter::new(&["**/raw/**"]).unwrap();
        assert!(!filter.is_relevant(Path::new("/app/res/raw/data.bin")));
        assert!(filter.is_relevant(Path::new("/app/res/.hidden")));
        assert!(RelevanceFilter::new(&["[unclosed"]).is_err());
        assert!(RelevanceFilter::permissive().is_relevant(Path::new("/x/.y")));
    }
}
