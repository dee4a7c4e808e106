//! Built-in parser for on-disk resource folders.
//!
//! # Layout
//!
//! ```text
//! res/
//! ├── layout/main.xml             → @layout/main       (file record)
//! ├── drawable-hdpi/icon.9.png    → @drawable/icon     (qualifiers "hdpi")
//! ├── values/strings.values       → one record per line
//! └── values-fr/strings.values    → same keys, qualifiers "fr"
//! ```
//!
//! Values files hold one declaration per line:
//!
//! ```text
//! # comment
//! string app_name = Resview
//! public color accent = #ff4081
//! id anchor
//! ```
//!
//! Folders are parsed in parallel on the rayon pool; results are returned in
//! folder and file name order so repeated scans produce identical snapshots.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::ParseError;
use super::parser::ResourceParser;
use crate::model::{
    LocationKey, RecordOrigin, ResourceKey, ResourceNamespace, ResourceRecord, ResourceType,
    Visibility,
};

/// Folder name prefix of values folders.
pub const VALUES_FOLDER: &str = "values";

/// Extension of values files.
pub const VALUES_EXTENSION: &str = "values";

/// Parser for `<type>[-qualifiers]/<name>.<ext>` resource folders.
#[derive(Debug, Default, Clone)]
pub struct FileLayoutParser;

impl FileLayoutParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_folder(
        &self,
        location: &LocationKey,
        namespace: &ResourceNamespace,
        folder: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceRecord>, ParseError> {
        let Some(kind) = FolderKind::of(folder) else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for file in sorted_entries(folder)? {
            if cancel.is_cancelled() {
                return Err(ParseError::Cancelled);
            }
            if !file.is_file() || is_ignored(&file) {
                continue;
            }
            records.extend(kind.parse_file(location, namespace, &file)?);
        }
        Ok(records)
    }
}

impl ResourceParser for FileLayoutParser {
    fn name(&self) -> &str {
        "file-layout"
    }

    fn parse(
        &self,
        location: &LocationKey,
        namespace: &ResourceNamespace,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceRecord>, ParseError> {
        let root = location.path();
        if !root.exists() {
            debug!(location = %location, "Resource location does not exist; treating as empty");
            return Ok(Vec::new());
        }

        let folders: Vec<PathBuf> = sorted_entries(root)?
            .into_iter()
            .filter(|path| path.is_dir() && !is_ignored(path))
            .collect();

        let parsed: Vec<Result<Vec<ResourceRecord>, ParseError>> = folders
            .par_iter()
            .map(|folder| self.parse_folder(location, namespace, folder, cancel))
            .collect();

        let mut records = Vec::new();
        for result in parsed {
            records.extend(result?);
        }

        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }

        debug!(location = %location, records = records.len(), "Parsed resource location");
        Ok(records)
    }

    fn parse_file(
        &self,
        location: &LocationKey,
        namespace: &ResourceNamespace,
        file: &Path,
    ) -> Option<Result<Vec<ResourceRecord>, ParseError>> {
        // Only direct children of a resource folder can be handled alone
        let folder = file.parent()?;
        if folder.parent()? != location.path() {
            return None;
        }
        if file.is_dir() {
            return None;
        }
        let kind = FolderKind::of(folder)?;
        if !file.exists() || is_ignored(file) {
            return Some(Ok(Vec::new()));
        }
        Some(kind.parse_file(location, namespace, file))
    }

    fn is_relevant(&self, file: &Path) -> bool {
        if is_ignored(file) {
            return false;
        }
        match file.parent() {
            Some(folder) => match FolderKind::of(folder) {
                Some(FolderKind::Values { .. }) => {
                    file.extension().and_then(|e| e.to_str()) == Some(VALUES_EXTENSION)
                }
                Some(FolderKind::Files { .. }) => true,
                // A resource folder itself being created or removed
                None => FolderKind::of(file).is_some(),
            },
            None => false,
        }
    }
}

// =============================================================================
// Folder classification
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum FolderKind {
    Values { qualifiers: String },
    Files { ty: ResourceType, qualifiers: String },
}

impl FolderKind {
    fn of(folder: &Path) -> Option<Self> {
        let name = folder.file_name()?.to_str()?;
        let (prefix, qualifiers) = match name.split_once('-') {
            Some((prefix, qualifiers)) => (prefix, qualifiers.to_string()),
            None => (name, String::new()),
        };
        if prefix == VALUES_FOLDER {
            return Some(FolderKind::Values { qualifiers });
        }
        let ty = ResourceType::from_str(prefix).ok()?;
        Some(FolderKind::Files { ty, qualifiers })
    }

    fn parse_file(
        &self,
        location: &LocationKey,
        namespace: &ResourceNamespace,
        file: &Path,
    ) -> Result<Vec<ResourceRecord>, ParseError> {
        let origin = RecordOrigin::new(location.clone(), Some(file.to_path_buf()));
        match self {
            FolderKind::Files { ty, qualifiers } => {
                let Some(name) = resource_name(file) else {
                    return Ok(Vec::new());
                };
                let key = ResourceKey::new(namespace.clone(), *ty, name);
                Ok(vec![ResourceRecord::file(key, file, origin).with_qualifiers(qualifiers)])
            }
            FolderKind::Values { qualifiers } => {
                if file.extension().and_then(|e| e.to_str()) != Some(VALUES_EXTENSION) {
                    return Ok(Vec::new());
                }
                let text = fs::read_to_string(file).map_err(|e| ParseError::io(file, e))?;
                parse_values(&text, file, namespace, qualifiers, &origin)
            }
        }
    }
}

/// Parse the contents of a values file.
pub fn parse_values(
    text: &str,
    file: &Path,
    namespace: &ResourceNamespace,
    qualifiers: &str,
    origin: &RecordOrigin,
) -> Result<Vec<ResourceRecord>, ParseError> {
    let mut records = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let syntax = |message: String| ParseError::Syntax {
            path: file.to_path_buf(),
            line: index + 1,
            message,
        };

        let (declaration, value) = match line.split_once('=') {
            Some((declaration, value)) => (declaration.trim(), value.trim()),
            None => (line, ""),
        };

        let mut words = declaration.split_whitespace().peekable();
        let visibility = match words.peek().copied() {
            Some("public") => {
                words.next();
                Visibility::Public
            }
            Some("private") => {
                words.next();
                Visibility::Private
            }
            _ => Visibility::Undefined,
        };

        let (Some(type_name), Some(name), None) = (words.next(), words.next(), words.next())
        else {
            return Err(syntax(format!("expected '<type> <name> = <value>', got '{}'", line)));
        };

        let ty = ResourceType::from_str(type_name).map_err(|e| syntax(e.to_string()))?;
        if !ty.is_value_type() {
            return Err(syntax(format!("type '{}' cannot be declared in a values file", ty)));
        }

        let key = ResourceKey::new(namespace.clone(), ty, name);
        records.push(
            ResourceRecord::value(key, value, origin.clone())
                .with_qualifiers(qualifiers)
                .with_visibility(visibility),
        );
    }
    Ok(records)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let entries = fs::read_dir(dir).map_err(|e| ParseError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ParseError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Resource name of a file: the file name up to its first dot.
fn resource_name(file: &Path) -> Option<&str> {
    let name = file.file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    (!stem.is_empty()).then_some(stem)
}

/// Hidden files and editor backups.
fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') || n.ends_with('~'))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn parse(root: &Path) -> Vec<ResourceRecord> {
        FileLayoutParser::new()
            .parse(
                &LocationKey::new(root),
                &ResourceNamespace::res_auto(),
                &CancellationToken::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_parses_file_resources_with_qualifiers() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "layout/main.xml", "<layout/>");
        write(dir.path(), "drawable-hdpi/icon.9.png", "");

        let records = parse(dir.path());
        assert_eq!(records.len(), 2);

        let icon = records.iter().find(|r| r.key.ty == ResourceType::Drawable).unwrap();
        assert_eq!(icon.key.name, "icon");
        assert_eq!(icon.qualifiers, "hdpi");

        let layout = records.iter().find(|r| r.key.ty == ResourceType::Layout).unwrap();
        assert_eq!(layout.key.name, "main");
        assert!(layout.origin.file.is_some());
    }

    #[test]
    fn test_parses_values_lines() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "values/strings.values",
            "# header\nstring app_name = Resview\n\npublic color accent = #ff4081\nid anchor\n",
        );

        let records = parse(dir.path());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key.name, "app_name");
        assert_eq!(records[0].value.as_text(), Some("Resview"));
        assert_eq!(records[1].visibility, Visibility::Public);
        assert_eq!(records[2].key.ty, ResourceType::Id);
        assert_eq!(records[2].value.as_text(), Some(""));
    }

    #[test]
    fn test_values_syntax_error_reports_line() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "values/bad.values", "string ok = fine\nnonsense\n");

        let err = FileLayoutParser::new()
            .parse(
                &LocationKey::new(dir.path()),
                &ResourceNamespace::res_auto(),
                &CancellationToken::new(),
            )
            .unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_file_types_rejected_in_values() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "values/bad.values", "layout main = x\n");
        let result = FileLayoutParser::new().parse(
            &LocationKey::new(dir.path()),
            &ResourceNamespace::res_auto(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_unknown_folders_and_hidden_files_ignored() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes/readme.txt", "hi");
        write(dir.path(), "layout/.main.xml.swp", "");
        write(dir.path(), "layout/main.xml~", "");
        assert!(parse(dir.path()).is_empty());
    }

    #[test]
    fn test_missing_location_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(parse(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_cancelled_parse() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "layout/main.xml", "");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FileLayoutParser::new().parse(
            &LocationKey::new(dir.path()),
            &ResourceNamespace::res_auto(),
            &cancel,
        );
        assert!(matches!(result, Err(ParseError::Cancelled)));
    }

    #[test]
    fn test_parse_single_file() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "values-fr/strings.values", "string title = Titre\n");
        let parser = FileLayoutParser::new();
        let location = LocationKey::new(dir.path());
        let ns = ResourceNamespace::res_auto();

        let records = parser.parse_file(&location, &ns, &file).unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].qualifiers, "fr");

        fs::remove_file(&file).unwrap();
        let records = parser.parse_file(&location, &ns, &file).unwrap().unwrap();
        assert!(records.is_empty());

        // Folders need a full rescan
        assert!(parser
            .parse_file(&location, &ns, &dir.path().join("values-fr"))
            .is_none());
    }

    #[test]
    fn test_relevance() {
        let parser = FileLayoutParser::new();
        assert!(parser.is_relevant(Path::new("/res/values/strings.values")));
        assert!(!parser.is_relevant(Path::new("/res/values/strings.txt")));
        assert!(parser.is_relevant(Path::new("/res/layout-land/main.xml")));
        assert!(parser.is_relevant(Path::new("/res/layout-land")));
        assert!(!parser.is_relevant(Path::new("/res/notes/todo.txt")));
        assert!(!parser.is_relevant(Path::new("/res/layout/.hidden")));
    }
}
