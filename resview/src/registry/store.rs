//! Persistent snapshot store.
//!
//! Parsing a large library location is the slowest part of startup. The
//! store keeps the records of each location on disk so a later run can
//! skip the parse when nothing changed. Entries are validated by a
//! [`SnapshotStoreKey`]; a missing, stale or unreadable entry means the
//! caller falls back to a full rescan.
//!
//! # File format
//!
//! One file per registry key, named by the SHA-256 of the key, containing a
//! gzip-compressed bincode [`StoredSnapshot`]. Files are written to a
//! temporary path and renamed into place.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{RegistryKey, ResourceRecord};

/// Extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "snap";

/// Errors from the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Snapshot store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistence of parsed records, keyed by registry key.
pub trait SnapshotStore: Send + Sync {
    /// Load records for `key`, or `None` if there is no valid entry.
    fn load(&self, key: &RegistryKey) -> Result<Option<Vec<ResourceRecord>>, StoreError>;

    /// Save records for `key`, replacing any previous entry.
    fn save(&self, key: &RegistryKey, records: &[ResourceRecord]) -> Result<(), StoreError>;

    /// Remove the entry for `key` if present.
    fn remove(&self, key: &RegistryKey) -> Result<(), StoreError>;
}

// =============================================================================
// Validation key
// =============================================================================

/// Validation key of a stored snapshot.
///
/// A stored snapshot is used only if every field matches the current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotStoreKey {
    /// Crate version (record format may change between versions).
    pub version: String,

    /// Registry key rendered as text.
    pub registry_key: String,

    /// Digest over the paths, sizes and modification times of the location's
    /// folders and files.
    pub content_fingerprint: String,
}

impl SnapshotStoreKey {
    /// Compute the key for the current on-disk state of `key`'s location.
    pub fn compute(key: &RegistryKey) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            registry_key: key.to_string(),
            content_fingerprint: fingerprint(key.location.path()),
        }
    }
}

/// Digest of a resource location's layout (two levels deep).
pub fn fingerprint(root: &Path) -> String {
    let mut hasher = Sha256::new();
    let mut stack = vec![(root.to_path_buf(), 0usize)];
    let mut entries = Vec::new();

    while let Some((dir, depth)) = stack.pop() {
        let Ok(read) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in read.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let mtime = meta
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH)
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            entries.push((path.clone(), meta.len(), mtime));
            if meta.is_dir() && depth < 1 {
                stack.push((path, depth + 1));
            }
        }
    }

    entries.sort();
    for (path, len, mtime) in entries {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(len.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// On-disk snapshot entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub key: SnapshotStoreKey,
    pub records: Vec<ResourceRecord>,
    /// When the entry was written (secs since UNIX_EPOCH).
    pub created_at_secs: u64,
}

// =============================================================================
// Bincode implementation
// =============================================================================

/// Snapshot store writing compressed bincode files to a directory.
#[derive(Debug, Clone)]
pub struct BincodeSnapshotStore {
    dir: PathBuf,
}

impl BincodeSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `key`.
    pub fn path_for(&self, key: &RegistryKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir
            .join(format!("{}.{}", hex(&digest[..16]), SNAPSHOT_EXTENSION))
    }

    fn read(&self, path: &Path) -> Result<StoredSnapshot, StoreError> {
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(bincode::deserialize_from(reader)?)
    }
}

impl SnapshotStore for BincodeSnapshotStore {
    fn load(&self, key: &RegistryKey) -> Result<Option<Vec<ResourceRecord>>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let stored = self.read(&path)?;
        let current = SnapshotStoreKey::compute(key);
        if stored.key != current {
            debug!(location = %key.location, "Stored snapshot is stale");
            return Ok(None);
        }

        info!(
            location = %key.location,
            records = stored.records.len(),
            "Using stored resource snapshot"
        );
        Ok(Some(stored.records))
    }

    fn save(&self, key: &RegistryKey, records: &[ResourceRecord]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let created_at_secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let stored = StoredSnapshot {
            key: SnapshotStoreKey::compute(key),
            records: records.to_vec(),
            created_at_secs,
        };

        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path).map_err(|e| StoreError::io(&temp_path, e))?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::fast());
            bincode::serialize_into(&mut encoder, &stored)?;
            encoder.finish().map_err(|e| StoreError::io(&temp_path, e))?;
        }
        fs::rename(&temp_path, &path).map_err(|e| StoreError::io(&path, e))?;

        debug!(
            location = %key.location,
            path = %path.display(),
            records = records.len(),
            "Saved resource snapshot"
        );
        Ok(())
    }

    fn remove(&self, key: &RegistryKey) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
