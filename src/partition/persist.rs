//! Partition table file
//!
//! The table is stored as a JSON document wrapped with a CRC32 of its
//! canonical body:
//!
//! ```json
//! { "checksum": 305419896, "body": { "format_version": 1, ... } }
//! ```
//!
//! Writes go to `<path>.tmp`, are fsynced, then renamed over `path`, and
//! the parent directory is fsynced. A reader sees the old table or the
//! new one, never a torn write.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::dn::Dn;
use crate::observability::{log_event, Event};

use super::errors::{TableFileError, TableFileResult};
use super::table::PartitionDescriptor;

pub const TABLE_FORMAT_VERSION: u32 = 1;

/// Persisted table contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTable {
    pub format_version: u32,
    /// RFC3339
    pub updated_at: String,
    pub partitions: Vec<PartitionDescriptor>,
    pub replicate: Vec<Dn>,
}

impl PersistedTable {
    pub fn new(partitions: Vec<PartitionDescriptor>, replicate: Vec<Dn>) -> Self {
        Self {
            format_version: TABLE_FORMAT_VERSION,
            updated_at: Utc::now().to_rfc3339(),
            partitions,
            replicate,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    checksum: u32,
    body: serde_json::Value,
}

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Reads and writes the partition table at a fixed path.
#[derive(Debug, Clone)]
pub struct PartitionTableFile {
    path: PathBuf,
}

impl PartitionTableFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Durably replace the stored table.
    pub fn save(&self, table: &PersistedTable) -> TableFileResult<()> {
        let body = serde_json::to_value(table)?;
        let canonical = serde_json::to_vec(&body)?;
        let envelope = Envelope {
            checksum: compute_checksum(&canonical),
            body,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| TableFileError::io(parent, e))?;
            }
        }

        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp).map_err(|e| TableFileError::io(&tmp, e))?;
            file.write_all(&json).map_err(|e| TableFileError::io(&tmp, e))?;
            file.sync_all().map_err(|e| TableFileError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| TableFileError::io(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let dir = OpenOptions::new()
                .read(true)
                .open(parent)
                .map_err(|e| TableFileError::io(parent, e))?;
            dir.sync_all().map_err(|e| TableFileError::io(parent, e))?;
        }

        log_event(
            Event::TablePersisted,
            &[
                ("partitions", &table.partitions.len().to_string()),
                ("path", &self.path.display().to_string()),
            ],
        );
        Ok(())
    }

    /// Load and verify the stored table.
    pub fn load(&self) -> TableFileResult<PersistedTable> {
        let bytes = fs::read(&self.path).map_err(|e| TableFileError::io(&self.path, e))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;

        let canonical = serde_json::to_vec(&envelope.body)?;
        let computed = compute_checksum(&canonical);
        if computed != envelope.checksum {
            return Err(TableFileError::ChecksumMismatch {
                expected: envelope.checksum,
                computed,
            });
        }

        let table: PersistedTable = serde_json::from_value(envelope.body)?;
        if table.format_version != TABLE_FORMAT_VERSION {
            return Err(TableFileError::UnsupportedVersion(table.format_version));
        }

        log_event(
            Event::TableLoaded,
            &[
                ("partitions", &table.partitions.len().to_string()),
                ("path", &self.path.display().to_string()),
            ],
        );
        Ok(table)
    }
}
