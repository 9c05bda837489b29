//! Partition configuration and table-file errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or validating a `PartitionConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } | Self::Write { .. } => "DIRPART_CONFIG_IO",
            Self::Json(_) => "DIRPART_CONFIG_JSON",
            Self::Invalid(_) => "DIRPART_CONFIG_INVALID",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors reading or writing the persisted partition table.
#[derive(Debug, Error)]
pub enum TableFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table file checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("unsupported table file format version {0}")]
    UnsupportedVersion(u32),
}

impl TableFileError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "DIRPART_TABLE_IO",
            Self::Json(_) => "DIRPART_TABLE_JSON",
            Self::ChecksumMismatch { .. } => "DIRPART_TABLE_CHECKSUM",
            Self::UnsupportedVersion(_) => "DIRPART_TABLE_VERSION",
        }
    }
}

pub type TableFileResult<T> = Result<T, TableFileError>;
