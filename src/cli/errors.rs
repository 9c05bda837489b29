//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code after the
//! error envelope has been written.

use std::fmt;
use std::io;

use crate::error::DirectoryError;
use crate::partition::{ConfigError, TableFileError};

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// Config file already exists
    AlreadyInitialized,
    /// Bad command-line value
    InvalidArgument,
    /// Error from the partition layer, carrying its own code
    Directory(&'static str),
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DIRPART_CLI_CONFIG_ERROR",
            Self::IoError => "DIRPART_CLI_IO_ERROR",
            Self::AlreadyInitialized => "DIRPART_CLI_ALREADY_INITIALIZED",
            Self::InvalidArgument => "DIRPART_CLI_INVALID_ARGUMENT",
            Self::Directory(code) => code,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized(path: &std::path::Path) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("Config file {} already exists", path.display()),
        )
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidArgument, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<TableFileError> for CliError {
    fn from(e: TableFileError) -> Self {
        Self::new(CliErrorCode::Directory(e.code()), e.to_string())
    }
}

impl From<DirectoryError> for CliError {
    fn from(e: DirectoryError) -> Self {
        Self::new(CliErrorCode::Directory(e.code()), e.message)
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
