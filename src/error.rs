//! Directory Error Types
//!
//! One error vocabulary shared by the router, the backends and the
//! transaction coordinator. Backend failures travel through the
//! partition layer unchanged, so callers always see the original kind.

use std::fmt;

/// Result type for directory operations
pub type DirResult<T> = Result<T, DirectoryError>;

/// Directory error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entry (or search base) does not exist
    NoSuchObject,

    /// Entry already exists
    EntryAlreadyExists,

    /// Operation would span more than one partition
    AffectsMultiplePartitions,

    /// Internal or protocol-level failure
    OperationsError,

    /// Request is understood but refused
    UnwillingToPerform,

    /// Store is locked or busy
    Busy,

    /// Store is unavailable
    Unavailable,

    /// DN could not be parsed
    InvalidDn,

    /// end/delete transaction without a matching start
    TransactionMismatch,

    /// Anything a backend reports that has no dedicated kind
    Other,
}

impl ErrorKind {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchObject => "DIRPART_NO_SUCH_OBJECT",
            Self::EntryAlreadyExists => "DIRPART_ENTRY_ALREADY_EXISTS",
            Self::AffectsMultiplePartitions => "DIRPART_AFFECTS_MULTIPLE_PARTITIONS",
            Self::OperationsError => "DIRPART_OPERATIONS_ERROR",
            Self::UnwillingToPerform => "DIRPART_UNWILLING_TO_PERFORM",
            Self::Busy => "DIRPART_BUSY",
            Self::Unavailable => "DIRPART_UNAVAILABLE",
            Self::InvalidDn => "DIRPART_INVALID_DN",
            Self::TransactionMismatch => "DIRPART_TRANSACTION_MISMATCH",
            Self::Other => "DIRPART_OTHER",
        }
    }

    /// LDAP result code for this kind
    pub fn result_code(&self) -> u32 {
        match self {
            Self::OperationsError | Self::TransactionMismatch => 1,
            Self::NoSuchObject => 32,
            Self::InvalidDn => 34,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::EntryAlreadyExists => 68,
            Self::AffectsMultiplePartitions => 71,
            Self::Other => 80,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Directory error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryError {
    /// Error kind
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
}

impl DirectoryError {
    /// Create a new directory error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a no such object error.
    pub fn no_such_object(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchObject, message)
    }

    /// Create an entry already exists error.
    pub fn entry_already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EntryAlreadyExists, message)
    }

    /// Create an affects multiple partitions error.
    pub fn affects_multiple_partitions(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AffectsMultiplePartitions, message)
    }

    /// Create an operations error.
    pub fn operations(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationsError, message)
    }

    /// Create an unwilling to perform error.
    pub fn unwilling_to_perform(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnwillingToPerform, message)
    }

    /// Create a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy, message)
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Create an invalid DN error.
    pub fn invalid_dn(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDn, message)
    }

    /// Create a transaction mismatch error.
    pub fn transaction_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransactionMismatch, message)
    }

    /// Error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Check whether this is a not-found error.
    pub fn is_no_such_object(&self) -> bool {
        self.kind == ErrorKind::NoSuchObject
    }

    /// Check whether this is an already-exists error.
    pub fn is_already_exists(&self) -> bool {
        self.kind == ErrorKind::EntryAlreadyExists
    }
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for DirectoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(ErrorKind::NoSuchObject.result_code(), 32);
        assert_eq!(ErrorKind::EntryAlreadyExists.result_code(), 68);
        assert_eq!(ErrorKind::AffectsMultiplePartitions.result_code(), 71);
        assert_eq!(ErrorKind::TransactionMismatch.result_code(), 1);
    }

    #[test]
    fn test_predicates() {
        assert!(DirectoryError::no_such_object("x").is_no_such_object());
        assert!(DirectoryError::entry_already_exists("x").is_already_exists());
        assert!(!DirectoryError::operations("x").is_no_such_object());
    }

    #[test]
    fn test_display_includes_code() {
        let err = DirectoryError::affects_multiple_partitions("rename");
        let display = err.to_string();
        assert!(display.contains("DIRPART_AFFECTS_MULTIPLE_PARTITIONS"));
        assert!(display.contains("rename"));
    }
}
