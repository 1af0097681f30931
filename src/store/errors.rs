//! Store error types
//!
//! Error codes:
//! - TRACKDEX_STORE_IO_ERROR (ERROR severity)
//! - TRACKDEX_STORE_WRITE_FAILED (ERROR severity)
//! - TRACKDEX_STORE_READ_FAILED (ERROR severity)
//! - TRACKDEX_STORE_ALREADY_OPEN (ERROR severity)
//! - TRACKDEX_STORE_NAMESPACE_NOT_FOUND (ERROR severity)
//! - TRACKDEX_STORE_POISONED (FATAL severity)
//! - TRACKDEX_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the store stays usable
    Error,
    /// The store must not be used further
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Disk I/O failure outside a read or a commit
    IoError,
    /// Commit append or fsync failed
    WriteFailed,
    /// Log replay or scan read failed
    ReadFailed,
    /// Another handle holds the store file
    AlreadyOpen,
    /// Namespace does not exist
    NamespaceNotFound,
    /// A failed commit could not be rolled back
    Poisoned,
    /// Checksum or framing failure
    DataCorruption,
}

impl StoreErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::IoError => "TRACKDEX_STORE_IO_ERROR",
            StoreErrorCode::WriteFailed => "TRACKDEX_STORE_WRITE_FAILED",
            StoreErrorCode::ReadFailed => "TRACKDEX_STORE_READ_FAILED",
            StoreErrorCode::AlreadyOpen => "TRACKDEX_STORE_ALREADY_OPEN",
            StoreErrorCode::NamespaceNotFound => "TRACKDEX_STORE_NAMESPACE_NOT_FOUND",
            StoreErrorCode::Poisoned => "TRACKDEX_STORE_POISONED",
            StoreErrorCode::DataCorruption => "TRACKDEX_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::Poisoned | StoreErrorCode::DataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with code, message and optional context
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source,
        }
    }

    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::IoError, message, Some(source))
    }

    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::WriteFailed, message, Some(source))
    }

    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::ReadFailed, message, Some(source))
    }

    pub fn already_open(path: impl fmt::Display) -> Self {
        Self::new(
            StoreErrorCode::AlreadyOpen,
            format!("Store is held by another handle: {}", path),
            None,
        )
    }

    pub fn namespace_not_found(namespace: &str) -> Self {
        Self::new(
            StoreErrorCode::NamespaceNotFound,
            format!("Namespace not found: {}", namespace),
            None,
        )
    }

    pub fn poisoned(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Poisoned, message, None)
    }

    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::DataCorruption, message, None)
    }

    /// Data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        let mut err = Self::data_corruption(reason);
        err.details = Some(format!("byte_offset: {}", offset));
        err
    }

    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Whether the store handle must be abandoned
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreErrorCode::IoError.code(), "TRACKDEX_STORE_IO_ERROR");
        assert_eq!(StoreErrorCode::AlreadyOpen.code(), "TRACKDEX_STORE_ALREADY_OPEN");
        assert_eq!(StoreErrorCode::DataCorruption.code(), "TRACKDEX_DATA_CORRUPTION");
    }

    #[test]
    fn test_corruption_and_poison_are_fatal() {
        assert!(StoreError::data_corruption("checksum mismatch").is_fatal());
        assert!(StoreError::poisoned("rollback failed").is_fatal());
        assert!(!StoreError::already_open("/tmp/x").is_fatal());
        assert!(!StoreError::write_failed("disk full", io::Error::other("disk full")).is_fatal());
    }

    #[test]
    fn test_display_contains_context() {
        let err = StoreError::corruption_at_offset(2048, "checksum mismatch");
        let display = err.to_string();
        assert!(display.contains("TRACKDEX_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 2048"));
    }
}
