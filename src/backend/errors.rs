//! Backend error types
//!
//! Error codes:
//! - CO_BACKEND_IO_ERROR (ERROR severity)
//! - CO_BACKEND_WRITE_FAILED (ERROR severity)
//! - CO_BACKEND_READ_FAILED (ERROR severity)
//! - CO_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

use crate::observability::Severity;

/// Backend-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorCode {
    /// Disk I/O failure
    CoBackendIoError,
    /// Batch write or fsync failed
    CoBackendWriteFailed,
    /// Record read failed
    CoBackendReadFailed,
    /// Checksum or framing failure in a complete frame
    CoDataCorruption,
}

impl BackendErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            BackendErrorCode::CoBackendIoError => "CO_BACKEND_IO_ERROR",
            BackendErrorCode::CoBackendWriteFailed => "CO_BACKEND_WRITE_FAILED",
            BackendErrorCode::CoBackendReadFailed => "CO_BACKEND_READ_FAILED",
            BackendErrorCode::CoDataCorruption => "CO_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            BackendErrorCode::CoDataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Backend error with code, message and optional context.
#[derive(Debug)]
pub struct BackendError {
    code: BackendErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl BackendError {
    /// Create a new backend I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: BackendErrorCode::CoBackendIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new write failed error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: BackendErrorCode::CoBackendWriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a write failed error without an I/O source
    pub fn write_failed_no_source(message: impl Into<String>) -> Self {
        Self {
            code: BackendErrorCode::CoBackendWriteFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a new read failed error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: BackendErrorCode::CoBackendReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: BackendErrorCode::CoDataCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    pub fn code(&self) -> BackendErrorCode {
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

    /// Whether the on-disk state can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for BackendError {
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
        Ok(())
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
