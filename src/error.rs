//! Error taxonomy shared by every subsystem.
//!
//! Each module owns its error type; all of them map onto one
//! [`ErrorCategory`] so callers can decide between retrying, surfacing,
//! or aborting without matching on every variant.

use std::fmt;

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A UUID, branch, revision or persistent root does not exist, or was deleted.
    NotFound,
    /// Optimistic concurrency failure or duplicate identity. The caller may retry.
    Conflict,
    /// A schema migration cannot be resolved against the metamodel.
    SchemaUnresolvable,
    /// Input rejected before any store I/O because it breaks a structural rule.
    ConsistencyViolation,
    /// Durable backend failure (I/O, corruption, encoding).
    Storage,
}

impl ErrorCategory {
    /// Stable string code for logs and diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "CO_NOT_FOUND",
            ErrorCategory::Conflict => "CO_CONFLICT",
            ErrorCategory::SchemaUnresolvable => "CO_SCHEMA_UNRESOLVABLE",
            ErrorCategory::ConsistencyViolation => "CO_CONSISTENCY_VIOLATION",
            ErrorCategory::Storage => "CO_STORAGE",
        }
    }

    /// Whether the caller can reasonably retry after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Conflict)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
