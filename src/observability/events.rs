//! Observable events
//!
//! Events are explicit and typed; the string form is what lands in the
//! `event` field of a log line.

use std::fmt;

/// Observable events in the store and working-copy layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file loaded
    ConfigLoaded,

    // Store lifecycle
    /// Store opened and state rebuilt from the backend
    StoreOpened,
    /// Transaction validated, persisted and published
    TransactionCommitted,
    /// Transaction rejected during validation or persistence
    TransactionRejected,

    // Backend
    /// Incomplete trailing frame discarded on open
    BackendTornTail,
    /// Checksum mismatch in a complete frame (FATAL)
    BackendCorruption,

    // Working copy
    /// A fault was resolved into a loaded proxy
    ObjectFaulted,
    /// Context started committing its changes
    ContextCommitStart,
    /// Context finished committing its changes
    ContextCommitComplete,
    /// A per-root transaction issued by a context failed
    ContextCommitFailed,
    /// In-memory changes were discarded
    ChangesDiscarded,

    // Schema migration
    /// A migration batch rewrote an item
    MigrationApplied,
    /// A migration could not be resolved against the metamodel
    MigrationUnresolvable,
}

impl Event {
    /// Returns the event name as it appears in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StoreOpened => "STORE_OPENED",
            Event::TransactionCommitted => "TXN_COMMITTED",
            Event::TransactionRejected => "TXN_REJECTED",
            Event::BackendTornTail => "BACKEND_TORN_TAIL",
            Event::BackendCorruption => "BACKEND_CORRUPTION",
            Event::ObjectFaulted => "OBJECT_FAULTED",
            Event::ContextCommitStart => "CONTEXT_COMMIT_START",
            Event::ContextCommitComplete => "CONTEXT_COMMIT_COMPLETE",
            Event::ContextCommitFailed => "CONTEXT_COMMIT_FAILED",
            Event::ChangesDiscarded => "CHANGES_DISCARDED",
            Event::MigrationApplied => "MIGRATION_APPLIED",
            Event::MigrationUnresolvable => "MIGRATION_UNRESOLVABLE",
        }
    }

    /// Whether this event signals an unrecoverable condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::BackendCorruption)
    }

    /// Whether this event reports a failure the caller will see as an error
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::TransactionRejected
                | Event::ContextCommitFailed
                | Event::MigrationUnresolvable
                | Event::BackendTornTail
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(Event::BackendCorruption.is_fatal());
        assert!(!Event::TransactionRejected.is_fatal());
        assert!(!Event::StoreOpened.is_fatal());
    }

    #[test]
    fn test_event_names_are_screaming_snake_case() {
        for event in [
            Event::StoreOpened,
            Event::TransactionCommitted,
            Event::ObjectFaulted,
            Event::MigrationApplied,
        ] {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }
}
