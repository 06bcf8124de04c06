//! Observability for the store and working copy
//!
//! - Structured logging (one JSON object per line)
//! - Typed lifecycle events
//! - Synchronous, no background threads
//!
//! ```ignore
//! use coreobject::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::TransactionCommitted, &[("actions", "2")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields.
///
/// Fatal events are logged at FATAL, failures at WARN, the rest at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}

/// Log a high-volume event at TRACE level.
pub fn trace_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::trace(event.as_str(), fields);
}

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_for(Event::BackendCorruption), Severity::Fatal);
        assert_eq!(severity_for(Event::TransactionRejected), Severity::Warn);
        assert_eq!(severity_for(Event::StoreOpened), Severity::Info);
    }

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::StoreOpened);
        log_event_with_fields(Event::TransactionCommitted, &[("actions", "1")]);
        trace_event_with_fields(Event::ObjectFaulted, &[("uuid", "x")]);
    }

    #[test]
    fn test_captured_line_uses_event_name() {
        let line = logger::capture_log(
            severity_for(Event::MigrationApplied),
            Event::MigrationApplied.as_str(),
            &[],
        );
        assert!(line.contains("MIGRATION_APPLIED"));
        assert!(line.contains("INFO"));
    }
}
