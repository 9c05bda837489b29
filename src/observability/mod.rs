//! Observability for the partition layer
//!
//! - Structured logging (one JSON object per line)
//! - Typed events
//! - Relaxed atomic counters
//! - Begin/complete scopes
//!
//! Observability is read-only: nothing here changes routing or
//! transaction outcomes, and a failed log write is ignored.
//!
//! ```ignore
//! use dirpart::observability::{log_event, Event};
//!
//! log_event(Event::PartitionCreated, &[("dn", "dc=sub,dc=example,dc=com")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log an event at its default severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

/// Whether an event would be written at all.
///
/// Callers use this to skip building expensive field values.
pub fn event_enabled(event: Event) -> bool {
    Logger::enabled(event.severity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::ConfigLoaded, &[("path", "/tmp/dirpart.json")]);
        log_event(Event::SubrequestDispatch, &[]);
    }

    #[test]
    fn test_trace_events_disabled_by_default() {
        if Logger::min_severity() == Severity::Info {
            assert!(!event_enabled(Event::SubrequestDispatch));
            assert!(event_enabled(Event::PartitionCreated));
        }
    }
}
