//! Observability
//!
//! Structured, single-line JSON logging of typed events.
//!
//! ```ignore
//! use kvschema::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::SchemaCompiled, &[("tables", "3")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a typed event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a typed event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
