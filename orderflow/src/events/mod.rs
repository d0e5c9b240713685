//! Event sinks for committed workflow changes.
//!
//! Operations queue [`WorkflowEvent`](crate::core::WorkflowEvent)s on their
//! transaction. The engine hands them to its [`EventSink`] only after the
//! commit succeeded, so a sink never sees a change that was rolled back.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
