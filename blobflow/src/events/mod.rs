//! Retry lifecycle events.
//!
//! Retry policies report what they decide to an [`EventSink`]. Logging goes
//! through `tracing` regardless; a sink is for callers that want to observe
//! retries programmatically (metrics, tests, audit trails).

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// An attempt is about to be sent. Data: `retry_count`, `policy`.
pub const RETRY_ATTEMPT: &str = "retry.attempt";
/// A strategy produced a decision. Data: `strategy`, `decision`.
pub const RETRY_STRATEGY: &str = "retry.strategy";
/// A retry was scheduled. Data: `delay_ms` or `redirect`, `retry_count`.
pub const RETRY_SCHEDULED: &str = "retry.scheduled";
/// The retry budget ran out. Data: `retry_count`, `status`.
pub const RETRY_EXHAUSTED: &str = "retry.exhausted";
/// The request was cancelled between attempts. Data: `retry_count`.
pub const RETRY_ABORTED: &str = "retry.aborted";
