//! Chronoscope Timeline
//!
//! This crate provides the recording side of the Chronoscope profiler:
//!
//! - [`MonotonicClock`]: time sources, including a deterministic [`ManualClock`]
//! - [`MemoryTimeline`]: named marks and the measurements between them
//! - [`EventDispatcher`]: observable instrumentation events
//! - [`report`]: aggregation, call-stack and log-summary reports
//!
//! # Marks and Measures
//!
//! ```ignore
//! use chronoscope_timeline::{MemoryTimeline, SystemClock, Timeline};
//! use std::sync::Arc;
//!
//! let timeline = MemoryTimeline::new(Arc::new(SystemClock::new()));
//! timeline.mark("fetch#1:start")?;
//! // ... do work ...
//! timeline.mark("fetch#1:end")?;
//!
//! let m = timeline.measure("library.fetch", "fetch#1:start", "fetch#1:end")?;
//! println!("{} took {:.2} ms", m.name, m.duration_ms());
//! ```
//!
//! # Reports
//!
//! ```ignore
//! use chronoscope_timeline::report::{aggregate, render_aggregate_csv};
//!
//! let csv = render_aggregate_csv(&aggregate(&timeline.measurements()));
//! ```
//!
//! # Event Subscription
//!
//! ```ignore
//! use chronoscope_timeline::{EventDispatcher, LoggingSubscriber};
//! use std::sync::Arc;
//!
//! let dispatcher = EventDispatcher::new();
//! dispatcher.subscribe(Arc::new(LoggingSubscriber::new()));
//! ```

pub mod clock;
pub mod error;
pub mod events;
pub mod report;
pub mod timeline;

// Re-export main types
pub use clock::{ManualClock, MonotonicClock, SharedClock, SystemClock};
pub use error::{ReportError, ReportResult, TimelineError, TimelineResult};
pub use events::{
    CallOutcome, CollectingSubscriber, EventDispatcher, EventSubscriber, InstrumentEvent,
    LoggingSubscriber,
};
pub use report::{
    AggregateRow, LogSummaryRow, ProfileReport, SessionId, StackEntry, aggregate, call_stack,
    export_measurements, load_measurements, load_measurements_from, render_aggregate_csv,
    render_call_stack_csv, render_log_summary_markdown, summarize_log,
};
pub use timeline::{Mark, Measurement, MemoryTimeline, Timeline, as_millis_f64, from_millis_f64};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::clock::{ManualClock, MonotonicClock, SystemClock};
    pub use crate::events::{CallOutcome, EventDispatcher, EventSubscriber, InstrumentEvent};
    pub use crate::report::ProfileReport;
    pub use crate::timeline::{Measurement, MemoryTimeline, Timeline};
}
