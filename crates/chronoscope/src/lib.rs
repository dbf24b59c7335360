//! # Chronoscope - Transparent Call Profiler
//!
//! Chronoscope wraps a function or an object graph in a behaviorally
//! identical stand-in that records how long every reachable call takes,
//! without callers changing how they use the value.
//!
//! ## Features
//!
//! - **Transparent**: arguments, receivers, results and errors pass through unchanged
//! - **Recursive**: nested members and returned objects are covered automatically
//! - **Deferred-aware**: promise-like results are timed until they settle, without blocking
//! - **Iterator-aware**: each `next` step of an iterated member is timed
//! - **Reportable**: measurements export to JSON and aggregate into CSV reports
//!
//! ## Quick Start
//!
//! ```ignore
//! use chronoscope::prelude::*;
//!
//! let profiler = Chronoscope::builder()
//!     .with_root_path("sdk")
//!     .with_logging()
//!     .build()?;
//!
//! let sdk = profiler.wrap(sdk);
//! sdk.get("users")?.call_method("list", &[])?;
//!
//! for m in profiler.measurements() {
//!     println!("{} took {:.2} ms", m.name, m.duration_ms());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                  chronoscope (facade)                   │
//! │                  ┌─────────────────┐                    │
//! │                  │    Profiler     │                    │
//! │                  └────────┬────────┘                    │
//! │                           │                             │
//! │  ┌─────────────────┬──────┴───────────┬──────────────┐  │
//! │  │ chronoscope-    │ chronoscope-     │ chronoscope- │  │
//! │  │ core (values,   │ proxy (nodes,    │ timeline     │  │
//! │  │ classification) │ timed wrappers)  │ (marks,      │  │
//! │  │                 │                  │  reports)    │  │
//! │  └─────────────────┴──────────────────┴──────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;

use chronoscope_core::{ConfigError, EvalMode, InstrumentConfig, NativeAllowList, Value};
use chronoscope_proxy::{InstrumentContext, instrument};
use chronoscope_timeline::{
    EventDispatcher, EventSubscriber, LoggingSubscriber, Measurement, MemoryTimeline,
    ProfileReport, ReportError, SessionId, SharedClock, SystemClock, Timeline, TimelineError,
    export_measurements,
};

// Re-export from sub-crates
pub use chronoscope_core;
pub use chronoscope_proxy;
pub use chronoscope_timeline;

/// Main entry point for Chronoscope.
pub struct Chronoscope;

impl Chronoscope {
    /// Create a new profiler builder.
    pub fn builder() -> ChronoscopeBuilder {
        ChronoscopeBuilder::new()
    }

    /// Create a profiler with default configuration.
    pub fn with_defaults() -> Result<Profiler, ChronoscopeError> {
        ChronoscopeBuilder::new().build()
    }
}

/// Builder for configuring a profiler.
pub struct ChronoscopeBuilder {
    config: InstrumentConfig,
    clock: Option<SharedClock>,
    timeline: Option<Arc<dyn Timeline>>,
    event_subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl ChronoscopeBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: InstrumentConfig::default(),
            clock: None,
            timeline: None,
            event_subscribers: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: InstrumentConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file.
    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ChronoscopeError> {
        self.config = InstrumentConfig::from_file(path.as_ref())?;
        Ok(self)
    }

    // Instrumentation

    /// Set the path label of root values.
    pub fn with_root_path(mut self, path: impl Into<String>) -> Self {
        self.config.root_path = path.into();
        self
    }

    /// Set the default evaluation mode.
    pub fn with_eval_mode(mut self, mode: EvalMode) -> Self {
        self.config.eval_mode = mode;
        self
    }

    /// Set the built-in kinds that are never wrapped.
    pub fn with_natives(mut self, natives: NativeAllowList) -> Self {
        self.config.natives = natives;
        self
    }

    /// Enable or disable iterator step timing.
    pub fn with_iterator_tracing(mut self, enabled: bool) -> Self {
        self.config.trace_iterators = enabled;
        self
    }

    // Timeline

    /// Set the maximum number of retained measurements.
    pub fn with_max_measurements(mut self, max: usize) -> Self {
        self.config.max_measurements = max;
        self
    }

    /// Use a custom time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a custom timeline store.
    ///
    /// The store should read time from the clock given to
    /// [`with_clock`](Self::with_clock), so event durations match measurements.
    pub fn with_timeline(mut self, timeline: Arc<dyn Timeline>) -> Self {
        self.timeline = Some(timeline);
        self
    }

    // Observability

    /// Add an event subscriber.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.event_subscribers.push(subscriber);
        self
    }

    /// Log every completed call through `tracing`.
    pub fn with_logging(self) -> Self {
        self.with_event_subscriber(Arc::new(LoggingSubscriber::new()))
    }

    /// Build the profiler.
    pub fn build(self) -> Result<Profiler, ChronoscopeError> {
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as SharedClock);
        let timeline = self.timeline.unwrap_or_else(|| {
            Arc::new(MemoryTimeline::with_capacity(
                Arc::clone(&clock),
                self.config.max_measurements,
            ))
        });

        let event_dispatcher = EventDispatcher::new();
        for subscriber in self.event_subscribers {
            event_dispatcher.subscribe(subscriber);
        }

        tracing::info!(
            root_path = %self.config.root_path,
            eval_mode = ?self.config.eval_mode,
            natives = self.config.natives.len(),
            "Profiler created"
        );

        let ctx = InstrumentContext::new(self.config, timeline, clock, Arc::new(event_dispatcher));
        Ok(Profiler {
            ctx,
            session_id: SessionId::new(),
        })
    }
}

impl Default for ChronoscopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured profiler.
///
/// Owns the wrapper cache and the timeline; everything it wraps records into
/// it. Drain it at shutdown to export the session.
pub struct Profiler {
    ctx: Arc<InstrumentContext>,
    session_id: SessionId,
}

impl Profiler {
    /// The profiler configuration.
    pub fn config(&self) -> &InstrumentConfig {
        self.ctx.config()
    }

    /// Unique ID of this profiling session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Get the event dispatcher.
    pub fn event_dispatcher(&self) -> &Arc<EventDispatcher> {
        self.ctx.events()
    }

    /// Get the shared instrumentation context.
    pub fn context(&self) -> &Arc<InstrumentContext> {
        &self.ctx
    }

    /// Wrap a value under the configured root path.
    pub fn wrap(&self, value: Value) -> Value {
        let path = self.ctx.config().root_path.clone();
        self.wrap_with(value, &path, self.ctx.config().eval_mode)
    }

    /// Wrap a value under an explicit path.
    pub fn wrap_at(&self, value: Value, path: &str) -> Value {
        self.wrap_with(value, path, self.ctx.config().eval_mode)
    }

    /// Wrap a value under an explicit path and evaluation mode.
    ///
    /// Callables are wrapped directly, objects get a proxy node, and
    /// primitives are returned unchanged.
    pub fn wrap_with(&self, value: Value, path: &str, mode: EvalMode) -> Value {
        instrument(&self.ctx, value, path, mode)
    }

    /// Snapshot of all recorded measurements.
    ///
    /// Lazily evaluated calls are measured first.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.ctx.measurements()
    }

    /// Remove and return all recorded measurements.
    pub fn drain(&self) -> Vec<Measurement> {
        self.ctx.drain()
    }

    /// Serialize all recorded measurements as JSON.
    pub fn export_json(&self) -> Result<String, ChronoscopeError> {
        Ok(export_measurements(&self.measurements())?)
    }

    /// Build a report of the session so far.
    pub fn report(&self) -> ProfileReport {
        let mut report = ProfileReport::new(&self.config().root_path, self.measurements())
            .with_in_flight(self.in_flight());
        report.session_id = self.session_id;
        report
    }

    /// Number of calls started but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.ctx.cache().total_in_flight()
    }

    /// Number of wrapper cache entries.
    pub fn cache_len(&self) -> usize {
        self.ctx.cache().len()
    }

    /// Forget all recorded marks and measurements.
    pub fn clear(&self) {
        self.ctx.flush();
        self.ctx.timeline().clear();
    }
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler")
            .field("session_id", &self.session_id)
            .field("root_path", &self.config().root_path)
            .field("cache_len", &self.cache_len())
            .finish()
    }
}

/// Errors from the profiler facade.
#[derive(Debug, thiserror::Error)]
pub enum ChronoscopeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Timeline error.
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Report error.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{Chronoscope, ChronoscopeBuilder, ChronoscopeError, Profiler};

    // Value model
    pub use chronoscope_core::{
        ArrayObject, CallResult, Deferred, EvalMode, InstrumentConfig, MapObject, NativeAllowList,
        NativeKind, Object, PlainObject, PropertyKey, Settlement, Symbol, Thrown, Value, arg,
    };

    // Timeline types
    pub use chronoscope_timeline::{
        CallOutcome, CollectingSubscriber, EventSubscriber, InstrumentEvent, LoggingSubscriber,
        ManualClock, Measurement, MonotonicClock, ProfileReport, SystemClock, Timeline,
    };

    // Common std types
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
