//! Shared instrumentation state.
//!
//! Every wrapper and proxy node created from one profiler holds an
//! `Arc<InstrumentContext>`: the configuration, the timeline measurements
//! are written to, the wrapper cache, the iterator registry and the event
//! dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chronoscope_core::{EvalMode, InstrumentConfig, NativeAllowList};
use chronoscope_timeline::{
    CallOutcome, EventDispatcher, InstrumentEvent, Measurement, SharedClock, Timeline,
    TimelineError,
};
use parking_lot::Mutex;

use crate::cache::WrapperCache;
use crate::iterator::IteratorRegistry;

/// What a timer measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// A function or method invocation.
    Call,
    /// One `next` step of an iterator.
    IteratorStep,
}

/// An interval that has been started but not yet finished.
///
/// Finishing consumes the timer, so each started interval produces at most
/// one measure request.
#[derive(Debug)]
pub struct CallTimer {
    name: Arc<str>,
    seq: u64,
    kind: TimerKind,
    mode: EvalMode,
    started: Duration,
}

impl CallTimer {
    /// Measurement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sequence number distinguishing this interval's marks.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn start_mark(&self) -> String {
        format!("{}#{}:start", self.name, self.seq)
    }

    fn end_mark(&self) -> String {
        format!("{}#{}:end", self.name, self.seq)
    }
}

#[derive(Debug)]
struct PendingMeasure {
    name: Arc<str>,
    start_mark: String,
    end_mark: String,
}

/// State shared by all wrappers of one profiler.
pub struct InstrumentContext {
    config: InstrumentConfig,
    timeline: Arc<dyn Timeline>,
    clock: SharedClock,
    events: Arc<EventDispatcher>,
    cache: WrapperCache,
    iterators: IteratorRegistry,
    sequence: AtomicU64,
    pending: Mutex<Vec<PendingMeasure>>,
}

impl InstrumentContext {
    /// Create a context writing to `timeline`.
    ///
    /// `clock` must be the clock the timeline reads, so event durations agree
    /// with recorded measurements.
    pub fn new(
        config: InstrumentConfig,
        timeline: Arc<dyn Timeline>,
        clock: SharedClock,
        events: Arc<EventDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            timeline,
            clock,
            events,
            cache: WrapperCache::new(),
            iterators: IteratorRegistry::new(),
            sequence: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// The session configuration.
    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Built-in kinds that are never wrapped.
    pub fn natives(&self) -> &NativeAllowList {
        &self.config.natives
    }

    /// The timeline measurements are written to.
    pub fn timeline(&self) -> &Arc<dyn Timeline> {
        &self.timeline
    }

    /// The event dispatcher.
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// The wrapper cache.
    pub fn cache(&self) -> &WrapperCache {
        &self.cache
    }

    /// The instrumented iterator registry.
    pub fn iterators(&self) -> &IteratorRegistry {
        &self.iterators
    }

    /// Number of lazily queued measure requests.
    pub fn pending_measures(&self) -> usize {
        self.pending.lock().len()
    }

    /// Start timing an interval named `name`.
    pub fn begin(&self, name: Arc<str>, kind: TimerKind, mode: EvalMode) -> CallTimer {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let timer = CallTimer {
            name,
            seq,
            kind,
            mode,
            started: self.clock.now(),
        };

        if let Err(e) = self.timeline.mark(&timer.start_mark()) {
            self.report_failure(&timer.name, e);
        }
        if kind == TimerKind::Call {
            tracing::trace!(path = %timer.name, seq, "Call started");
            self.events.emit(InstrumentEvent::CallStarted {
                path: timer.name.to_string(),
                seq,
            });
        }
        timer
    }

    /// Finish an interval: record its end mark and issue its measure request.
    ///
    /// In lazy mode the request is queued until measurements are next read.
    pub fn finish(&self, timer: CallTimer, outcome: CallOutcome) {
        let end_mark = timer.end_mark();
        if let Err(e) = self.timeline.mark(&end_mark) {
            self.report_failure(&timer.name, e);
        }
        let duration = self.clock.now().saturating_sub(timer.started);

        match timer.mode {
            EvalMode::Eager => {
                if let Err(e) = self
                    .timeline
                    .measure(&timer.name, &timer.start_mark(), &end_mark)
                {
                    self.report_failure(&timer.name, e);
                }
            }
            EvalMode::Lazy => {
                self.pending.lock().push(PendingMeasure {
                    name: Arc::clone(&timer.name),
                    start_mark: timer.start_mark(),
                    end_mark,
                });
            }
        }

        tracing::trace!(
            path = %timer.name,
            seq = timer.seq,
            duration_us = duration.as_micros() as u64,
            success = outcome.is_success(),
            "Interval finished"
        );

        let path = timer.name.to_string();
        let event = match timer.kind {
            TimerKind::Call => InstrumentEvent::CallCompleted {
                path,
                outcome,
                duration,
            },
            TimerKind::IteratorStep => InstrumentEvent::IteratorStep { path, duration },
        };
        self.events.emit(event);
    }

    /// Issue all queued measure requests.
    pub fn flush(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for request in pending {
            if let Err(e) =
                self.timeline
                    .measure(&request.name, &request.start_mark, &request.end_mark)
            {
                self.report_failure(&request.name, e);
            }
        }
    }

    /// Snapshot of all measurements, after issuing queued requests.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.flush();
        self.timeline.measurements()
    }

    /// Remove and return all measurements, after issuing queued requests.
    pub fn drain(&self) -> Vec<Measurement> {
        self.flush();
        self.timeline.drain()
    }

    fn report_failure(&self, name: &str, error: TimelineError) {
        tracing::warn!(path = %name, error = %error, "Failed to record timing");
        self.events.emit(InstrumentEvent::Error {
            message: format!("{}: {}", name, error),
        });
    }
}

impl std::fmt::Debug for InstrumentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentContext")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("iterators", &self.iterators)
            .field("pending_measures", &self.pending_measures())
            .finish()
    }
}
