//! Observable events during instrumentation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How a timed call completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call returned synchronously.
    Returned,
    /// The call threw synchronously.
    Threw {
        /// Rendering of the thrown value.
        error: String,
    },
    /// The call returned a deferred result that fulfilled.
    Resolved,
    /// The call returned a deferred result that rejected.
    Rejected {
        /// Rendering of the rejection reason.
        reason: String,
    },
}

impl CallOutcome {
    /// Check if the call completed without an error.
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Returned | CallOutcome::Resolved)
    }

    /// Check if the call produced a deferred result.
    pub fn is_deferred(&self) -> bool {
        matches!(self, CallOutcome::Resolved | CallOutcome::Rejected { .. })
    }

    /// The error text, if the call failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            CallOutcome::Threw { error } => Some(error),
            CallOutcome::Rejected { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Events that can be observed while an instrumented graph is used.
#[derive(Debug, Clone)]
pub enum InstrumentEvent {
    /// A callable was wrapped for timing.
    FunctionWrapped {
        /// Path of the callable.
        path: String,
    },
    /// A proxy node was created for an object.
    ProxyCreated {
        /// Path of the object.
        path: String,
    },
    /// A timed call started.
    CallStarted {
        /// Path of the callable.
        path: String,
        /// Sequence number of the call.
        seq: u64,
    },
    /// A timed call completed.
    CallCompleted {
        /// Path of the callable.
        path: String,
        /// How it completed.
        outcome: CallOutcome,
        /// Elapsed time from start to completion.
        duration: Duration,
    },
    /// An iterator step completed.
    IteratorStep {
        /// Path of the iterator factory.
        path: String,
        /// Elapsed time of the step.
        duration: Duration,
    },
    /// Recording a timing failed.
    Error {
        /// Error message.
        message: String,
    },
}

impl InstrumentEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            InstrumentEvent::FunctionWrapped { .. } => "function_wrapped",
            InstrumentEvent::ProxyCreated { .. } => "proxy_created",
            InstrumentEvent::CallStarted { .. } => "call_started",
            InstrumentEvent::CallCompleted { .. } => "call_completed",
            InstrumentEvent::IteratorStep { .. } => "iterator_step",
            InstrumentEvent::Error { .. } => "error",
        }
    }

    /// One-line log rendering of completion events.
    ///
    /// ```text
    /// Function library.fetch took 1.25 ms.
    /// Async function library.load failed after 3.00 ms with error: boom
    /// Iterator library.items took 0.10 ms.
    /// ```
    pub fn log_line(&self) -> Option<String> {
        match self {
            InstrumentEvent::CallCompleted {
                path,
                outcome,
                duration,
            } => {
                let ms = millis(*duration);
                let line = match outcome {
                    CallOutcome::Returned => format!("Function {} took {:.2} ms.", path, ms),
                    CallOutcome::Threw { error } => format!(
                        "Function {} failed after {:.2} ms with error: {}",
                        path, ms, error
                    ),
                    CallOutcome::Resolved => {
                        format!("Async function {} took {:.2} ms.", path, ms)
                    }
                    CallOutcome::Rejected { reason } => format!(
                        "Async function {} failed after {:.2} ms with error: {}",
                        path, ms, reason
                    ),
                };
                Some(line)
            }
            InstrumentEvent::IteratorStep { path, duration } => Some(format!(
                "Iterator {} took {:.2} ms.",
                path,
                millis(*duration)
            )),
            _ => None,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    crate::timeline::as_millis_f64(duration)
}

/// Subscriber for instrumentation events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &InstrumentEvent);

    /// Filter for event types this subscriber is interested in.
    /// Returns `None` to receive all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that writes events through `tracing`.
///
/// Completion events are logged in the one-line format understood by
/// [`summarize_log`](crate::report::summarize_log).
pub struct LoggingSubscriber {
    /// Level used for completion lines.
    pub log_level: tracing::Level,
}

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
        }
    }

    /// Set the level of completion lines.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.log_level = level;
        self
    }

    fn completion(&self, event: &InstrumentEvent, path: &str, duration: Duration) {
        let Some(line) = event.log_line() else {
            return;
        };
        let duration_us = duration.as_micros() as u64;
        match self.log_level {
            tracing::Level::ERROR => {
                tracing::error!(event = event.event_type(), path, duration_us, "{}", line)
            }
            tracing::Level::WARN => {
                tracing::warn!(event = event.event_type(), path, duration_us, "{}", line)
            }
            tracing::Level::INFO => {
                tracing::info!(event = event.event_type(), path, duration_us, "{}", line)
            }
            tracing::Level::DEBUG => {
                tracing::debug!(event = event.event_type(), path, duration_us, "{}", line)
            }
            _ => {
                tracing::trace!(event = event.event_type(), path, duration_us, "{}", line)
            }
        }
    }
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &InstrumentEvent) {
        match event {
            InstrumentEvent::FunctionWrapped { path } => {
                tracing::trace!(event = "function_wrapped", path = %path, "Function wrapped");
            }
            InstrumentEvent::ProxyCreated { path } => {
                tracing::trace!(event = "proxy_created", path = %path, "Proxy created");
            }
            InstrumentEvent::CallStarted { path, seq } => {
                tracing::trace!(event = "call_started", path = %path, seq, "Call started");
            }
            InstrumentEvent::CallCompleted { path, duration, .. }
            | InstrumentEvent::IteratorStep { path, duration } => {
                self.completion(event, path, *duration);
            }
            InstrumentEvent::Error { message } => {
                tracing::warn!(event = "error", message = %message, "Timing not recorded");
            }
        }
    }
}

/// A subscriber that collects events for later analysis.
pub struct CollectingSubscriber {
    events: RwLock<Vec<InstrumentEvent>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a new collecting subscriber.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<InstrumentEvent> {
        self.events.read().clone()
    }

    /// Log lines of the collected completion events.
    pub fn log_lines(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(InstrumentEvent::log_line)
            .collect()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &InstrumentEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push(event.clone());
        }
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: InstrumentEvent) {
        // Snapshot so subscribers may subscribe from inside a callback.
        let subscribers: Vec<_> = self.subscribers.read().iter().cloned().collect();
        for subscriber in subscribers {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
