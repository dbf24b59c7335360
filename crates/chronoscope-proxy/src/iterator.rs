//! Instrumented iterators.
//!
//! An iterator obtained through a proxied `@@iterator` or `@@asyncIterator`
//! factory is wrapped so that each `next` step is timed. The registry maps
//! an iterator's identity to its instrumented counterpart, so asking for the
//! same iterator twice yields the same wrapper and step timers never stack.

use std::any::Any;
use std::sync::{Arc, Weak};

use chronoscope_core::{
    CallResult, EvalMode, Object, ObjectClass, PropertyDescriptor, PropertyKey, Settlement,
    Symbol, Thrown, Value, is_callable,
};
use chronoscope_timeline::CallOutcome;
use dashmap::DashMap;

use crate::cache::identity;
use crate::context::{InstrumentContext, TimerKind};

/// An iterator whose `next` steps are timed.
pub struct InstrumentedIterator {
    ctx: Arc<InstrumentContext>,
    inner: Value,
    key: usize,
    step_name: Arc<str>,
    mode: EvalMode,
    this_ref: Weak<InstrumentedIterator>,
}

impl InstrumentedIterator {
    /// The underlying iterator.
    pub fn inner(&self) -> &Value {
        &self.inner
    }

    /// Measurement name of each step.
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    fn as_value(&self) -> Value {
        match self.this_ref.upgrade() {
            Some(this) => Value::Object(this),
            None => self.inner.clone(),
        }
    }

    fn step(&self, next: &Value, args: &[Value]) -> CallResult {
        let timer = self
            .ctx
            .begin(Arc::clone(&self.step_name), TimerKind::IteratorStep, self.mode);

        let result = match next.call(&self.inner, args) {
            Ok(result) => result,
            Err(thrown) => {
                let error = thrown.value().to_string();
                self.ctx.finish(timer, CallOutcome::Threw { error });
                return Err(thrown);
            }
        };

        match result.as_deferred() {
            Some(deferred) => {
                let ctx = Arc::clone(&self.ctx);
                deferred.on_settle(move |settlement| {
                    let outcome = match settlement {
                        Settlement::Fulfilled(_) => CallOutcome::Resolved,
                        Settlement::Rejected(reason) => CallOutcome::Rejected {
                            reason: reason.to_string(),
                        },
                    };
                    ctx.finish(timer, outcome);
                });
            }
            None => self.ctx.finish(timer, CallOutcome::Returned),
        }
        Ok(result)
    }
}

impl Object for InstrumentedIterator {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        let raw = self.inner.get(key.clone())?;
        if !is_callable(&raw) {
            return Ok(raw);
        }

        let Some(this) = self.this_ref.upgrade() else {
            return Ok(raw);
        };

        if key.as_str() == Some("next") {
            return Ok(Value::function("next", move |_, args| this.step(&raw, args)));
        }

        if key.is_symbol(&Symbol::Iterator) || key.is_symbol(&Symbol::AsyncIterator) {
            return Ok(Value::function(key.to_string(), move |_, args| {
                let result = raw.call(&this.inner, args)?;
                if result.same_ref(&this.inner) {
                    return Ok(this.as_value());
                }
                Ok(result)
            }));
        }

        // Other protocol members (`return`, `throw`) run against the real
        // iterator.
        Ok(Value::function(key.to_string(), move |_, args| {
            raw.call(&this.inner, args)
        }))
    }

    fn get_own_property(&self, key: &PropertyKey) -> Result<Option<PropertyDescriptor>, Thrown> {
        match &self.inner {
            Value::Object(o) => o.get_own_property(key),
            _ => Ok(None),
        }
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.inner.as_object().map(|o| o.keys()).unwrap_or_default()
    }

    fn class(&self) -> ObjectClass {
        self.inner
            .as_object()
            .map(|o| o.class())
            .unwrap_or(ObjectClass::Ordinary)
    }

    fn describe(&self) -> String {
        self.inner.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for InstrumentedIterator {
    fn drop(&mut self) {
        self.ctx.iterators().release(self.key);
    }
}

impl std::fmt::Debug for InstrumentedIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedIterator")
            .field("step_name", &self.step_name)
            .finish()
    }
}

/// Identity-keyed registry of instrumented iterators.
#[derive(Default)]
pub struct IteratorRegistry {
    entries: DashMap<usize, Weak<InstrumentedIterator>>,
}

impl IteratorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the instrumented counterpart of `iterator`, creating it if needed.
    ///
    /// Values that are already instrumented are returned as they are.
    pub fn instrument(
        &self,
        ctx: &Arc<InstrumentContext>,
        iterator: Value,
        step_name: &str,
        mode: EvalMode,
    ) -> Value {
        if iterator.downcast_ref::<InstrumentedIterator>().is_some() {
            return iterator;
        }
        let Some(key) = identity(&iterator) else {
            return iterator;
        };

        let mut entry = self.entries.entry(key).or_default();
        if let Some(existing) = entry.upgrade() {
            return Value::Object(existing);
        }

        tracing::debug!(path = %step_name, "Instrumenting iterator");
        let instrumented = Arc::new_cyclic(|this_ref| InstrumentedIterator {
            ctx: Arc::clone(ctx),
            inner: iterator,
            key,
            step_name: step_name.into(),
            mode,
            this_ref: this_ref.clone(),
        });
        *entry = Arc::downgrade(&instrumented);
        Value::Object(instrumented)
    }

    /// Forget the entry for `key` once its instrumented iterator is gone.
    fn release(&self, key: usize) {
        self.entries
            .remove_if(&key, |_, weak| weak.strong_count() == 0);
    }

    /// Number of live instrumented iterators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no instrumented iterator is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for IteratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IteratorRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
