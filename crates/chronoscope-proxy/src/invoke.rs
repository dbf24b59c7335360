//! Timed invocation wrappers.
//!
//! A [`TimedFunction`] stands in for a callable: it forwards the receiver and
//! arguments unchanged, records one measurement per call and routes
//! plain-object results back through the proxy factory.

use std::sync::{Arc, Weak};

use chronoscope_core::{
    CallResult, Callable, EvalMode, Settlement, Thrown, Value, is_plain_object,
};
use chronoscope_timeline::{CallOutcome, InstrumentEvent};

use crate::context::{CallTimer, InstrumentContext, TimerKind};
use crate::proxy;

/// A callable that times every invocation of the original.
pub struct TimedFunction {
    ctx: Arc<InstrumentContext>,
    original: Value,
    path: Arc<str>,
    mode: EvalMode,
    this_ref: Weak<TimedFunction>,
}

impl TimedFunction {
    /// Wrap `original`, which must be callable, under `path`.
    pub fn new(
        ctx: Arc<InstrumentContext>,
        original: Value,
        path: Arc<str>,
        mode: EvalMode,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this_ref| Self {
            ctx,
            original,
            path,
            mode,
            this_ref: this_ref.clone(),
        })
    }

    /// The wrapped callable.
    pub fn original(&self) -> &Value {
        &self.original
    }

    /// Measurement name of this wrapper's calls.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn settle(&self, result: CallResult, timer: CallTimer) -> CallResult {
        let value = match result {
            Ok(value) => value,
            Err(thrown) => {
                let outcome = CallOutcome::Threw {
                    error: thrown.value().to_string(),
                };
                self.ctx.finish(timer, outcome);
                self.ctx.cache().leave(&self.original);
                return Err(thrown);
            }
        };

        if let Some(deferred) = value.as_deferred() {
            let ctx = Arc::clone(&self.ctx);
            let original = self.original.clone();
            deferred.on_settle(move |settlement| {
                let outcome = match settlement {
                    Settlement::Fulfilled(_) => CallOutcome::Resolved,
                    Settlement::Rejected(reason) => CallOutcome::Rejected {
                        reason: reason.to_string(),
                    },
                };
                ctx.finish(timer, outcome);
                ctx.cache().leave(&original);
            });
            return Ok(value);
        }

        self.ctx.finish(timer, CallOutcome::Returned);
        self.ctx.cache().leave(&self.original);

        if is_plain_object(&value) {
            return Ok(proxy::proxy_value(&self.ctx, value, &self.path, self.mode));
        }
        Ok(value)
    }
}

impl Callable for TimedFunction {
    fn call(&self, this: &Value, args: &[Value]) -> CallResult {
        if let Some(this_wrapper) = self.this_ref.upgrade() {
            self.ctx.cache().enter(&self.original, &this_wrapper);
        }
        let timer = self
            .ctx
            .begin(Arc::clone(&self.path), TimerKind::Call, self.mode);

        let result = self.original.call(this, args);
        self.settle(result, timer)
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for TimedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedFunction")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Get a timing wrapper for `original`.
///
/// While a call on `original` is in flight the live wrapper is returned, so
/// repeated requests never stack timers.
pub fn wrap_function(
    ctx: &Arc<InstrumentContext>,
    original: &Value,
    path: &str,
    mode: EvalMode,
) -> Arc<TimedFunction> {
    if let Some(live) = ctx.cache().lookup(original) {
        return live;
    }
    tracing::debug!(path = %path, "Wrapping function");
    ctx.events().emit(InstrumentEvent::FunctionWrapped {
        path: path.to_string(),
    });
    TimedFunction::new(Arc::clone(ctx), original.clone(), path.into(), mode)
}

/// Invoke `original` through its timing wrapper.
pub fn call_timed(
    ctx: &Arc<InstrumentContext>,
    original: &Value,
    path: &str,
    mode: EvalMode,
    this: &Value,
    args: &[Value],
) -> CallResult {
    wrap_function(ctx, original, path, mode).call(this, args)
}

/// A method read through a proxy node.
///
/// Each call delegates to the timing wrapper of the underlying method with
/// the caller's receiver.
pub(crate) struct BoundMember {
    pub(crate) ctx: Arc<InstrumentContext>,
    pub(crate) original: Value,
    pub(crate) path: Arc<str>,
    pub(crate) mode: EvalMode,
}

impl Callable for BoundMember {
    fn call(&self, this: &Value, args: &[Value]) -> CallResult {
        call_timed(&self.ctx, &self.original, &self.path, self.mode, this, args)
    }

    fn name(&self) -> &str {
        &self.path
    }
}

/// Reject non-callable targets of a direct invocation.
pub(crate) fn ensure_callable(value: &Value, path: &str) -> Result<(), Thrown> {
    if chronoscope_core::is_callable(value) {
        Ok(())
    } else {
        Err(Thrown::type_error(format!("{} is not a function", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoscope_core::{Deferred, PlainObject, arg};
    use chronoscope_timeline::{
        CollectingSubscriber, EventDispatcher, EventSubscriber, ManualClock, MemoryTimeline,
        SharedClock,
    };
    use parking_lot::Mutex;
    use std::sync::OnceLock;
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        ctx: Arc<InstrumentContext>,
        events: Arc<CollectingSubscriber>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let shared: SharedClock = Arc::clone(&clock) as SharedClock;
        let dispatcher = Arc::new(EventDispatcher::new());
        let events = Arc::new(CollectingSubscriber::new(1000));
        dispatcher.subscribe(Arc::clone(&events) as Arc<dyn EventSubscriber>);
        let ctx = InstrumentContext::new(
            Default::default(),
            Arc::new(MemoryTimeline::new(Arc::clone(&shared))),
            shared,
            dispatcher,
        );
        Fixture { clock, ctx, events }
    }

    #[test]
    fn test_sync_call_measured_once() {
        let fx = fixture();
        let clock = Arc::clone(&fx.clock);
        let f = Value::function("add", move |_, args| {
            clock.advance(Duration::from_millis(5));
            let a = arg(args, 0).as_number().unwrap_or(0.0);
            let b = arg(args, 1).as_number().unwrap_or(0.0);
            Ok(Value::Number(a + b))
        });

        let wrapped = wrap_function(&fx.ctx, &f, "library.add", EvalMode::Eager);
        let result = wrapped.call(&Value::Undefined, &[2.into(), 3.into()]).unwrap();

        assert_eq!(result, Value::Number(5.0));
        let measurements = fx.ctx.measurements();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].name, "library.add");
        assert_eq!(measurements[0].duration, Duration::from_millis(5));
        assert!(fx.ctx.cache().is_empty());
    }

    #[test]
    fn test_receiver_is_forwarded() {
        let fx = fixture();
        let f = Value::function("self", |this, _| Ok(this.clone()));
        let receiver = Value::from("me");

        let result = call_timed(&fx.ctx, &f, "library.self", EvalMode::Eager, &receiver, &[]).unwrap();
        assert_eq!(result, receiver);
    }

    #[test]
    fn test_thrown_error_propagates_unchanged() {
        let fx = fixture();
        let error = Thrown::error("boom");
        let thrown = error.clone();
        let f = Value::function("fail", move |_, _| Err(thrown.clone()));

        let result = call_timed(&fx.ctx, &f, "library.fail", EvalMode::Eager, &Value::Undefined, &[]);

        let err = result.unwrap_err();
        assert!(err.value().same_ref(error.value()));
        assert_eq!(fx.ctx.measurements().len(), 1);
        assert!(fx.ctx.cache().is_empty());
        assert_eq!(
            fx.events.log_lines(),
            vec!["Function library.fail failed after 0.00 ms with error: Error: boom"]
        );
    }

    #[test]
    fn test_deferred_measured_on_settlement() {
        let fx = fixture();
        let pending = Deferred::pending();
        let handle = Arc::clone(&pending);
        let f = Value::function("load", move |_, _| Ok(Value::deferred(Arc::clone(&handle))));

        let result = call_timed(&fx.ctx, &f, "library.load", EvalMode::Eager, &Value::Undefined, &[]).unwrap();

        assert!(result.same_ref(&Value::deferred(Arc::clone(&pending))));
        assert!(fx.ctx.measurements().is_empty());
        assert_eq!(fx.ctx.cache().len(), 1);

        fx.clock.advance(Duration::from_millis(7));
        pending.resolve("done");

        let measurements = fx.ctx.measurements();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].duration, Duration::from_millis(7));
        assert!(fx.ctx.cache().is_empty());
        assert_eq!(fx.events.log_lines(), vec!["Async function library.load took 7.00 ms."]);
    }

    #[test]
    fn test_rejected_deferred_is_measured() {
        let fx = fixture();
        let f = Value::function("load", |_, _| Ok(Value::deferred(Deferred::rejected("nope"))));

        let result = call_timed(&fx.ctx, &f, "library.load", EvalMode::Eager, &Value::Undefined, &[]).unwrap();

        assert_eq!(
            result.as_deferred().unwrap().settlement(),
            Some(Settlement::Rejected(Value::from("nope")))
        );
        assert_eq!(fx.ctx.measurements().len(), 1);
        assert_eq!(
            fx.events.log_lines(),
            vec!["Async function library.load failed after 0.00 ms with error: nope"]
        );
    }

    #[test]
    fn test_recursive_call_reuses_live_wrapper() {
        let fx = fixture();
        let ctx = Arc::clone(&fx.ctx);
        let slot: Arc<OnceLock<Value>> = Arc::new(OnceLock::new());
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let me = Arc::clone(&slot);
        let wrappers = Arc::clone(&seen);
        let countdown = Value::function("countdown", move |_, args| {
            let n = arg(args, 0).as_number().unwrap_or(0.0);
            if n <= 0.0 {
                return Ok(Value::Undefined);
            }
            let original = me.get().unwrap();
            let wrapper = wrap_function(&ctx, original, "library.countdown", EvalMode::Eager);
            wrappers.lock().push(Arc::as_ptr(&wrapper) as usize);
            wrapper.call(&Value::Undefined, &[Value::Number(n - 1.0)])
        });
        slot.set(countdown.clone()).unwrap();

        let root = wrap_function(&fx.ctx, &countdown, "library.countdown", EvalMode::Eager);
        root.call(&Value::Undefined, &[3.into()]).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|ptr| *ptr == Arc::as_ptr(&root) as usize));
        assert_eq!(fx.ctx.measurements().len(), 4);
        assert!(fx.ctx.cache().is_empty());
    }

    #[test]
    fn test_plain_object_result_is_proxied() {
        let fx = fixture();
        let f = Value::function("make", |_, _| {
            Ok(PlainObject::new()
                .with("ping", Value::function("ping", |_, _| Ok("pong".into())))
                .into_value())
        });

        let result = call_timed(&fx.ctx, &f, "library.make", EvalMode::Eager, &Value::Undefined, &[]).unwrap();
        assert!(result.downcast_ref::<crate::proxy::ProxyNode>().is_some());

        let pong = result.call_method("ping", &[]).unwrap();
        assert_eq!(pong, Value::from("pong"));

        let names: Vec<_> = fx.ctx.measurements().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["library.make", "library.make.ping"]);
    }
}
