//! Deferred (promise-like) results.
//!
//! A [`Deferred`] settles at most once, either fulfilled with a value or
//! rejected with a reason. Observers attached with [`Deferred::on_settle`]
//! run exactly once: immediately if the deferred is already settled,
//! otherwise on the thread that settles it. Nothing here blocks.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::classify::{NativeKind, ObjectClass};
use crate::function::arg;
use crate::object::Object;
use crate::value::{CallResult, PropertyKey, Thrown, Value};

/// Final state of a settled deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Completed with a value.
    Fulfilled(Value),
    /// Failed with a reason.
    Rejected(Value),
}

impl Settlement {
    /// Check if this is a fulfillment.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settlement::Fulfilled(_))
    }

    /// The fulfillment value or rejection reason.
    pub fn value(&self) -> &Value {
        match self {
            Settlement::Fulfilled(v) | Settlement::Rejected(v) => v,
        }
    }

    /// Convert into a `Result`, with rejections as [`Thrown`].
    pub fn into_result(self) -> CallResult {
        match self {
            Settlement::Fulfilled(v) => Ok(v),
            Settlement::Rejected(v) => Err(Thrown(v)),
        }
    }
}

type Observer = Box<dyn FnOnce(&Settlement) + Send>;

enum State {
    Pending(Vec<Observer>),
    Settled(Settlement),
}

/// A value representing a computation that completes later.
pub struct Deferred {
    state: Mutex<State>,
}

impl Deferred {
    /// Create a pending deferred.
    pub fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending(Vec::new())),
        })
    }

    /// Create a deferred already fulfilled with `value`.
    pub fn resolved(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Settled(Settlement::Fulfilled(value.into()))),
        })
    }

    /// Create a deferred already rejected with `reason`.
    pub fn rejected(reason: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Settled(Settlement::Rejected(reason.into()))),
        })
    }

    /// Fulfill the deferred. Returns `false` if it was already settled.
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.settle(Settlement::Fulfilled(value.into()))
    }

    /// Reject the deferred. Returns `false` if it was already settled.
    pub fn reject(&self, reason: impl Into<Value>) -> bool {
        self.settle(Settlement::Rejected(reason.into()))
    }

    /// Settle the deferred with an outcome.
    pub fn settle(&self, settlement: Settlement) -> bool {
        let observers = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(observers) => {
                    let observers = std::mem::take(observers);
                    *state = State::Settled(settlement.clone());
                    observers
                }
            }
        };
        for observer in observers {
            observer(&settlement);
        }
        true
    }

    /// Attach an observer that runs once the deferred settles.
    pub fn on_settle<F>(&self, observer: F)
    where
        F: FnOnce(&Settlement) + Send + 'static,
    {
        let settled = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending(observers) => {
                    observers.push(Box::new(observer));
                    return;
                }
                State::Settled(settlement) => settlement.clone(),
            }
        };
        observer(&settled);
    }

    /// The settlement, if the deferred has settled.
    pub fn settlement(&self) -> Option<Settlement> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Settled(settlement) => Some(settlement.clone()),
        }
    }

    /// Check if the deferred is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(&*self.state.lock(), State::Pending(_))
    }

    /// Chain continuations, producing a new deferred.
    ///
    /// The new deferred adopts the outcome of whichever handler runs. A
    /// missing handler passes the settlement through.
    pub fn then(&self, on_fulfilled: Option<Value>, on_rejected: Option<Value>) -> Arc<Deferred> {
        let next = Deferred::pending();
        let target = Arc::clone(&next);
        self.on_settle(move |settlement| {
            let handler = match settlement {
                Settlement::Fulfilled(_) => on_fulfilled,
                Settlement::Rejected(_) => on_rejected,
            };
            match handler {
                Some(handler) => match handler.call(&Value::Undefined, &[settlement.value().clone()]) {
                    Ok(result) => adopt(&target, result),
                    Err(thrown) => {
                        target.reject(thrown.into_value());
                    }
                },
                None => {
                    target.settle(settlement.clone());
                }
            }
        });
        next
    }
}

/// Settle `target` with `result`, following it if it is itself deferred.
fn adopt(target: &Arc<Deferred>, result: Value) {
    match result.as_deferred() {
        Some(inner) => {
            let target = Arc::clone(target);
            inner.on_settle(move |settlement| {
                target.settle(settlement.clone());
            });
        }
        None => {
            target.resolve(result);
        }
    }
}

fn handler(args: &[Value], index: usize) -> Option<Value> {
    let value = arg(args, index);
    crate::classify::is_callable(&value).then_some(value)
}

fn receiver<'a>(this: &'a Value, method: &str) -> Result<&'a Deferred, Thrown> {
    this.as_deferred().ok_or_else(|| {
        Thrown::type_error(format!(
            "Method Promise.prototype.{} called on incompatible receiver",
            method
        ))
    })
}

impl Object for Deferred {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        match key.as_str() {
            Some("then") => Ok(Value::function("then", |this, args| {
                let next = receiver(this, "then")?.then(handler(args, 0), handler(args, 1));
                Ok(Value::deferred(next))
            })),
            Some("catch") => Ok(Value::function("catch", |this, args| {
                let next = receiver(this, "catch")?.then(None, handler(args, 0));
                Ok(Value::deferred(next))
            })),
            _ => Ok(Value::Undefined),
        }
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::Native(NativeKind::Deferred)
    }

    fn describe(&self) -> String {
        "[object Promise]".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settlement", &self.settlement())
            .finish()
    }
}

#[cfg(feature = "async")]
mod bridge {
    use std::future::Future;
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use super::{Deferred, Settlement};
    use crate::value::Value;

    impl Deferred {
        /// Settle a new deferred from a future running on the tokio runtime.
        ///
        /// Must be called from within a tokio runtime.
        pub fn spawn<F>(future: F) -> Arc<Deferred>
        where
            F: Future<Output = Result<Value, Value>> + Send + 'static,
        {
            let deferred = Deferred::pending();
            let target = Arc::clone(&deferred);
            tokio::spawn(async move {
                match future.await {
                    Ok(value) => target.resolve(value),
                    Err(reason) => target.reject(reason),
                };
            });
            deferred
        }

        /// Wait for the deferred to settle.
        ///
        /// Returns `None` if the deferred was dropped without settling.
        pub fn settled(&self) -> impl Future<Output = Option<Settlement>> + Send + 'static {
            let (tx, rx) = oneshot::channel();
            self.on_settle(move |settlement| {
                let _ = tx.send(settlement.clone());
            });
            async move { rx.await.ok() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_settles_once() {
        let deferred = Deferred::pending();

        assert!(deferred.is_pending());
        assert!(deferred.resolve(1));
        assert!(!deferred.reject("late"));
        assert_eq!(deferred.settlement(), Some(Settlement::Fulfilled(Value::from(1))));
    }

    #[test]
    fn test_observer_runs_once_after_settlement() {
        let deferred = Deferred::pending();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        deferred.on_settle(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        deferred.reject("boom");
        deferred.resolve(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_on_settled_runs_immediately() {
        let deferred = Deferred::resolved("done");
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        deferred.on_settle(move |settlement| {
            *slot.lock() = Some(settlement.clone());
        });

        assert_eq!(*seen.lock(), Some(Settlement::Fulfilled(Value::from("done"))));
    }

    #[test]
    fn test_then_maps_value() {
        let deferred = Deferred::pending();
        let doubled = Value::deferred(Arc::clone(&deferred))
            .call_method(
                "then",
                &[Value::function("double", |_, args| {
                    Ok(Value::Number(arg(args, 0).as_number().unwrap_or(0.0) * 2.0))
                })],
            )
            .unwrap();

        deferred.resolve(21);
        let settlement = doubled.as_deferred().unwrap().settlement();
        assert_eq!(settlement, Some(Settlement::Fulfilled(Value::Number(42.0))));
    }

    #[test]
    fn test_catch_recovers_rejection() {
        let deferred = Deferred::rejected("bad");
        let recovered = deferred.then(None, Some(Value::function("recover", |_, _| Ok("ok".into()))));

        assert_eq!(recovered.settlement(), Some(Settlement::Fulfilled(Value::from("ok"))));
    }

    #[test]
    fn test_then_passes_rejection_through() {
        let deferred = Deferred::rejected("bad");
        let next = deferred.then(Some(Value::function("ignored", |_, _| Ok(Value::Undefined))), None);

        assert_eq!(next.settlement(), Some(Settlement::Rejected(Value::from("bad"))));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_spawn_and_await() {
        let deferred = Deferred::spawn(async { Ok(Value::from(7)) });
        let settlement = deferred.settled().await;

        assert_eq!(settlement, Some(Settlement::Fulfilled(Value::from(7))));
    }
}
