//! End-to-end behavior of wrapped values.

use std::sync::Arc;
use std::time::Duration;

use chronoscope::prelude::*;
use chronoscope_core::{collect_iter, iter_result};
use chronoscope_timeline::SharedClock;

struct Harness {
    clock: Arc<ManualClock>,
    events: Arc<CollectingSubscriber>,
    profiler: Profiler,
}

fn harness_with(mode: EvalMode) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let events = Arc::new(CollectingSubscriber::new(1000));
    let profiler = Chronoscope::builder()
        .with_eval_mode(mode)
        .with_clock(Arc::clone(&clock) as SharedClock)
        .with_event_subscriber(Arc::clone(&events) as Arc<dyn EventSubscriber>)
        .build()
        .unwrap();
    Harness {
        clock,
        events,
        profiler,
    }
}

fn harness() -> Harness {
    harness_with(EvalMode::Eager)
}

fn names(profiler: &Profiler) -> Vec<String> {
    profiler.measurements().into_iter().map(|m| m.name).collect()
}

/// A small service graph: `users.find`, `users.count`, a constant, a map
/// and a method that calls its sibling through `this`.
fn service(clock: &Arc<ManualClock>) -> Value {
    let tick = Arc::clone(clock);
    let users = PlainObject::new()
        .with(
            "find",
            Value::function("find", move |_, args| {
                tick.advance(Duration::from_millis(2));
                Ok(PlainObject::new()
                    .with("id", arg(args, 0))
                    .with(
                        "describe",
                        Value::function("describe", |this, _| {
                            Ok(Value::from(format!("user {}", this.get("id")?)))
                        }),
                    )
                    .into_value())
            }),
        )
        .with("count", Value::function("count", |_, _| Ok(Value::from(3))))
        .into_value();

    let cache = MapObject::new();
    cache.insert("hits".into(), Value::from(1));

    PlainObject::new()
        .with("users", users)
        .with("cache", Value::object(cache))
        .with_constant("version", Value::function("version", |_, _| Ok("1.0".into())))
        .with(
            "total",
            Value::function("total", |this, _| {
                let users = this.get("users")?;
                let count = users.call_method("count", &[])?;
                Ok(count)
            }),
        )
        .into_value()
}

#[test]
fn test_wrapped_function_returns_result_and_measures_once() {
    let h = harness();
    let tick = Arc::clone(&h.clock);
    let f = Value::function("square", move |_, args| {
        tick.advance(Duration::from_millis(4));
        let n = arg(args, 0).as_number().unwrap_or(0.0);
        Ok(Value::Number(n * n))
    });

    let wrapped = h.profiler.wrap_at(f, "math.square");
    let result = wrapped.call(&Value::Undefined, &[Value::from(6)]).unwrap();

    assert_eq!(result, Value::Number(36.0));
    let measurements = h.profiler.measurements();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0].name, "math.square");
    assert_eq!(measurements[0].duration, Duration::from_millis(4));
    assert_eq!(h.events.log_lines(), vec!["Function math.square took 4.00 ms."]);
}

#[test]
fn test_method_measured_under_root_path() {
    let h = harness();
    let sdk = h.profiler.wrap(service(&h.clock));

    let count = sdk.get("users").unwrap().call_method("count", &[]).unwrap();

    assert_eq!(count, Value::from(3));
    assert_eq!(names(&h.profiler), vec!["library.users.count"]);
}

#[test]
fn test_reads_alone_do_not_measure() {
    let h = harness();
    let sdk = h.profiler.wrap(service(&h.clock));

    let users = sdk.get("users").unwrap();
    let _find = users.get("find").unwrap();

    assert!(h.profiler.measurements().is_empty());
}

#[test]
fn test_returned_objects_are_proxied_under_caller_path() {
    let h = harness();
    let sdk = h.profiler.wrap(service(&h.clock));

    let user = sdk
        .get("users")
        .unwrap()
        .call_method("find", &[Value::from(42)])
        .unwrap();
    let text = user.call_method("describe", &[]).unwrap();

    assert_eq!(text, Value::from("user 42"));
    assert_eq!(
        names(&h.profiler),
        vec!["library.users.find", "library.users.find.describe"]
    );
}

#[test]
fn test_locked_property_is_returned_raw() {
    let h = harness();
    let raw = service(&h.clock);
    let original = raw.get("version").unwrap();
    let sdk = h.profiler.wrap(raw);

    let version = sdk.get("version").unwrap();
    assert!(version.same_ref(&original));

    assert_eq!(version.call(&Value::Undefined, &[]).unwrap(), Value::from("1.0"));
    assert!(h.profiler.measurements().is_empty());
}

#[test]
fn test_opaque_native_keeps_working() {
    let h = harness();
    let raw = service(&h.clock);
    let original = raw.get("cache").unwrap();
    let sdk = h.profiler.wrap(raw);

    let cache = sdk.get("cache").unwrap();
    assert!(cache.same_ref(&original));

    let hits = cache.call_method("get", &["hits".into()]).unwrap();
    assert_eq!(hits, Value::from(1));
    assert!(h.profiler.measurements().is_empty());
}

#[test]
fn test_sibling_calls_through_this_measured_at_both_levels() {
    let h = harness();
    let sdk = h.profiler.wrap(service(&h.clock));

    let total = sdk.call_method("total", &[]).unwrap();

    assert_eq!(total, Value::from(3));
    assert_eq!(
        names(&h.profiler),
        vec!["library.users.count", "library.total"]
    );
}

#[test]
fn test_thrown_error_propagates_with_one_measurement() {
    let h = harness();
    let error = Thrown::error("bad input");
    let thrown = error.clone();
    let f = h
        .profiler
        .wrap_at(Value::function("parse", move |_, _| Err(thrown.clone())), "parse");

    let err = f.call(&Value::Undefined, &[]).unwrap_err();

    assert!(err.value().same_ref(error.value()));
    assert_eq!(names(&h.profiler), vec!["parse"]);
    assert_eq!(h.profiler.cache_len(), 0);
}

#[test]
fn test_deferred_measured_after_settlement() {
    let h = harness();
    let pending = Deferred::pending();
    let handle = Arc::clone(&pending);
    let f = h.profiler.wrap_at(
        Value::function("load", move |_, _| Ok(Value::deferred(Arc::clone(&handle)))),
        "api.load",
    );

    let result = f.call(&Value::Undefined, &[]).unwrap();
    assert!(h.profiler.measurements().is_empty());
    assert_eq!(h.profiler.in_flight(), 1);

    h.clock.advance(Duration::from_millis(12));
    pending.resolve("payload");

    assert_eq!(
        result.as_deferred().unwrap().settlement(),
        Some(Settlement::Fulfilled(Value::from("payload")))
    );
    let measurements = h.profiler.measurements();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0].duration, Duration::from_millis(12));
    assert_eq!(h.profiler.in_flight(), 0);
    assert_eq!(
        h.events.log_lines(),
        vec!["Async function api.load took 12.00 ms."]
    );
}

#[test]
fn test_iterator_steps_timed_without_double_wrapping() {
    let h = harness();
    let sdk = h.profiler.wrap(
        PlainObject::new()
            .with(
                "items",
                Value::object(ArrayObject::from_values(vec![1.into(), 2.into()])),
            )
            .into_value(),
    );

    let items = sdk.get("items").unwrap();
    let iterator = items
        .get(Symbol::Iterator)
        .unwrap()
        .call(&items, &[])
        .unwrap();
    let again = iterator
        .get(Symbol::Iterator)
        .unwrap()
        .call(&iterator, &[])
        .unwrap();
    assert!(again.same_ref(&iterator));

    let values = collect_iter(&again).unwrap();

    assert_eq!(values, vec![Value::from(1), Value::from(2)]);
    let names = names(&h.profiler);
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n == "library.items.@@iterator.next"));
}

#[test]
fn test_cache_empty_after_calls_complete() {
    let h = harness();
    let sdk = h.profiler.wrap(service(&h.clock));

    sdk.call_method("total", &[]).unwrap();
    sdk.get("users")
        .unwrap()
        .call_method("find", &[Value::from(1)])
        .unwrap();

    assert_eq!(h.profiler.cache_len(), 0);
    assert_eq!(h.profiler.in_flight(), 0);
}

#[test]
fn test_lazy_mode_yields_same_measurements() {
    let eager = harness_with(EvalMode::Eager);
    let lazy = harness_with(EvalMode::Lazy);

    for h in [&eager, &lazy] {
        let sdk = h.profiler.wrap(service(&h.clock));
        sdk.get("users")
            .unwrap()
            .call_method("find", &[Value::from(7)])
            .unwrap();
        sdk.call_method("total", &[]).unwrap();
    }

    let pending = lazy.profiler.context().pending_measures();
    assert_eq!(pending, 3);

    let eager_measurements = eager.profiler.measurements();
    let lazy_measurements = lazy.profiler.measurements();
    assert_eq!(eager_measurements, lazy_measurements);
    assert_eq!(lazy.profiler.context().pending_measures(), 0);
}

#[test]
fn test_report_aggregates_session() {
    let h = harness();
    let sdk = h.profiler.wrap(service(&h.clock));
    let users = sdk.get("users").unwrap();

    users.call_method("find", &[Value::from(1)]).unwrap();
    users.call_method("find", &[Value::from(2)]).unwrap();
    users.call_method("count", &[]).unwrap();

    let report = h.profiler.report();
    assert_eq!(report.root_path, "library");
    assert_eq!(report.aggregate[0].name, "library.users.find");
    assert_eq!(report.aggregate[0].count, 2);
    assert_eq!(report.aggregate[0].total_duration, Duration::from_millis(4));
    assert_eq!(report.total_duration(), Duration::from_millis(4));
    assert!(report.to_text().contains("library.users.count"));
}

#[test]
fn test_root_opaque_native_returned_unchanged() {
    let h = harness();
    let map = MapObject::new();
    map.insert("k".into(), Value::from(1));
    let original = Value::object(map);

    let wrapped = h.profiler.wrap(original.clone());

    assert!(wrapped.same_ref(&original));
    wrapped
        .call_method("set", &["k".into(), Value::from(2)])
        .unwrap();
    assert_eq!(wrapped.call_method("get", &["k".into()]).unwrap(), Value::from(2));
    assert_eq!(wrapped.get("size").unwrap(), Value::from(1));
    assert!(h.profiler.measurements().is_empty());
    assert_eq!(h.profiler.cache_len(), 0);
}

#[test]
fn test_async_iterator_steps_timed_through_proxy() {
    let h = harness();
    let pending = Deferred::pending();
    let steps = Arc::new(parking_lot::Mutex::new(vec![
        Deferred::resolved(iter_result(Value::Undefined, true)),
        Arc::clone(&pending),
        Deferred::resolved(iter_result(Value::from("a"), false)),
    ]));
    let iterator = PlainObject::new()
        .with(
            "next",
            Value::function("next", move |_, _| {
                let step = steps
                    .lock()
                    .pop()
                    .unwrap_or_else(|| Deferred::resolved(iter_result(Value::Undefined, true)));
                Ok(Value::deferred(step))
            }),
        )
        .into_value();
    let stream = PlainObject::new()
        .with(
            Symbol::AsyncIterator,
            Value::function("stream", move |_, _| Ok(iterator.clone())),
        )
        .into_value();
    let sdk = h
        .profiler
        .wrap(PlainObject::new().with("stream", stream).into_value());

    let source = sdk.get("stream").unwrap();
    let instrumented = source
        .get(Symbol::AsyncIterator)
        .unwrap()
        .call(&source, &[])
        .unwrap();

    instrumented.call_method("next", &[]).unwrap();
    assert_eq!(h.profiler.measurements().len(), 1);

    let second = instrumented.call_method("next", &[]).unwrap();
    assert!(second.as_deferred().unwrap().is_pending());
    assert_eq!(h.profiler.measurements().len(), 1);

    h.clock.advance(Duration::from_millis(3));
    pending.resolve(iter_result(Value::from("b"), false));
    instrumented.call_method("next", &[]).unwrap();

    let measurements = h.profiler.measurements();
    assert_eq!(measurements.len(), 3);
    assert!(
        measurements
            .iter()
            .all(|m| m.name == "library.stream.@@asyncIterator.next")
    );
    assert_eq!(measurements[1].duration, Duration::from_millis(3));
    assert_eq!(
        h.events.log_lines()[1],
        "Iterator library.stream.@@asyncIterator.next took 3.00 ms."
    );
}

#[tokio::test]
async fn test_spawned_deferred_is_measured_on_completion() {
    let profiler = Chronoscope::builder().build().unwrap();
    let f = profiler.wrap_at(
        Value::function("fetch", |_, args| {
            let id = arg(args, 0);
            Ok(Value::deferred(Deferred::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(id)
            })))
        }),
        "net.fetch",
    );

    let result = f.call(&Value::Undefined, &[Value::from("a")]).unwrap();
    assert!(profiler.measurements().is_empty());

    let settlement = result.as_deferred().unwrap().settled().await;

    assert_eq!(settlement, Some(Settlement::Fulfilled(Value::from("a"))));
    let measurements = profiler.measurements();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0].name, "net.fetch");
    assert!(measurements[0].duration >= Duration::from_millis(5));
}
