use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ripple::{ContextRef, Engine, ErrorValue, GraphError, Namespace, Value};

/// Engine plus a namespace that exposes engine variables by name.
fn setup() -> (Engine, Arc<Namespace>, ContextRef) {
    let engine = Engine::new();
    let namespace = Arc::new(Namespace::new());
    let ctx = ContextRef::from_arc(namespace.clone());
    (engine, namespace, ctx)
}

#[test]
fn test_reference_tracks_variable_without_reparsing() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    engine.set_value(x, 5.0);

    let y = engine.variable("y");
    engine.set_contents(y, "x+1", Some(&ctx)).unwrap();
    assert_eq!(engine.value(y), Value::Number(6.0));

    engine.set_value(x, 10.0);
    assert_eq!(engine.value(y), Value::Number(11.0));
}

#[test]
fn test_plain_context_value_resolves() {
    let (engine, namespace, ctx) = setup();
    namespace.insert_value("x", 5.0);
    assert_eq!(engine.evaluate("x+1", Some(&ctx)).unwrap(), Value::Number(6.0));
}

#[test]
fn test_propagation_chain() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let y = engine.variable("y");
    namespace.insert_variable("y", y);
    let z = engine.variable("z");

    engine.set_value(x, 2.0);
    engine.set_contents(y, "x+1", Some(&ctx)).unwrap();
    engine.set_contents(z, "y*2", Some(&ctx)).unwrap();
    assert_eq!(engine.value(z), Value::Number(6.0));

    engine.set_value(x, 4.0);
    assert_eq!(engine.value(y), Value::Number(5.0));
    assert_eq!(engine.value(z), Value::Number(10.0));
}

#[test]
fn test_diamond_dependency_settles_consistently() {
    let (engine, namespace, ctx) = setup();
    let a = engine.variable("a");
    namespace.insert_variable("a", a);
    let b = engine.variable("b");
    namespace.insert_variable("b", b);
    let c = engine.variable("c");
    namespace.insert_variable("c", c);
    let d = engine.variable("d");

    engine.set_value(a, 1.0);
    engine.set_contents(b, "a+1", Some(&ctx)).unwrap();
    engine.set_contents(c, "a+2", Some(&ctx)).unwrap();
    engine.set_contents(d, "b+c", Some(&ctx)).unwrap();
    assert_eq!(engine.value(d), Value::Number(5.0));

    engine.set_value(a, 10.0);
    // d must see both updated inputs, never a half-updated mix.
    assert_eq!(engine.value(d), Value::Number(23.0));
}

#[test]
fn test_cycle_rejected_and_state_untouched() {
    let (engine, namespace, ctx) = setup();
    let a = engine.variable("a");
    namespace.insert_variable("a", a);
    let b = engine.variable("b");
    namespace.insert_variable("b", b);

    engine.set_value(b, 7.0);
    engine.set_contents(a, "b", Some(&ctx)).unwrap();
    assert_eq!(engine.value(a), Value::Number(7.0));

    let error = engine.set_contents(b, "a", Some(&ctx)).unwrap_err();
    assert_eq!(
        error,
        GraphError::Cycle {
            from: "b".into(),
            to: "a".into()
        }
    );
    // The rejected mutation left everything exactly as it was.
    assert_eq!(engine.value(b), Value::Number(7.0));
    assert_eq!(engine.value(a), Value::Number(7.0));

    // And the graph still works afterwards.
    engine.set_value(b, 8.0);
    assert_eq!(engine.value(a), Value::Number(8.0));
}

#[test]
fn test_self_reference_rejected() {
    let (engine, namespace, ctx) = setup();
    let a = engine.variable("a");
    namespace.insert_variable("a", a);
    let error = engine.set_contents(a, "a+1", Some(&ctx)).unwrap_err();
    assert!(matches!(error, GraphError::Cycle { .. }));
}

#[test]
fn test_reference_error_carries_consumed_path() {
    let (engine, namespace, ctx) = setup();
    // `a` exists but has no subcontext or property `b`.
    namespace.insert_child("a", ContextRef::new(Namespace::new()));

    let value = engine.evaluate("a.b.c", Some(&ctx)).unwrap();
    assert_eq!(
        value,
        Value::error(ErrorValue::Reference {
            relative: false,
            path: vec!["a".into(), "b".into()],
        })
    );
}

#[test]
fn test_unbound_reference_is_an_error_value() {
    let engine = Engine::new();
    let value = engine.evaluate("x+1", None).unwrap();
    match value {
        Value::Error(error) => match *error {
            ErrorValue::Reference { path, .. } => assert_eq!(path, vec!["x".to_string()]),
            other => panic!("expected reference error, got {}", other),
        },
        other => panic!("expected an error value, got {}", other),
    }
}

#[test]
fn test_nested_contexts() {
    let (engine, namespace, ctx) = setup();
    let inner = Namespace::new();
    inner.insert_value("mass", 3.0);
    namespace.insert_child("body", ContextRef::new(inner));

    assert_eq!(
        engine.evaluate("body.mass * 2", Some(&ctx)).unwrap(),
        Value::Number(6.0)
    );
}

#[test]
fn test_equal_value_does_not_propagate() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let y = engine.variable("y");
    engine.set_value(x, 5.0);
    engine.set_contents(y, "x+1", Some(&ctx)).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    engine.on_change(y, move |_, _| {
        observed.fetch_add(1, Ordering::SeqCst);
    });

    let before = engine.stats(y);

    // Same value again: no recomputation anywhere downstream.
    engine.set_value(x, 5.0);
    assert_eq!(engine.stats(y), before);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // A forced notify re-reads the reference but must not touch y's
    // cached value or fire its callback.
    engine.notify_listeners(x);
    assert_eq!(engine.stats(y).recomputes, before.recomputes);
    assert_eq!(engine.value(y), Value::Number(6.0));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // A real change does both.
    engine.set_value(x, 6.0);
    assert_eq!(engine.value(y), Value::Number(7.0));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_change_notification_carries_new_value() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let y = engine.variable("y");
    engine.set_value(x, 1.0);
    engine.set_contents(y, "x*10", Some(&ctx)).unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.on_change(y, move |_, value| {
        sink.lock().push(value.clone());
    });

    engine.set_value(x, 2.0);
    engine.set_value(x, 3.0);
    assert_eq!(
        seen.lock().clone(),
        vec![Value::Number(20.0), Value::Number(30.0)]
    );
}

#[test]
fn test_vector_partial_recompute() {
    let (engine, _, ctx) = setup();
    let v = engine.variable("v");
    engine.set_contents(v, "{1, 2, 3}", Some(&ctx)).unwrap();
    assert_eq!(engine.stats(v).element_recomputes, vec![0, 0, 0]);

    engine.set_element(v, 1, "9").unwrap();
    assert_eq!(
        engine.value(v),
        Value::Vector(vec![
            Value::Number(1.0),
            Value::Number(9.0),
            Value::Number(3.0)
        ])
    );
    // Only index 1's domain recomputed.
    assert_eq!(engine.stats(v).element_recomputes, vec![0, 1, 0]);
}

#[test]
fn test_vector_insert_remove_renumber() {
    let (engine, _, ctx) = setup();
    let v = engine.variable("v");
    engine.set_contents(v, "{1, 2, 3}", Some(&ctx)).unwrap();

    engine.insert_element(v, 1, "9").unwrap();
    assert_eq!(
        engine.value(v),
        Value::Vector(vec![
            Value::Number(1.0),
            Value::Number(9.0),
            Value::Number(2.0),
            Value::Number(3.0)
        ])
    );
    assert_eq!(engine.stats(v).element_recomputes.len(), 4);

    engine.remove_element(v, 0).unwrap();
    assert_eq!(
        engine.value(v),
        Value::Vector(vec![
            Value::Number(9.0),
            Value::Number(2.0),
            Value::Number(3.0)
        ])
    );

    let error = engine.remove_element(v, 3).unwrap_err();
    assert!(matches!(error, GraphError::ElementOutOfRange { index: 3, .. }));
}

#[test]
fn test_vector_ops_require_a_vector() {
    let (engine, _, ctx) = setup();
    let s = engine.variable("s");
    engine.set_contents(s, "42", Some(&ctx)).unwrap();
    assert!(matches!(
        engine.set_element(s, 0, "1"),
        Err(GraphError::NotAVector { .. })
    ));
}

#[test]
fn test_vector_element_change_propagates_downstream() {
    let (engine, namespace, ctx) = setup();
    let v = engine.variable("v");
    namespace.insert_variable("v", v);
    let total = engine.variable("total");
    engine.set_contents(v, "{1, 2, 3}", Some(&ctx)).unwrap();
    engine
        .set_contents(total, "v[0] + v[1] + v[2]", Some(&ctx))
        .unwrap();
    assert_eq!(engine.value(total), Value::Number(6.0));

    engine.set_element(v, 1, "10").unwrap();
    assert_eq!(engine.value(total), Value::Number(14.0));
}

#[test]
fn test_relative_reference_uses_variable_context() {
    let (engine, namespace, ctx) = setup();
    namespace.insert_value("scale", 4.0);
    let y = engine.variable("y");
    engine.set_contents(y, ".scale * 2", Some(&ctx)).unwrap();
    assert_eq!(engine.value(y), Value::Number(8.0));
}

#[test]
fn test_rewiring_contents_drops_old_listeners() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let y = engine.variable("y");
    engine.set_value(x, 1.0);
    engine.set_contents(y, "x+1", Some(&ctx)).unwrap();
    assert_eq!(engine.value(y), Value::Number(2.0));

    // Replace y's contents with a constant; x updates must no longer
    // touch it.
    engine.set_contents(y, "100", Some(&ctx)).unwrap();
    let before = engine.stats(y);
    engine.set_value(x, 50.0);
    assert_eq!(engine.value(y), Value::Number(100.0));
    assert_eq!(engine.stats(y), before);
}

#[test]
fn test_settle_and_snapshot() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let y = engine.variable("y");
    engine.set_value(x, 2.0);
    engine.set_contents(y, "x^3", Some(&ctx)).unwrap();

    assert!(engine.settle(Duration::from_secs(1)));
    let snapshot = engine.snapshot(Duration::from_secs(1)).unwrap();
    assert_eq!(snapshot["x"], serde_json::json!(2.0));
    assert_eq!(snapshot["y"], serde_json::json!(8.0));
}
