use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ripple::{ContextRef, Engine, Namespace, Value};

fn setup() -> (Engine, Arc<Namespace>, ContextRef) {
    let engine = Engine::new();
    let namespace = Arc::new(Namespace::new());
    let ctx = ContextRef::from_arc(namespace.clone());
    (engine, namespace, ctx)
}

#[test]
fn test_concurrent_writers_settle_to_a_consistent_state() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let doubled = engine.variable("doubled");
    engine.set_value(x, 0.0);
    engine.set_contents(doubled, "x*2", Some(&ctx)).unwrap();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for step in 0..50 {
                engine.set_value(x, (worker * 100 + step) as f64);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(engine.settle(Duration::from_secs(5)));
    let x_value = engine.value(x).as_number().expect("x is a number");
    assert_eq!(engine.value(doubled), Value::Number(x_value * 2.0));
}

#[test]
fn test_wide_fanout_recomputes_every_dependent() {
    let (engine, namespace, ctx) = setup();
    let base = engine.variable("base");
    namespace.insert_variable("base", base);
    engine.set_value(base, 1.0);

    let dependents: Vec<_> = (0..32)
        .map(|i| {
            let var = engine.variable(&format!("dep_{}", i));
            engine
                .set_contents(var, &format!("base + {}", i), Some(&ctx))
                .unwrap();
            var
        })
        .collect();

    engine.set_value(base, 100.0);
    assert!(engine.settle(Duration::from_secs(5)));
    for (i, &var) in dependents.iter().enumerate() {
        assert_eq!(engine.value(var), Value::Number(100.0 + i as f64));
    }
}

#[test]
fn test_layered_fanout_respects_wave_order() {
    let (engine, namespace, ctx) = setup();
    let a = engine.variable("a");
    namespace.insert_variable("a", a);
    engine.set_value(a, 1.0);

    // Layer one: eight parallel dependents; layer two sums pairs.
    for i in 0..8 {
        let var = engine.variable(&format!("mid_{}", i));
        namespace.insert_variable(&format!("mid_{}", i), var);
        engine
            .set_contents(var, &format!("a * {}", i + 1), Some(&ctx))
            .unwrap();
    }
    let mut sums = Vec::new();
    for i in 0..4 {
        let var = engine.variable(&format!("sum_{}", i));
        engine
            .set_contents(
                var,
                &format!("mid_{} + mid_{}", 2 * i, 2 * i + 1),
                Some(&ctx),
            )
            .unwrap();
        sums.push(var);
    }

    engine.set_value(a, 10.0);
    assert!(engine.settle(Duration::from_secs(5)));
    for (i, &var) in sums.iter().enumerate() {
        let expected = 10.0 * (2 * i + 1) as f64 + 10.0 * (2 * i + 2) as f64;
        assert_eq!(engine.value(var), Value::Number(expected));
    }
}

#[test]
fn test_readers_run_alongside_writers() {
    let (engine, namespace, ctx) = setup();
    let x = engine.variable("x");
    namespace.insert_variable("x", x);
    let y = engine.variable("y");
    engine.set_value(x, 0.0);
    engine.set_contents(y, "x+1", Some(&ctx)).unwrap();

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || {
            for step in 0..200 {
                engine.set_value(x, step as f64);
            }
        })
    };
    let reader = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                // Any observed value must be a number, never a torn state.
                assert!(engine.value(y).as_number().is_some());
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();

    assert!(engine.settle(Duration::from_secs(5)));
    assert_eq!(engine.value(y), Value::Number(200.0));
}

#[test]
fn test_settle_on_idle_engine_returns_immediately() {
    let engine = Engine::new();
    assert!(engine.settle(Duration::ZERO));
}
