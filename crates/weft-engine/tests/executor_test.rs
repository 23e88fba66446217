//! Executor integration tests
//!
//! Concurrency behavior of the level-parallel backend: independent nodes
//! overlap, blocking providers offload, first-computation races serialize,
//! failures abort later levels but never orphan started siblings, and both
//! backends agree on results.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{count, counted_leaf};
use weft_engine::{
    Dependent, Engine, Error, ExecuteOptions, Key, SequentialExecutor, Value,
};

fn sleeping_async(name: &'static str, millis: u64, value: u32) -> Arc<Dependent> {
    Dependent::builder(name)
        .provide_async(move |_| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(Value::new(value))
        })
        .build()
}

/// Independent async providers in one level run concurrently: two 60ms
/// sleeps finish well under 120ms.
#[tokio::test]
async fn same_level_async_nodes_overlap() {
    common::init_tracing();
    let engine = Engine::new(["app"]);
    let root = Dependent::builder("sum")
        .depends_on(sleeping_async("x", 60, 1))
        .depends_on(sleeping_async("y", 60, 2))
        .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? + *ctx.dep::<u32>(1)?)))
        .build();
    let plan = engine.solve(&root).unwrap();

    let guard = engine.enter_global("app").unwrap();
    let started = tokio::time::Instant::now();
    let value = engine.execute(&plan, &engine.root_stack()).await.unwrap();
    let elapsed = started.elapsed();
    guard.exit().await.unwrap();

    assert_eq!(*value.downcast::<u32>().unwrap(), 3);
    assert!(elapsed < Duration::from_millis(115), "took {elapsed:?}");
}

/// Blocking providers are offloaded: two 60ms thread sleeps in one level
/// overlap instead of serializing on the scheduler.
#[tokio::test]
async fn blocking_providers_do_not_serialize() {
    let engine = Engine::builder().scopes(["app"]).blocking_limit(4).build();
    let block = |name: &'static str, value: u32| {
        Dependent::builder(name)
            .provide(move |_| {
                std::thread::sleep(Duration::from_millis(60));
                Ok(Value::new(value))
            })
            .build()
    };
    let root = Dependent::builder("sum")
        .depends_on(block("p", 10))
        .depends_on(block("q", 20))
        .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? + *ctx.dep::<u32>(1)?)))
        .build();
    let plan = engine.solve(&root).unwrap();

    let guard = engine.enter_global("app").unwrap();
    let started = tokio::time::Instant::now();
    let value = engine.execute(&plan, &engine.root_stack()).await.unwrap();
    let elapsed = started.elapsed();
    guard.exit().await.unwrap();

    assert_eq!(*value.downcast::<u32>().unwrap(), 30);
    assert!(elapsed < Duration::from_millis(115), "took {elapsed:?}");
}

/// Two executions racing on the same fresh frame compute each node exactly
/// once; all waiters observe the same value.
#[tokio::test]
async fn concurrent_first_computation_runs_once() {
    let engine = Arc::new(Engine::new(["app"]));
    let hits = Arc::new(AtomicUsize::new(0));
    let slot_hits = Arc::clone(&hits);
    let leaf = Dependent::builder("shared")
        .provide_async(move |_| {
            let hits = Arc::clone(&slot_hits);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Value::new(hits.fetch_add(1, Ordering::SeqCst) as u32))
            }
        })
        .build();
    let plan = Arc::new(engine.solve(&leaf).unwrap());

    let guard = engine.enter_global("app").unwrap();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        let plan = Arc::clone(&plan);
        handles.push(tokio::spawn(async move {
            let stack = engine.root_stack();
            engine
                .execute(plan.as_ref(), &stack)
                .await
                .map(|v| *v.downcast::<u32>().unwrap())
        }));
    }
    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap());
    }
    guard.exit().await.unwrap();

    assert_eq!(count(&hits), 1, "provider ran more than once");
    assert!(values.iter().all(|v| *v == values[0]));
}

/// A failing node aborts later levels, but an already-started sibling in
/// the same level is awaited to completion first.
#[tokio::test]
async fn failure_waits_for_started_siblings() {
    let engine = Engine::new(["app"]);
    let sibling_finished = Arc::new(AtomicBool::new(false));
    let finished = Arc::clone(&sibling_finished);
    let slow_sibling = Dependent::builder("slow")
        .provide_async(move |_| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(Value::new(1u32))
            }
        })
        .build();
    let failing = Dependent::builder("failing")
        .provide_async(|_| async { Err(anyhow::anyhow!("database unreachable").into()) })
        .build();
    let root_hits = Arc::new(AtomicUsize::new(0));
    let launched = Arc::clone(&root_hits);
    let root = Dependent::builder("root")
        .depends_on(slow_sibling)
        .depends_on(failing)
        .provide(move |_| {
            launched.fetch_add(1, Ordering::SeqCst);
            Ok(Value::new(0u32))
        })
        .build();
    // "slow" and "failing" share level 0; "root" is the next level.
    let plan = engine.solve(&root).unwrap();

    let guard = engine.enter_global("app").unwrap();
    let err = engine
        .execute(&plan, &engine.root_stack())
        .await
        .unwrap_err();
    guard.exit().await.unwrap();

    match err {
        Error::Provider { key, source } => {
            assert_eq!(key, Key::named("failing"));
            assert!(source.to_string().contains("unreachable"));
        }
        other => panic!("expected provider error, got {other}"),
    }
    assert!(
        sibling_finished.load(Ordering::SeqCst),
        "sibling was not awaited"
    );
    // The next level never launched.
    assert_eq!(count(&root_hits), 0);
}

/// A seeded key replaces invocation without polluting any frame cache.
#[tokio::test]
async fn seeded_values_bypass_providers_and_caches() {
    let engine = Engine::new(["app"]);
    let (config, hits) = counted_leaf("config", Some("app"), 10);
    let root = Dependent::builder("service")
        .depends_on(config)
        .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? + 1)))
        .build();
    let plan = engine.solve(&root).unwrap();

    let guard = engine.enter_global("app").unwrap();
    let seeded = engine
        .execute_with(
            &plan,
            &engine.root_stack(),
            &ExecuteOptions::new().seed("config", Value::new(99u32)),
        )
        .await
        .unwrap();
    assert_eq!(*seeded.downcast::<u32>().unwrap(), 100);
    assert_eq!(count(&hits), 0);

    // Without the seed the provider runs: nothing was cached by seeding.
    let fresh = engine.execute(&plan, &engine.root_stack()).await.unwrap();
    assert_eq!(*fresh.downcast::<u32>().unwrap(), 11);
    assert_eq!(count(&hits), 1);
    guard.exit().await.unwrap();
}

/// The sequential backend produces the same result as the concurrent one.
#[tokio::test]
async fn backends_agree() {
    let build_root = || {
        let base = Dependent::builder("base")
            .provide(|_| Ok(Value::new(2u32)))
            .build();
        let double = Dependent::builder("double")
            .depends_on(Arc::clone(&base))
            .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? * 2)))
            .build();
        let square = Dependent::builder("square")
            .depends_on(base)
            .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? * *ctx.dep::<u32>(0)?)))
            .build();
        Dependent::builder("sum")
            .depends_on(double)
            .depends_on(square)
            .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? + *ctx.dep::<u32>(1)?)))
            .build()
    };

    let concurrent = Engine::new(["app"]);
    let guard = concurrent.enter_global("app").unwrap();
    let a = concurrent
        .execute_root(&build_root(), &concurrent.root_stack())
        .await
        .unwrap();
    guard.exit().await.unwrap();

    let sequential = Engine::builder()
        .scopes(["app"])
        .executor(Arc::new(SequentialExecutor::new()))
        .build();
    let guard = sequential.enter_global("app").unwrap();
    let b = sequential
        .execute_root(&build_root(), &sequential.root_stack())
        .await
        .unwrap();
    guard.exit().await.unwrap();

    assert_eq!(
        *a.downcast::<u32>().unwrap(),
        *b.downcast::<u32>().unwrap()
    );
    assert_eq!(*a.downcast::<u32>().unwrap(), 8);
}
