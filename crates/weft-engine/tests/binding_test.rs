//! Bind integration tests
//!
//! Substitution through the engine API: interface-to-implementation binds,
//! covariant matching via declared interfaces, scoped binds that deactivate
//! on frame exit, and manual unbind.

mod common;

use std::sync::Arc;

use weft_engine::{Dependent, Engine, Error, Key, Matcher, Value};

fn implementation(name: &'static str, value: u32) -> Arc<Dependent> {
    Dependent::builder(name)
        .provide(move |_| Ok(Value::new(value)))
        .build()
}

/// An interface descriptor resolves through its bind and executes the
/// substitute's provider.
#[tokio::test]
async fn interface_resolves_through_bind() {
    common::init_tracing();
    let engine = Engine::new(["app"]);
    let root = Dependent::builder("handler")
        .depends_on(Dependent::interface("repository"))
        .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)? * 2)))
        .build();

    engine.bind(Matcher::exact("repository"), implementation("postgres", 21));

    let guard = engine.enter_global("app").unwrap();
    let value = engine
        .execute_root(&root, &engine.root_stack())
        .await
        .unwrap();
    assert_eq!(*value.downcast::<u32>().unwrap(), 42);
    guard.exit().await.unwrap();
}

/// A covariant bind catches descriptors that declare the target as an
/// implemented interface; an exact bind for the same descriptor wins.
#[test]
fn covariant_bind_matches_declared_interfaces() {
    let engine = Engine::new(["app"]);
    let request = Dependent::builder("dog").implements("animal").build();

    engine.bind(Matcher::covariant("animal"), implementation("live-animal", 1));
    let plan = engine
        .solve(&Dependent::builder("root").depends_on(Arc::clone(&request)).provide(|_| Ok(Value::new(0u32))).build())
        .unwrap();
    assert!(plan.node_by_key(&Key::named("live-animal")).is_some());
}

/// A bind scoped to a frame is inactive outside it: resolution falls back
/// to the unbound descriptor and fails with `Unresolved`.
#[tokio::test]
async fn scoped_bind_deactivates_on_frame_exit() {
    let engine = Engine::new(["app", "request"]);
    let root = Dependent::builder("service")
        .depends_on(Dependent::interface("gateway"))
        .provide(|ctx| Ok(Value::new(*ctx.dep::<u32>(0)?)))
        .build();

    let app = engine.enter_global("app").unwrap();
    let base = engine.root_stack();
    let (request_stack, request) = base.enter_local("request").unwrap();
    request_stack
        .bind_scoped(
            Matcher::exact("gateway"),
            implementation("stub-gateway", 9),
            None,
        )
        .unwrap();

    // Inside the frame the bind applies.
    let value = engine
        .execute_root(&root, &request_stack)
        .await
        .unwrap();
    assert_eq!(*value.downcast::<u32>().unwrap(), 9);

    // Outside it, the interface is unresolvable again.
    request.exit().await.unwrap();
    let err = engine.solve(&root).unwrap_err();
    assert!(matches!(err, Error::Unresolved { key } if key == Key::named("gateway")));

    app.exit().await.unwrap();
}

/// Manual unbind removes an entry immediately and is idempotent.
#[test]
fn unbind_is_immediate_and_idempotent() {
    let engine = Engine::new(["app"]);
    let root = Dependent::builder("svc")
        .depends_on(Dependent::interface("port"))
        .provide(|_| Ok(Value::new(0u32)))
        .build();

    let handle = engine.bind(Matcher::exact("port"), implementation("adapter", 1));
    assert!(engine.solve(&root).is_ok());

    engine.unbind(handle);
    engine.unbind(handle);
    assert!(matches!(
        engine.solve(&root).unwrap_err(),
        Error::Unresolved { .. }
    ));
}

/// Rebinding after a solve leaves the old plan executable but flags it
/// stale through the epoch stamp.
#[tokio::test]
async fn stale_plans_still_execute() {
    let engine = Engine::new(["app"]);
    let root = implementation("standalone", 5);
    let plan = engine.solve(&root).unwrap();

    engine.bind(Matcher::exact("standalone"), implementation("replacement", 6));
    assert_ne!(plan.bind_epoch(), engine.registry().epoch());

    let guard = engine.enter_global("app").unwrap();
    // The old plan still runs with its solved-in provider.
    let value = engine.execute(&plan, &engine.root_stack()).await.unwrap();
    assert_eq!(*value.downcast::<u32>().unwrap(), 5);
    guard.exit().await.unwrap();
}
