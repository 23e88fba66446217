//! Shared helpers for the integration suites
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weft_engine::{Dependent, Value};

/// Install a test subscriber once; `WEFT_LOG=debug cargo test` shows engine
/// tracing.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WEFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A leaf descriptor whose provider counts its invocations.
pub fn counted_leaf(
    name: &'static str,
    scope: Option<&'static str>,
    value: u32,
) -> (Arc<Dependent>, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&counter);
    let mut builder = Dependent::builder(name);
    if let Some(scope) = scope {
        builder = builder.scope(scope);
    }
    let dependent = builder
        .provide(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(Value::new(value))
        })
        .build();
    (dependent, counter)
}

/// Invocation count helper.
pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
