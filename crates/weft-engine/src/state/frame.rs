//! Scope frames
//!
//! A frame is one active lifetime boundary: it owns the value cache for its
//! scope label, the LIFO teardown list, and the bind entries scoped to it.
//! Cache slots are `OnceCell`s so that concurrent first computations of the
//! same node within one frame serialize onto a single provider invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;
use weft_core::{Key, Scope, ScopeKind, Teardown, TeardownError, Value};

use crate::bind::{BindHandle, BindRegistry};

/// One active scope frame.
pub struct ScopeFrame {
    label: Scope,
    kind: ScopeKind,
    cache: DashMap<Key, Arc<tokio::sync::OnceCell<Value>>>,
    teardowns: Mutex<Vec<Teardown>>,
    overlay: Mutex<Vec<BindHandle>>,
    closed: AtomicBool,
}

impl ScopeFrame {
    pub(crate) fn new(label: Scope, kind: ScopeKind) -> Arc<Self> {
        Arc::new(ScopeFrame {
            label,
            kind,
            cache: DashMap::new(),
            teardowns: Mutex::new(Vec::new()),
            overlay: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// The scope label this frame was entered under.
    pub fn label(&self) -> &Scope {
        &self.label
    }

    /// Whether the frame is engine-wide or context-local.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// A frame that has exited never serves lookups again, even if stale
    /// stack clones still reference it.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The at-most-once computation slot for `key` in this frame.
    pub(crate) fn slot(&self, key: &Key) -> Arc<tokio::sync::OnceCell<Value>> {
        self.cache
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::OnceCell::new()))
            .clone()
    }

    /// Attach teardowns collected from one provider invocation. They run in
    /// reverse registration order when the frame exits.
    pub(crate) fn push_teardowns(&self, teardowns: Vec<Teardown>) {
        if teardowns.is_empty() {
            return;
        }
        self.teardowns
            .lock()
            .expect("teardown list poisoned")
            .extend(teardowns);
    }

    /// Attach a bind entry for automatic removal on exit.
    pub(crate) fn attach_bind(&self, handle: BindHandle) {
        self.overlay
            .lock()
            .expect("bind overlay poisoned")
            .push(handle);
    }

    /// Exit the frame: run every teardown LIFO (failures collected, never
    /// fail-fast), evict the cache, and remove scoped bind entries.
    pub(crate) async fn close(&self, registry: &BindRegistry) -> Result<(), TeardownError> {
        self.closed.store(true, Ordering::Release);
        debug!(scope = %self.label, "exiting scope frame");

        let mut teardowns = std::mem::take(
            &mut *self.teardowns.lock().expect("teardown list poisoned"),
        );
        let mut failures = Vec::new();
        while let Some(action) = teardowns.pop() {
            let outcome = match action {
                Teardown::Sync(f) => f(),
                Teardown::Async(fut) => fut.await,
            };
            if let Err(err) = outcome {
                failures.push(err);
            }
        }

        self.cache.clear();
        self.detach_binds(registry);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError {
                scope: self.label.clone(),
                failures,
            })
        }
    }

    /// Backstop for guards dropped without an explicit exit: runs sync
    /// teardowns LIFO and reports how many async teardowns had to be
    /// skipped.
    pub(crate) fn close_sync(&self, registry: &BindRegistry) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut teardowns = std::mem::take(
            &mut *self.teardowns.lock().expect("teardown list poisoned"),
        );
        let mut skipped = 0;
        while let Some(action) = teardowns.pop() {
            match action {
                Teardown::Sync(f) => {
                    if let Err(err) = f() {
                        tracing::error!(scope = %self.label, error = %err, "teardown failed during drop");
                    }
                }
                Teardown::Async(_) => skipped += 1,
            }
        }
        self.cache.clear();
        self.detach_binds(registry);
        skipped
    }

    fn detach_binds(&self, registry: &BindRegistry) {
        let handles = std::mem::take(&mut *self.overlay.lock().expect("bind overlay poisoned"));
        for handle in handles {
            registry.unbind(handle);
        }
    }
}

impl std::fmt::Debug for ScopeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeFrame")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("cached", &self.cache.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn teardowns_run_in_reverse_registration_order() {
        let frame = ScopeFrame::new("request".into(), ScopeKind::Local);
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["t1", "t2", "t3"] {
            let order = Arc::clone(&order);
            frame.push_teardowns(vec![Teardown::Sync(Box::new(move || {
                order.lock().unwrap().push(tag);
                Ok(())
            }))]);
        }
        let registry = BindRegistry::new();
        frame.close(&registry).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn failing_teardown_does_not_stop_the_rest() {
        let frame = ScopeFrame::new("request".into(), ScopeKind::Local);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran1 = Arc::clone(&ran);
        frame.push_teardowns(vec![Teardown::Sync(Box::new(move || {
            ran1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))]);
        frame.push_teardowns(vec![Teardown::Sync(Box::new(|| Err("t2 failed".into())))]);
        let ran3 = Arc::clone(&ran);
        frame.push_teardowns(vec![Teardown::Async(Box::pin(async move {
            ran3.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))]);

        let registry = BindRegistry::new();
        let err = frame.close(&registry).await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert!(err.failures[0].to_string().contains("t2"));
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_evicts_cache_and_detaches_binds() {
        let registry = BindRegistry::new();
        let frame = ScopeFrame::new("request".into(), ScopeKind::Local);
        frame
            .slot(&Key::named("db"))
            .set(Value::new(1u8))
            .unwrap();
        let handle = registry.bind(
            crate::bind::Matcher::exact("x"),
            weft_core::Dependent::builder("y")
                .provide(|_| Ok(Value::new(0u8)))
                .build(),
        );
        frame.attach_bind(handle);
        let epoch_before = registry.epoch();

        frame.close(&registry).await.unwrap();
        assert!(frame.is_closed());
        assert!(frame.slot(&Key::named("db")).get().is_none());
        // The scoped bind was removed from the registry.
        assert_eq!(registry.epoch(), epoch_before + 1);
    }
}
