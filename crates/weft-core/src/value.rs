//! Opaque computed values and the provider invocation context
//!
//! Providers produce a type-erased [`Value`] so that heterogeneous nodes can
//! share one cache and one results table. A provider receives a [`Ctx`]
//! holding its resolved dependency values (positional, in declaration order)
//! and a sink for [`Teardown`] actions that must run when the owning scope
//! exits.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::error::BoxError;

/// A type-erased, shareable computed value.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    /// Wrap a concrete value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Value(Arc::new(value))
    }

    /// Recover the concrete type, sharing the allocation.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// True when the wrapped value is a `T`.
    pub fn is<T: Send + Sync + 'static>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Value(..)")
    }
}

/// Cleanup action associated with a computed value, run when its owning
/// scope frame exits.
pub enum Teardown {
    /// Synchronous cleanup
    Sync(Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send>),
    /// Asynchronous cleanup
    Async(BoxFuture<'static, std::result::Result<(), BoxError>>),
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Sync(_) => f.write_str("Teardown::Sync(..)"),
            Teardown::Async(_) => f.write_str("Teardown::Async(..)"),
        }
    }
}

/// Invocation context handed to a provider.
///
/// Dependency values appear in the order the sub-dependencies were declared
/// on the descriptor. Teardowns registered here are attached to the scope
/// frame matching the node's resolved scope once the invocation returns,
/// whether it succeeded or failed, so cleanup of partial setup is never lost.
#[derive(Clone)]
pub struct Ctx {
    values: Arc<Vec<Value>>,
    teardowns: Arc<Mutex<Vec<Teardown>>>,
}

impl Ctx {
    /// Build a context from resolved dependency values.
    pub fn new(values: Vec<Value>) -> Self {
        Ctx {
            values: Arc::new(values),
            teardowns: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The resolved value of the `index`-th declared sub-dependency.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed accessor for the `index`-th declared sub-dependency.
    pub fn dep<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> std::result::Result<Arc<T>, BoxError> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| format!("no dependency at position {index}"))?;
        value
            .downcast::<T>()
            .ok_or_else(|| format!("dependency at position {index} is not a {}", std::any::type_name::<T>()).into())
    }

    /// Number of resolved dependency values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the node declared no sub-dependencies.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Register a synchronous teardown action.
    pub fn defer(&self, f: impl FnOnce() -> std::result::Result<(), BoxError> + Send + 'static) {
        self.teardowns
            .lock()
            .expect("teardown sink poisoned")
            .push(Teardown::Sync(Box::new(f)));
    }

    /// Register an asynchronous teardown action.
    pub fn defer_async(
        &self,
        fut: impl Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    ) {
        self.teardowns
            .lock()
            .expect("teardown sink poisoned")
            .push(Teardown::Async(Box::pin(fut)));
    }

    /// Drain the teardowns registered during this invocation, in
    /// registration order.
    pub fn take_teardowns(&self) -> Vec<Teardown> {
        std::mem::take(&mut *self.teardowns.lock().expect("teardown sink poisoned"))
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx").field("values", &self.values.len()).finish()
    }
}
