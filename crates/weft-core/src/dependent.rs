//! Dependent descriptors
//!
//! A [`Dependent`] is an immutable node describing one requested value: the
//! provider that computes it, its declared sub-dependencies, an optional
//! scope label and a cache-participation flag. Descriptors are assembled by
//! explicit builder code (or generated registration code) rather than
//! runtime reflection; [`DependentSource`] is the seam an external
//! introspection layer implements.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::BoxError;
use crate::key::Key;
use crate::scope::Scope;
use crate::value::{Ctx, Value};

/// The callable that computes a node's value.
///
/// Sync providers are blocking and get offloaded to the executor's bounded
/// worker pool; async providers run on the cooperative scheduler directly.
#[derive(Clone)]
pub enum Provider {
    /// Blocking closure, offloaded at execution time
    Sync(Arc<dyn Fn(Ctx) -> std::result::Result<Value, BoxError> + Send + Sync>),
    /// Native future, polled on the cooperative scheduler
    Async(Arc<dyn Fn(Ctx) -> BoxFuture<'static, std::result::Result<Value, BoxError>> + Send + Sync>),
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Sync(_) => f.write_str("Provider::Sync(..)"),
            Provider::Async(_) => f.write_str("Provider::Async(..)"),
        }
    }
}

/// An immutable node describing one requested value and how to obtain it.
#[derive(Debug)]
pub struct Dependent {
    key: Key,
    provider: Option<Provider>,
    sub_dependencies: Vec<Arc<Dependent>>,
    scope: Option<Scope>,
    cache_participant: bool,
    implements: Vec<Key>,
    joined: Vec<Arc<Dependent>>,
}

impl Dependent {
    /// Start building a descriptor identified by `key`.
    pub fn builder(key: impl Into<Key>) -> DependentBuilder {
        DependentBuilder::new(key.into())
    }

    /// A descriptor with no provider of its own.
    ///
    /// It can only be executed through a bind that substitutes a concrete
    /// descriptor for it; solving it unbound fails with
    /// [`Error::Unresolved`](crate::error::Error::Unresolved).
    pub fn interface(key: impl Into<Key>) -> Arc<Dependent> {
        DependentBuilder::new(key.into()).build()
    }

    /// Identity key used to deduplicate equivalent nodes and address caches.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The provider, when this descriptor carries one.
    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_ref()
    }

    /// Declared sub-dependencies, in the order their values are passed to
    /// the provider.
    pub fn sub_dependencies(&self) -> &[Arc<Dependent>] {
        &self.sub_dependencies
    }

    /// Explicit scope label; `None` means infer at solve time.
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Whether this node shares values through the scope cache.
    pub fn cache_participant(&self) -> bool {
        self.cache_participant
    }

    /// Interface keys this descriptor declares it satisfies, consulted by
    /// covariant bind matching.
    pub fn implements(&self) -> &[Key] {
        &self.implements
    }

    /// Descriptors that must execute whenever this node executes, without
    /// their values being passed to the provider.
    pub fn joined(&self) -> &[Arc<Dependent>] {
        &self.joined
    }
}

/// Builder for [`Dependent`] descriptors.
#[derive(Debug)]
pub struct DependentBuilder {
    key: Key,
    provider: Option<Provider>,
    sub_dependencies: Vec<Arc<Dependent>>,
    scope: Option<Scope>,
    cache_participant: bool,
    implements: Vec<Key>,
    joined: Vec<Arc<Dependent>>,
}

impl DependentBuilder {
    fn new(key: Key) -> Self {
        DependentBuilder {
            key,
            provider: None,
            sub_dependencies: Vec::new(),
            scope: None,
            cache_participant: true,
            implements: Vec::new(),
            joined: Vec::new(),
        }
    }

    /// Pin the descriptor to an explicit scope.
    pub fn scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Opt out of cache participation: the provider runs on every execution,
    /// even when an identical node elsewhere in the plan is cached.
    pub fn transient(mut self) -> Self {
        self.cache_participant = false;
        self
    }

    /// Declare a sub-dependency; its value is passed to the provider at the
    /// position this call occupies among `depends_on` calls.
    pub fn depends_on(mut self, dependency: Arc<Dependent>) -> Self {
        self.sub_dependencies.push(dependency);
        self
    }

    /// Declare an interface key this descriptor satisfies.
    pub fn implements(mut self, key: impl Into<Key>) -> Self {
        self.implements.push(key.into());
        self
    }

    /// Join another descriptor: it executes whenever this node executes but
    /// its value is not passed to the provider.
    pub fn also_runs(mut self, dependency: Arc<Dependent>) -> Self {
        self.joined.push(dependency);
        self
    }

    /// Attach a blocking provider.
    pub fn provide<F>(mut self, f: F) -> Self
    where
        F: Fn(Ctx) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.provider = Some(Provider::Sync(Arc::new(f)));
        self
    }

    /// Attach an async provider.
    pub fn provide_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
    {
        self.provider = Some(Provider::Async(Arc::new(
            move |ctx| -> BoxFuture<'static, std::result::Result<Value, BoxError>> {
                Box::pin(f(ctx))
            },
        )));
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> Arc<Dependent> {
        Arc::new(Dependent {
            key: self.key,
            provider: self.provider,
            sub_dependencies: self.sub_dependencies,
            scope: self.scope,
            cache_participant: self.cache_participant,
            implements: self.implements,
            joined: self.joined,
        })
    }
}

/// Seam for external introspection or registration layers: anything that can
/// describe itself as a descriptor tree.
pub trait DependentSource {
    /// The descriptor for this source, including declared sub-dependencies
    /// and any embedded scope/cache metadata.
    fn describe(&self) -> Arc<Dependent>;
}

impl DependentSource for Arc<Dependent> {
    fn describe(&self) -> Arc<Dependent> {
        Arc::clone(self)
    }
}
