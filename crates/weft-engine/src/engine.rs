//! Engine facade
//!
//! The [`Engine`] is the composition root: it owns the bind registry, the
//! shared global scope frames, the declared scope order and the executor
//! backend, and exposes the two public entry points — `solve` and
//! `execute` — plus the convenience `execute_root` composing both.
//!
//! ```text
//!  Dependent tree ──► solve() ──► SolvedPlan (reusable)
//!                                     │
//!  enter_global()/enter_local() ──► ScopeStack
//!                                     │
//!                                 execute() ──► root Value
//! ```

use std::sync::Arc;

use tracing::{debug, warn};
use weft_core::{Dependent, DependentSource, Result, Scope, ScopeKind, ScopeOrder, SolvedPlan, Value};

use crate::bind::{BindHandle, BindRegistry, Matcher};
use crate::executor::{ConcurrentExecutor, ExecuteOptions, ExecutorBackend};
use crate::solver;
use crate::state::{GlobalScopes, ScopeFrame, ScopeGuard, ScopeStack};

/// Scope used when the builder declares none.
const DEFAULT_SCOPE: &str = "root";

/// The dependency-resolution and execution engine.
pub struct Engine {
    registry: Arc<BindRegistry>,
    global: Arc<GlobalScopes>,
    scopes: ScopeOrder,
    executor: Arc<dyn ExecutorBackend>,
}

impl Engine {
    /// An engine with the given outer-to-inner scope order and the default
    /// concurrent executor.
    pub fn new(scopes: impl IntoIterator<Item = impl Into<Scope>>) -> Self {
        Engine::builder().scopes(scopes).build()
    }

    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The declared outer-to-inner scope order.
    pub fn scope_order(&self) -> &ScopeOrder {
        &self.scopes
    }

    /// The shared bind registry.
    pub fn registry(&self) -> &BindRegistry {
        &self.registry
    }

    /// Register a permanent bind.
    pub fn bind(&self, matcher: Matcher, substitute: Arc<Dependent>) -> BindHandle {
        self.registry.bind(matcher, substitute)
    }

    /// Remove a bind. Idempotent.
    pub fn unbind(&self, handle: BindHandle) {
        self.registry.unbind(handle);
    }

    /// Enter a global scope frame, visible to every execution on this
    /// engine until the guard exits.
    pub fn enter_global(&self, scope: impl Into<Scope>) -> Result<ScopeGuard> {
        let scope = scope.into();
        debug!(scope = %scope, kind = ?ScopeKind::Global, "entering scope");
        let frame = ScopeFrame::new(scope, ScopeKind::Global);
        self.global.push(Arc::clone(&frame))?;
        Ok(ScopeGuard::global(
            frame,
            Arc::clone(&self.registry),
            Arc::clone(&self.global),
        ))
    }

    /// A fresh stack for one logical unit of work: no local frames yet,
    /// global frames shared.
    pub fn root_stack(&self) -> ScopeStack {
        ScopeStack::new(Arc::clone(&self.global), Arc::clone(&self.registry))
    }

    /// Solve a root descriptor into a reusable plan.
    pub fn solve<S: DependentSource>(&self, root: &S) -> Result<SolvedPlan> {
        solver::solve(&root.describe(), self.scopes.clone(), &self.registry)
    }

    /// Execute a solved plan with default options.
    pub async fn execute(&self, plan: &SolvedPlan, stack: &ScopeStack) -> Result<Value> {
        self.execute_with(plan, stack, &ExecuteOptions::new()).await
    }

    /// Execute a solved plan.
    pub async fn execute_with(
        &self,
        plan: &SolvedPlan,
        stack: &ScopeStack,
        options: &ExecuteOptions,
    ) -> Result<Value> {
        if plan.bind_epoch() != self.registry.epoch() {
            warn!(
                plan_epoch = plan.bind_epoch(),
                registry_epoch = self.registry.epoch(),
                "executing a plan solved against an older bind registry; re-solve to pick up new binds"
            );
        }
        self.executor.execute(plan, stack, options).await
    }

    /// Solve and execute in one call, for callers that do not need to cache
    /// the plan.
    pub async fn execute_root<S: DependentSource>(
        &self,
        root: &S,
        stack: &ScopeStack,
    ) -> Result<Value> {
        let plan = self.solve(root)?;
        self.execute(&plan, stack).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scopes", &self.scopes)
            .field("bind_epoch", &self.registry.epoch())
            .finish()
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    scopes: Option<ScopeOrder>,
    executor: Option<Arc<dyn ExecutorBackend>>,
    blocking_limit: Option<usize>,
}

impl EngineBuilder {
    /// Declare the outer-to-inner scope order.
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = impl Into<Scope>>) -> Self {
        self.scopes = Some(ScopeOrder::new(scopes));
        self
    }

    /// Use a custom executor backend.
    pub fn executor(mut self, executor: Arc<dyn ExecutorBackend>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Width of the default concurrent executor's blocking pool. Ignored
    /// when a custom executor is supplied.
    pub fn blocking_limit(mut self, limit: usize) -> Self {
        self.blocking_limit = Some(limit);
        self
    }

    /// Finish the engine.
    pub fn build(self) -> Engine {
        let scopes = match self.scopes {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => ScopeOrder::new([DEFAULT_SCOPE]),
        };
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(match self.blocking_limit {
                Some(limit) => ConcurrentExecutor::with_blocking_limit(limit),
                None => ConcurrentExecutor::new(),
            })
        });
        Engine {
            registry: Arc::new(BindRegistry::new()),
            global: GlobalScopes::new(),
            scopes,
            executor,
        }
    }
}
