//! Executors
//!
//! An executor consumes a [`SolvedPlan`] and the caller's [`ScopeStack`] and
//! produces the root value, invoking each provider at most once per distinct
//! scope-cache entry. Two backends share one invocation path:
//!
//! - [`ConcurrentExecutor`] runs every non-cached node of a level
//!   concurrently, offloading blocking providers to a bounded worker pool.
//! - [`SequentialExecutor`] runs one node at a time in level order.

mod concurrent;
mod sequential;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use weft_core::{Ctx, Error, Key, NodeId, Provider, Result, SolvedPlan, Value};

use crate::state::{ScopeFrame, ScopeStack};

pub use concurrent::ConcurrentExecutor;
pub use sequential::SequentialExecutor;

/// Per-execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    skip_scope_validation: bool,
    seeds: HashMap<Key, Value>,
}

impl ExecuteOptions {
    /// Defaults: scope validation on, no seeded values.
    pub fn new() -> Self {
        ExecuteOptions::default()
    }

    /// Skip the upfront whole-plan check that every resolved scope frame is
    /// active. For hot paths where the caller guarantees scopes are
    /// pre-entered; a missing frame still fails at the node that needs it.
    pub fn skip_scope_validation(mut self) -> Self {
        self.skip_scope_validation = true;
        self
    }

    /// Pre-supply a value for a node: its provider is not invoked and the
    /// value is not written to any scope cache.
    pub fn seed(mut self, key: impl Into<Key>, value: Value) -> Self {
        self.seeds.insert(key.into(), value);
        self
    }

    pub(crate) fn validate_scopes(&self) -> bool {
        !self.skip_scope_validation
    }

    pub(crate) fn seeds(&self) -> &HashMap<Key, Value> {
        &self.seeds
    }
}

/// Pluggable execution backend for solved plans.
#[async_trait]
pub trait ExecutorBackend: Send + Sync {
    /// Evaluate the plan against the caller's scope stack and return the
    /// root value.
    async fn execute(
        &self,
        plan: &SolvedPlan,
        stack: &ScopeStack,
        options: &ExecuteOptions,
    ) -> Result<Value>;
}

/// Per-execution results table; each slot is written once, by the level that
/// computes the node.
pub(crate) type Results = Vec<OnceLock<Value>>;

pub(crate) fn results_table(plan: &SolvedPlan, options: &ExecuteOptions) -> Results {
    let results: Results = (0..plan.nodes().len()).map(|_| OnceLock::new()).collect();
    for (key, value) in options.seeds() {
        if let Some(id) = plan.node_by_key(key) {
            let _ = results[id.index()].set(value.clone());
        }
    }
    results
}

/// Upfront check that every node's resolved scope frame is active. Seeded
/// nodes are exempt: their providers never run.
pub(crate) fn validate_frames(
    plan: &SolvedPlan,
    stack: &ScopeStack,
    options: &ExecuteOptions,
) -> Result<()> {
    for node in plan.nodes() {
        if options.seeds().contains_key(node.dependent.key()) {
            continue;
        }
        if stack.find(&node.scope).is_none() {
            return Err(Error::ScopeNotActive {
                scope: node.scope.clone(),
                key: node.dependent.key().clone(),
            });
        }
    }
    Ok(())
}

/// Compute one node: cache hit, or provider invocation serialized through
/// the frame's once-cell so concurrent first computations run the provider
/// exactly once. Writes the node's value into the results table.
pub(crate) async fn run_node(
    plan: &SolvedPlan,
    stack: &ScopeStack,
    id: NodeId,
    results: &Results,
    blocking: &Semaphore,
) -> Result<()> {
    let node = plan.node(id);
    let key = node.dependent.key();
    let frame = stack.find(&node.scope).ok_or_else(|| Error::ScopeNotActive {
        scope: node.scope.clone(),
        key: key.clone(),
    })?;

    let value = if node.dependent.cache_participant() {
        let slot = frame.slot(key);
        slot.get_or_try_init(|| invoke(plan, id, results, &frame, blocking))
            .await?
            .clone()
    } else {
        // Opted out of caching: always invoked, never shared.
        invoke(plan, id, results, &frame, blocking).await?
    };

    let _ = results[id.index()].set(value);
    Ok(())
}

/// Invoke a node's provider with its resolved dependency values. Teardowns
/// collected during the invocation are attached to the frame whether the
/// provider succeeded or failed.
async fn invoke(
    plan: &SolvedPlan,
    id: NodeId,
    results: &Results,
    frame: &Arc<ScopeFrame>,
    blocking: &Semaphore,
) -> Result<Value> {
    let node = plan.node(id);
    let deps: Vec<Value> = node
        .dependencies
        .iter()
        .map(|dep| {
            results[dep.index()]
                .get()
                .cloned()
                .expect("dependency resolved in an earlier level")
        })
        .collect();
    let ctx = Ctx::new(deps);

    let provider = node
        .dependent
        .provider()
        .expect("solver rejects descriptors without a provider");
    let outcome = match provider {
        Provider::Sync(call) => {
            let call = Arc::clone(call);
            let call_ctx = ctx.clone();
            // Bounded offload: blocking providers must not stall async
            // siblings scheduled in the same level.
            let _permit = blocking
                .acquire()
                .await
                .expect("blocking pool semaphore closed");
            match tokio::task::spawn_blocking(move || call(call_ctx)).await {
                Ok(result) => result,
                Err(join) => Err(Box::new(join) as weft_core::BoxError),
            }
        }
        Provider::Async(call) => call(ctx.clone()).await,
    };

    frame.push_teardowns(ctx.take_teardowns());

    outcome.map_err(|source| Error::Provider {
        key: node.dependent.key().clone(),
        source,
    })
}

pub(crate) fn root_value(plan: &SolvedPlan, results: &Results) -> Value {
    results[plan.root().index()]
        .get()
        .cloned()
        .expect("root resolved by the final level")
}
