//! Concurrent executor
//!
//! Processes the plan's levels in order; within a level every node without a
//! cache hit is invoked concurrently on the cooperative scheduler, with
//! blocking providers offloaded to a bounded worker pool. A failure stops
//! further levels from launching, but already-started siblings are awaited
//! to completion first so their teardown registrations are never lost.

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;
use weft_core::{Result, SolvedPlan, Value};

use crate::state::ScopeStack;

use super::{results_table, root_value, run_node, validate_frames, ExecuteOptions, ExecutorBackend};

/// Default width of the blocking-provider worker pool.
const DEFAULT_BLOCKING_LIMIT: usize = 8;

/// Level-parallel execution backend.
pub struct ConcurrentExecutor {
    blocking: Semaphore,
}

impl ConcurrentExecutor {
    /// Executor with the default blocking-pool width.
    pub fn new() -> Self {
        Self::with_blocking_limit(DEFAULT_BLOCKING_LIMIT)
    }

    /// Executor with at most `limit` blocking providers in flight at once.
    pub fn with_blocking_limit(limit: usize) -> Self {
        ConcurrentExecutor {
            blocking: Semaphore::new(limit.max(1)),
        }
    }
}

impl Default for ConcurrentExecutor {
    fn default() -> Self {
        ConcurrentExecutor::new()
    }
}

#[async_trait]
impl ExecutorBackend for ConcurrentExecutor {
    async fn execute(
        &self,
        plan: &SolvedPlan,
        stack: &ScopeStack,
        options: &ExecuteOptions,
    ) -> Result<Value> {
        if options.validate_scopes() {
            validate_frames(plan, stack, options)?;
        }
        let results = results_table(plan, options);

        for (depth, level) in plan.levels().iter().enumerate() {
            let pending = level
                .iter()
                .copied()
                .filter(|id| results[id.index()].get().is_none())
                .map(|id| run_node(plan, stack, id, &results, &self.blocking));
            let outcomes = futures::future::join_all(pending).await;

            debug!(depth, width = level.len(), "level complete");
            // All siblings have finished; now propagate the first failure
            // and launch nothing further.
            for outcome in outcomes {
                outcome?;
            }
        }

        Ok(root_value(plan, &results))
    }
}
