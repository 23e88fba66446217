//! Sequential executor
//!
//! Same contract as the concurrent backend, but strictly one node at a
//! time in level order. Useful for debugging execution order and for
//! plans whose providers are not worth scheduling concurrently.

use async_trait::async_trait;
use tokio::sync::Semaphore;
use weft_core::{Result, SolvedPlan, Value};

use crate::state::ScopeStack;

use super::{results_table, root_value, run_node, validate_frames, ExecuteOptions, ExecutorBackend};

/// One-node-at-a-time execution backend.
pub struct SequentialExecutor {
    // Blocking providers still leave the async runtime; a single permit
    // keeps them one at a time.
    blocking: Semaphore,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        SequentialExecutor {
            blocking: Semaphore::new(1),
        }
    }
}

impl Default for SequentialExecutor {
    fn default() -> Self {
        SequentialExecutor::new()
    }
}

#[async_trait]
impl ExecutorBackend for SequentialExecutor {
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

        for level in plan.levels() {
            for &id in level {
                if results[id.index()].get().is_some() {
                    continue;
                }
                run_node(plan, stack, id, &results, &self.blocking).await?;
            }
        }

        Ok(root_value(plan, &results))
    }
}
