//! # weft-engine
//!
//! Engine layer for the weft dependency-resolution and execution engine:
//! given a root descriptor, build a reusable execution plan, assign every
//! node a lifetime scope, and evaluate the plan — independent nodes
//! concurrently — against a stack of nested, cached, torn-down scopes.
//!
//! ## Architecture
//!
//! ```text
//!          ┌──────────────┐   snapshot   ┌──────────────┐
//!          │ BindRegistry │─────────────►│    Solver    │
//!          └──────────────┘              └──────┬───────┘
//!                 ▲                             │ SolvedPlan
//!     bind/unbind │                             ▼
//!          ┌──────┴───────┐  frames  ┌──────────────────┐
//!          │  ScopeStack  │─────────►│ ExecutorBackend   │
//!          │ (global+local)│          │ (concurrent/seq) │
//!          └──────────────┘          └──────────────────┘
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bind`] | Bind registry: matchers, substitution, scoped entries |
//! | [`solver`] | DAG construction, scope inference/validation, levels |
//! | [`state`] | Scope frames, the nested stack, scoped-acquisition guards |
//! | [`executor`] | Concurrent and sequential execution backends |
//! | [`engine`] | The facade tying registry, scopes and executors together |

pub mod bind;
pub mod engine;
pub mod executor;
pub mod solver;
pub mod state;

// Re-export commonly used types
pub use bind::{BindHandle, BindRegistry, Matcher};
pub use engine::{Engine, EngineBuilder};
pub use executor::{ConcurrentExecutor, ExecuteOptions, ExecutorBackend, SequentialExecutor};
pub use solver::solve;
pub use state::{ScopeGuard, ScopeStack};

// Domain types, re-exported so most callers depend on one crate
pub use weft_core::{
    BoxError, Ctx, Dependent, DependentBuilder, DependentSource, Error, Key, NodeId, PlanSummary,
    Provider, Result, Scope, ScopeKind, ScopeOrder, SolvedNode, SolvedPlan, Teardown,
    TeardownError, Value,
};
