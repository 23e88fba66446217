//! # weft-core
//!
//! Domain layer for the weft dependency-resolution and execution engine.
//!
//! This crate holds the vocabulary the engine operates on; it contains no
//! solving or execution logic of its own.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`key`] | Node identity keys for deduplication and cache addressing |
//! | [`scope`] | Scope labels, kinds and the declared outer-to-inner order |
//! | [`value`] | Type-erased values, provider context, teardown actions |
//! | [`dependent`] | Dependent descriptors and their builder |
//! | [`solved`] | Solved plans: DAG, scope assignment, topological levels |
//! | [`error`] | Error and result types |

pub mod dependent;
pub mod error;
pub mod key;
pub mod scope;
pub mod solved;
pub mod value;

// Re-export commonly used types
pub use dependent::{Dependent, DependentBuilder, DependentSource, Provider};
pub use error::{BoxError, Error, Result, TeardownError};
pub use key::Key;
pub use scope::{Scope, ScopeKind, ScopeOrder};
pub use solved::{NodeId, PlanSummary, SolvedNode, SolvedPlan};
pub use value::{Ctx, Teardown, Value};
