//! Error handling types

use thiserror::Error;

use crate::key::Key;
use crate::scope::Scope;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type for provider and teardown failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the weft engine
///
/// Solve-time variants (`DependencyCycle`, `BindingCycle`, `ScopeConflict`,
/// `ScopeViolation`, `UnknownScope`, `Unresolved`) are programmer errors and
/// surface synchronously from `solve`. Execution-time variants surface from
/// `execute`.
#[derive(Error, Debug)]
pub enum Error {
    /// A descriptor transitively includes itself
    #[error("dependency cycle detected: {path}")]
    DependencyCycle {
        /// The offending chain, rendered as `a -> b -> a`
        path: String,
    },

    /// Bind substitution resolved back to a descriptor already seen in the
    /// current resolution chain
    #[error("binding cycle detected while resolving {key}: {path}")]
    BindingCycle {
        /// Key the resolution started from
        key: Key,
        /// The offending substitution chain
        path: String,
    },

    /// The same logical node claims two different explicit scopes
    #[error("{key} is used with conflicting scopes ({first} and {second}); a dependency must have one scope across the whole plan")]
    ScopeConflict {
        /// Identity of the conflicted node
        key: Key,
        /// Scope from the first occurrence
        first: Scope,
        /// Scope from the second occurrence
        second: Scope,
    },

    /// An edge violates the declared outer-to-inner scope ordering
    #[error("{dependent} (scope {dependent_scope}) cannot depend on {dependency} (scope {dependency_scope}): a dependency's scope must be the same or outer")]
    ScopeViolation {
        /// The node that declared the dependency
        dependent: Key,
        /// Scope of the dependent node
        dependent_scope: Scope,
        /// The dependency it points at
        dependency: Key,
        /// Scope of the dependency
        dependency_scope: Scope,
    },

    /// A scope label is not part of the declared scope order
    #[error("scope {scope} required by {key} is not in the declared scope order {known:?}")]
    UnknownScope {
        /// The undeclared scope
        scope: Scope,
        /// The node that requested it
        key: Key,
        /// Scopes that were declared, outermost first
        known: Vec<Scope>,
    },

    /// A descriptor has no provider and no bind substitutes one
    #[error("no provider for {key} and no registered bind matches it")]
    Unresolved {
        /// Identity of the unresolvable node
        key: Key,
    },

    /// A node's resolved scope frame is not on the stack at execution time
    #[error("scope {scope} required by {key} is not active; enter it before executing")]
    ScopeNotActive {
        /// The scope that should have been entered
        scope: Scope,
        /// The node that needs it
        key: Key,
    },

    /// `enter` was called for a scope label that is already active
    #[error("scope {scope} has already been entered")]
    DuplicateScope {
        /// The already-active scope
        scope: Scope,
    },

    /// A provider invocation failed
    #[error("provider for {key} failed: {source}")]
    Provider {
        /// Identity of the failed node
        key: Key,
        /// The provider's own error
        #[source]
        source: BoxError,
    },

    /// One or more teardown actions failed during scope exit
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

/// Aggregate of failures raised while a scope frame tore down
///
/// All teardown actions run LIFO regardless of failures; the failures are
/// collected and reported together after all have been attempted.
#[derive(Error, Debug)]
#[error("{count} teardown action(s) failed while exiting scope {scope}", count = failures.len())]
pub struct TeardownError {
    /// The scope that was exiting
    pub scope: Scope,
    /// Every failure, in the order the actions ran (reverse registration order)
    pub failures: Vec<BoxError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_violation_names_both_nodes() {
        let err = Error::ScopeViolation {
            dependent: Key::named("handler"),
            dependent_scope: "app".into(),
            dependency: Key::named("session"),
            dependency_scope: "request".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("handler"));
        assert!(msg.contains("session"));
        assert!(msg.contains("app"));
        assert!(msg.contains("request"));
    }

    #[test]
    fn teardown_error_reports_failure_count() {
        let err = TeardownError {
            scope: "request".into(),
            failures: vec!["boom".into(), "crash".into()],
        };
        assert!(err.to_string().contains("2 teardown action(s)"));
        assert!(err.to_string().contains("request"));
    }
}
