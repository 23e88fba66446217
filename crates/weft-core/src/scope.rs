//! Scope labels and the declared scope order
//!
//! A [`Scope`] names a lifetime boundary. Scopes form an explicit
//! outer-to-inner ordering ([`ScopeOrder`]) declared by the caller at solve
//! time, e.g. `["app", "request"]`: values cached in an outer scope outlive
//! values cached in an inner one, and a node may only depend on nodes whose
//! scope is the same or outer than its own.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

/// A named lifetime boundary controlling cache retention and teardown timing.
///
/// Labels are an open set of cheap cloneable tokens; any `&'static str`
/// converts into one.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    /// Create a scope label.
    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        Scope(label.into())
    }

    /// The label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Scope {
    fn from(label: &'static str) -> Self {
        Scope::new(label)
    }
}

impl From<String> for Scope {
    fn from(label: String) -> Self {
        Scope::new(label)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.0)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a frame is shared engine-wide or owned by one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Visible to every concurrent execution on the same engine instance.
    Global,
    /// Visible only to the execution context that entered it and its
    /// descendants.
    Local,
}

/// The declared outer-to-inner ordering of scopes for one solve.
///
/// Index 0 is the outermost scope. Comparisons are by index: a scope is
/// "outer than" another when its index is smaller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeOrder {
    scopes: Vec<Scope>,
}

impl ScopeOrder {
    /// Build an order from outermost to innermost.
    pub fn new(scopes: impl IntoIterator<Item = impl Into<Scope>>) -> Self {
        ScopeOrder {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Position of `scope` in the declared order, outermost first.
    pub fn index_of(&self, scope: &Scope) -> Option<usize> {
        self.scopes.iter().position(|s| s == scope)
    }

    /// The outermost declared scope, if any scopes were declared.
    pub fn outermost(&self) -> Option<&Scope> {
        self.scopes.first()
    }

    /// True when `a` is the same scope as `b` or declared outer than it.
    ///
    /// Returns `None` when either scope is not part of the declared order.
    pub fn is_outer_or_equal(&self, a: &Scope, b: &Scope) -> Option<bool> {
        Some(self.index_of(a)? <= self.index_of(b)?)
    }

    /// All declared scopes, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// Number of declared scopes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// True when no scopes were declared.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl<S: Into<Scope>> FromIterator<S> for ScopeOrder {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ScopeOrder::new(iter)
    }
}
