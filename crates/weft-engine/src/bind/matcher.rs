//! Bind matchers
//!
//! A [`Matcher`] decides whether a bind entry applies to a descriptor.
//! Matching is a pure function of the entry's target and the descriptor;
//! exact and covariant key matches cover the common cases, and predicate
//! matching is the escape hatch for anything else.

use std::fmt;
use std::sync::Arc;

use weft_core::{Dependent, Key};

/// How a bind entry recognizes the descriptors it substitutes.
#[derive(Clone)]
pub enum Matcher {
    /// Matches a descriptor whose identity key equals the target.
    Exact(Key),
    /// Matches a descriptor whose identity key equals the target or whose
    /// declared `implements` set contains it.
    Covariant(Key),
    /// Custom predicate over the descriptor.
    Predicate(Arc<dyn Fn(&Dependent) -> bool + Send + Sync>),
}

impl Matcher {
    /// Exact-key matcher.
    pub fn exact(key: impl Into<Key>) -> Self {
        Matcher::Exact(key.into())
    }

    /// Covariant matcher: also accepts descriptors declaring the target as
    /// an implemented interface.
    pub fn covariant(key: impl Into<Key>) -> Self {
        Matcher::Covariant(key.into())
    }

    /// Predicate matcher.
    pub fn predicate(f: impl Fn(&Dependent) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Predicate(Arc::new(f))
    }

    /// Whether this matcher applies to `dependent`.
    pub fn matches(&self, dependent: &Dependent) -> bool {
        match self {
            Matcher::Exact(target) => dependent.key() == target,
            Matcher::Covariant(target) => {
                dependent.key() == target || dependent.implements().contains(target)
            }
            Matcher::Predicate(f) => f(dependent),
        }
    }

    /// True for [`Matcher::Exact`]; exact matches win over covariant and
    /// predicate matches when several entries apply.
    pub fn is_exact(&self) -> bool {
        matches!(self, Matcher::Exact(_))
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(key) => write!(f, "Matcher::Exact({key})"),
            Matcher::Covariant(key) => write!(f, "Matcher::Covariant({key})"),
            Matcher::Predicate(_) => f.write_str("Matcher::Predicate(..)"),
        }
    }
}
