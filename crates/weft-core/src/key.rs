//! Node identity keys
//!
//! A [`Key`] identifies one requested value in a dependency graph. Equivalent
//! descriptors are deduplicated by key at solve time, and scope caches are
//! addressed by key at execution time.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

/// Identity of a provider or requested value.
///
/// The default identity of a descriptor is the Rust type it produces
/// ([`Key::of`]). Callers that need a different deduplication axis, e.g.
/// keying by parameter name so that two `String` values stay distinct, use
/// [`Key::named`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Identity by produced type.
    Type {
        /// `TypeId` of the produced value
        id: TypeId,
        /// Type name, retained for diagnostics only
        name: &'static str,
    },
    /// Identity by explicit label.
    Named(Cow<'static, str>),
}

impl Key {
    /// Key a descriptor by the type its provider produces.
    pub fn of<T: 'static>() -> Self {
        Key::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key a descriptor by an explicit label.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Key::Named(name.into())
    }

    /// Human-readable name for error messages and summaries.
    pub fn display_name(&self) -> &str {
        match self {
            Key::Type { name, .. } => name,
            Key::Named(name) => name,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type { name, .. } => write!(f, "Key::Type({name})"),
            Key::Named(name) => write!(f, "Key::Named({name})"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<&'static str> for Key {
    fn from(name: &'static str) -> Self {
        Key::named(name)
    }
}
