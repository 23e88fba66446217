//! Scope state: frames, the nested stack and scoped-acquisition guards

mod frame;
mod stack;

pub use frame::ScopeFrame;
pub use stack::{ScopeGuard, ScopeStack};

pub(crate) use stack::GlobalScopes;
