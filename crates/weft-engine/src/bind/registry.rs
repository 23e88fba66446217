//! Bind registry
//!
//! An ordered list of substitution entries. Each entry pairs a [`Matcher`]
//! with a substitute descriptor; resolution applies the most recently
//! registered matching entry and re-resolves the substitute through the
//! chain, so one bind can indirect through another. A seen-set guards
//! against substitution cycles.
//!
//! The registry is read-mostly: solves take a one-shot [`BindSnapshot`] and
//! never touch the registry again, while bind/unbind writes are infrequent.
//! Every mutation bumps a monotonically increasing epoch; solved plans
//! record the epoch they were built against so stale plans can be detected.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;
use weft_core::{Dependent, Error, Result};

use super::matcher::Matcher;

/// Handle returned by registration, usable for manual removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindHandle(u64);

#[derive(Clone)]
struct BindEntry {
    id: u64,
    matcher: Matcher,
    substitute: Arc<Dependent>,
}

/// Ordered set of bind entries shared across an engine instance.
pub struct BindRegistry {
    // Newest entries at the tail; lookup iterates in reverse so the most
    // recently registered entry wins.
    entries: RwLock<Vec<BindEntry>>,
    next_id: AtomicU64,
    epoch: AtomicU64,
}

impl BindRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        BindRegistry {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
        }
    }

    /// Register a substitution at the head of the match order.
    pub fn bind(&self, matcher: Matcher, substitute: Arc<Dependent>) -> BindHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(bind = %substitute.key(), ?matcher, "registering bind");
        self.entries
            .write()
            .expect("bind registry poisoned")
            .push(BindEntry {
                id,
                matcher,
                substitute,
            });
        self.epoch.fetch_add(1, Ordering::Release);
        BindHandle(id)
    }

    /// Remove an entry. Idempotent: removing an already-removed entry is a
    /// no-op.
    pub fn unbind(&self, handle: BindHandle) {
        let mut entries = self.entries.write().expect("bind registry poisoned");
        let before = entries.len();
        entries.retain(|entry| entry.id != handle.0);
        if entries.len() != before {
            self.epoch.fetch_add(1, Ordering::Release);
        }
    }

    /// Current mutation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// One-shot snapshot for a solve.
    pub fn snapshot(&self) -> BindSnapshot {
        let entries = self.entries.read().expect("bind registry poisoned").clone();
        BindSnapshot {
            entries,
            epoch: self.epoch(),
        }
    }
}

impl Default for BindRegistry {
    fn default() -> Self {
        BindRegistry::new()
    }
}

/// Immutable view of the registry taken at the start of a solve.
pub struct BindSnapshot {
    entries: Vec<BindEntry>,
    epoch: u64,
}

impl BindSnapshot {
    /// Epoch of the registry when the snapshot was taken.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply bind substitution to a descriptor.
    ///
    /// The first matching entry's substitute replaces the descriptor, and the
    /// substitute is re-resolved in turn so one bind can indirect through
    /// another. Each entry applies at most once per chain, and a substitute
    /// that leads back to a descriptor already seen in the chain fails fast
    /// with [`Error::BindingCycle`].
    pub fn resolve(&self, dependent: &Arc<Dependent>) -> Result<Arc<Dependent>> {
        let mut current = Arc::clone(dependent);
        let mut seen: Vec<Arc<Dependent>> = vec![Arc::clone(&current)];
        let mut used: HashSet<u64> = HashSet::new();

        while let Some((id, substitute)) = self.first_match(&current, &used) {
            if seen.iter().any(|prior| Arc::ptr_eq(prior, &substitute)) {
                let path = seen
                    .iter()
                    .map(|d| d.key().display_name())
                    .chain(std::iter::once(substitute.key().display_name()))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(Error::BindingCycle {
                    key: dependent.key().clone(),
                    path,
                });
            }
            used.insert(id);
            seen.push(Arc::clone(&substitute));
            current = substitute;
        }
        Ok(current)
    }

    /// The newest matching entry, preferring exact matches over covariant
    /// and predicate matches when both apply.
    fn first_match(
        &self,
        dependent: &Dependent,
        used: &HashSet<u64>,
    ) -> Option<(u64, Arc<Dependent>)> {
        let mut fallback = None;
        for entry in self.entries.iter().rev() {
            if used.contains(&entry.id) || !entry.matcher.matches(dependent) {
                continue;
            }
            if entry.matcher.is_exact() {
                return Some((entry.id, Arc::clone(&entry.substitute)));
            }
            if fallback.is_none() {
                fallback = Some((entry.id, Arc::clone(&entry.substitute)));
            }
        }
        fallback
    }
}
