//! Solver
//!
//! Turns a root descriptor plus the bind registry into a [`SolvedPlan`]:
//!
//! 1. Depth-first walk from the root, applying bind substitution at every
//!    descriptor before expanding it.
//! 2. Deduplication by identity key, with scope-conflict detection when the
//!    same logical node claims two different explicit scopes.
//! 3. Cycle detection on the DFS stack.
//! 4. Scope inference for unannotated nodes: the outermost declared scope
//!    compatible with the node's sub-dependencies (leaves get the outermost
//!    scope outright, for maximal cacheability).
//! 5. Scope validation for every edge: a dependency's scope must be the
//!    same or outer than its dependent's.
//! 6. Kahn-style layering into levels of mutually-independent nodes.
//!
//! Solving is single-threaded and pure: it reads one bind snapshot up front
//! and touches no other shared state, so a plan can be solved once and
//! executed many times.

mod levels;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use weft_core::{
    Dependent, Error, Key, NodeId, Result, Scope, ScopeOrder, SolvedNode, SolvedPlan,
};

use crate::bind::{BindRegistry, BindSnapshot};
use self::levels::compute_levels;

/// Solve `root` against the declared outer-to-inner scope order and the
/// current bind registry.
pub fn solve(
    root: &Arc<Dependent>,
    scopes: ScopeOrder,
    registry: &BindRegistry,
) -> Result<SolvedPlan> {
    if scopes.is_empty() {
        return Err(Error::UnknownScope {
            scope: Scope::new("<inferred>"),
            key: root.key().clone(),
            known: Vec::new(),
        });
    }

    let snapshot = registry.snapshot();
    let mut walker = Walker {
        snapshot,
        nodes: Vec::new(),
        index: HashMap::new(),
        visiting: Vec::new(),
        path: Vec::new(),
    };
    let root_id = walker.visit(root)?;
    let Walker {
        snapshot, nodes, ..
    } = walker;

    let assigned = assign_scopes(&nodes, &scopes)?;
    validate_edges(&nodes, &assigned, &scopes)?;

    let edges: Vec<Vec<usize>> = nodes
        .iter()
        .map(|node| node.deps.iter().chain(node.joined.iter()).copied().collect())
        .collect();
    let levels = compute_levels(&edges);

    debug!(
        nodes = nodes.len(),
        levels = levels.len(),
        root = %root.key(),
        "solved dependency plan"
    );

    let solved_nodes = nodes
        .into_iter()
        .zip(assigned)
        .map(|(node, scope)| SolvedNode {
            dependent: node.dependent,
            scope,
            dependencies: node.deps.into_iter().map(NodeId::new).collect(),
            joined: node.joined.into_iter().map(NodeId::new).collect(),
        })
        .collect();

    Ok(SolvedPlan::new(
        solved_nodes,
        NodeId::new(root_id),
        levels
            .into_iter()
            .map(|level| level.into_iter().map(NodeId::new).collect())
            .collect(),
        scopes,
        snapshot.epoch(),
    ))
}

struct PartialNode {
    dependent: Arc<Dependent>,
    explicit: Option<Scope>,
    deps: Vec<usize>,
    joined: Vec<usize>,
}

struct Walker {
    snapshot: BindSnapshot,
    nodes: Vec<PartialNode>,
    index: HashMap<Key, usize>,
    visiting: Vec<bool>,
    path: Vec<Key>,
}

impl Walker {
    fn visit(&mut self, dependent: &Arc<Dependent>) -> Result<usize> {
        let resolved = self.snapshot.resolve(dependent)?;
        if resolved.provider().is_none() {
            return Err(Error::Unresolved {
                key: resolved.key().clone(),
            });
        }

        // A substitute that declares no sub-dependencies of its own inherits
        // the declared sub-dependencies of the descriptor it replaced.
        let substituted = !Arc::ptr_eq(&resolved, dependent);
        let expansion: &Arc<Dependent> = if substituted
            && resolved.sub_dependencies().is_empty()
            && resolved.joined().is_empty()
        {
            dependent
        } else {
            &resolved
        };

        let key = resolved.key().clone();
        if let Some(&id) = self.index.get(&key) {
            if self.visiting[id] {
                return Err(Error::DependencyCycle {
                    path: self.render_path(&key),
                });
            }
            self.merge_explicit_scope(id, &resolved)?;
            return Ok(id);
        }

        let id = self.nodes.len();
        self.index.insert(key.clone(), id);
        self.nodes.push(PartialNode {
            dependent: Arc::clone(&resolved),
            explicit: resolved.scope().cloned(),
            deps: Vec::new(),
            joined: Vec::new(),
        });
        self.visiting.push(true);
        self.path.push(key);

        let mut deps = Vec::with_capacity(expansion.sub_dependencies().len());
        for child in expansion.sub_dependencies() {
            deps.push(self.visit(child)?);
        }
        let mut joined = Vec::with_capacity(expansion.joined().len());
        for child in expansion.joined() {
            joined.push(self.visit(child)?);
        }
        self.nodes[id].deps = deps;
        self.nodes[id].joined = joined;

        self.visiting[id] = false;
        self.path.pop();
        Ok(id)
    }

    /// A node reached twice keeps its first descriptor, but an explicit
    /// scope from any occurrence must win over "infer", and two differing
    /// explicit scopes are a conflict.
    fn merge_explicit_scope(&mut self, id: usize, resolved: &Dependent) -> Result<()> {
        let Some(scope) = resolved.scope() else {
            return Ok(());
        };
        match &self.nodes[id].explicit {
            Some(existing) if existing != scope => Err(Error::ScopeConflict {
                key: resolved.key().clone(),
                first: existing.clone(),
                second: scope.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.nodes[id].explicit = Some(scope.clone());
                Ok(())
            }
        }
    }

    fn render_path(&self, repeat: &Key) -> String {
        self.path
            .iter()
            .skip_while(|key| *key != repeat)
            .map(Key::display_name)
            .chain(std::iter::once(repeat.display_name()))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Resolve every node to a concrete scope: explicit labels win, everything
/// else gets the outermost declared scope compatible with its direct
/// sub-dependencies.
fn assign_scopes(nodes: &[PartialNode], scopes: &ScopeOrder) -> Result<Vec<Scope>> {
    for node in nodes {
        if let Some(scope) = &node.explicit {
            if scopes.index_of(scope).is_none() {
                return Err(Error::UnknownScope {
                    scope: scope.clone(),
                    key: node.dependent.key().clone(),
                    known: scopes.iter().cloned().collect(),
                });
            }
        }
    }

    let mut assigned: Vec<Option<Scope>> = vec![None; nodes.len()];
    for id in 0..nodes.len() {
        infer(nodes, scopes, &mut assigned, id);
    }
    Ok(assigned.into_iter().map(|scope| scope.expect("every node assigned")).collect())
}

fn infer(nodes: &[PartialNode], scopes: &ScopeOrder, assigned: &mut [Option<Scope>], id: usize) -> Scope {
    if let Some(scope) = &assigned[id] {
        return scope.clone();
    }
    let node = &nodes[id];
    let scope = if let Some(explicit) = &node.explicit {
        explicit.clone()
    } else {
        // Lower bound: the innermost scope among direct sub-dependencies.
        // A leaf takes the outermost declared scope.
        let mut innermost: Option<Scope> = None;
        for &child in node.deps.iter().chain(node.joined.iter()) {
            let child_scope = infer(nodes, scopes, assigned, child);
            let replace = match &innermost {
                None => true,
                Some(current) => {
                    scopes.index_of(&child_scope) > scopes.index_of(current)
                }
            };
            if replace {
                innermost = Some(child_scope);
            }
        }
        innermost.unwrap_or_else(|| scopes.outermost().expect("non-empty scope order").clone())
    };
    assigned[id] = Some(scope.clone());
    scope
}

/// Every edge must point at a scope that is the same or outer than the
/// dependent's own. Inferred scopes satisfy this by construction, so only
/// edges involving explicit labels can trip it.
fn validate_edges(nodes: &[PartialNode], assigned: &[Scope], scopes: &ScopeOrder) -> Result<()> {
    for (id, node) in nodes.iter().enumerate() {
        for &child in node.deps.iter().chain(node.joined.iter()) {
            let dependent_scope = &assigned[id];
            let dependency_scope = &assigned[child];
            if scopes.is_outer_or_equal(dependency_scope, dependent_scope) != Some(true) {
                return Err(Error::ScopeViolation {
                    dependent: node.dependent.key().clone(),
                    dependent_scope: dependent_scope.clone(),
                    dependency: nodes[child].dependent.key().clone(),
                    dependency_scope: dependency_scope.clone(),
                });
            }
        }
    }
    Ok(())
}
