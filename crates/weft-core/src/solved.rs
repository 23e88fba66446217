//! Solved plans
//!
//! A [`SolvedPlan`] is the precomputed result of solving one root
//! descriptor: the deduplicated DAG of resolved descriptors, a validated
//! scope assignment per node, and a topological partition into levels of
//! mutually-independent nodes. Plans are immutable and reusable across many
//! executions as long as the bind registry they were solved against is
//! unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::dependent::Dependent;
use crate::key::Key;
use crate::scope::{Scope, ScopeOrder};

/// Index of a node inside one [`SolvedPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Wrap a raw index. Only meaningful for the plan it was issued by.
    pub fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// The raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One resolved node of a plan.
#[derive(Debug)]
pub struct SolvedNode {
    /// The (post-substitution) descriptor
    pub dependent: Arc<Dependent>,
    /// Resolved, non-null scope label
    pub scope: Scope,
    /// Sub-dependency nodes whose values are passed to the provider,
    /// in declaration order
    pub dependencies: Vec<NodeId>,
    /// Joined nodes: executed before this node, values not passed
    pub joined: Vec<NodeId>,
}

impl SolvedNode {
    /// All edges out of this node: passed dependencies plus joined nodes.
    pub fn edges(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies.iter().chain(self.joined.iter()).copied()
    }
}

/// The precomputed DAG, scope assignment and topological levels for a root
/// descriptor.
#[derive(Debug)]
pub struct SolvedPlan {
    nodes: Vec<SolvedNode>,
    index: HashMap<Key, NodeId>,
    root: NodeId,
    levels: Vec<Vec<NodeId>>,
    scopes: ScopeOrder,
    bind_epoch: u64,
}

impl SolvedPlan {
    /// Assemble a plan. Called by the solver; `levels` must be a valid
    /// topological partition of the nodes' edges.
    pub fn new(
        nodes: Vec<SolvedNode>,
        root: NodeId,
        levels: Vec<Vec<NodeId>>,
        scopes: ScopeOrder,
        bind_epoch: u64,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.dependent.key().clone(), NodeId(i)))
            .collect();
        SolvedPlan {
            nodes,
            index,
            root,
            levels,
            scopes,
            bind_epoch,
        }
    }

    /// The node the plan was solved for.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> &SolvedNode {
        &self.nodes[id.0]
    }

    /// Look up a node by identity key.
    pub fn node_by_key(&self, key: &Key) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> &[SolvedNode] {
        &self.nodes
    }

    /// Resolved scope of a node.
    pub fn scope_of(&self, id: NodeId) -> &Scope {
        &self.nodes[id.0].scope
    }

    /// The topological partition: every node's dependencies lie in a
    /// strictly earlier level; nodes within a level are mutually
    /// independent.
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    /// The declared scope order the plan was validated against.
    pub fn scope_order(&self) -> &ScopeOrder {
        &self.scopes
    }

    /// Bind registry epoch the plan was solved against.
    pub fn bind_epoch(&self) -> u64 {
        self.bind_epoch
    }

    /// Every descriptor in the plan, root included, in no particular order.
    ///
    /// This is the flatten/introspection entry point: callers use it to
    /// enumerate which descriptors (e.g. custom `implements` markers) a plan
    /// contains.
    pub fn flat(&self) -> impl Iterator<Item = &Arc<Dependent>> {
        self.nodes.iter().map(|node| &node.dependent)
    }

    /// A serializable snapshot of the plan for diagnostics.
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeSummary {
                    key: node.dependent.key().display_name().to_string(),
                    scope: node.scope.clone(),
                    cache_participant: node.dependent.cache_participant(),
                    dependencies: node
                        .dependencies
                        .iter()
                        .map(|id| self.nodes[id.0].dependent.key().display_name().to_string())
                        .collect(),
                })
                .collect(),
            levels: self
                .levels
                .iter()
                .map(|level| {
                    level
                        .iter()
                        .map(|id| self.nodes[id.0].dependent.key().display_name().to_string())
                        .collect()
                })
                .collect(),
        }
    }
}

/// Serializable plan snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    /// Every node with its resolved scope and dependencies
    pub nodes: Vec<NodeSummary>,
    /// Node keys per topological level
    pub levels: Vec<Vec<String>>,
}

/// Serializable node snapshot
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    /// Display name of the node's identity key
    pub key: String,
    /// Resolved scope label
    pub scope: Scope,
    /// Whether the node shares values through the scope cache
    pub cache_participant: bool,
    /// Display names of the nodes whose values are passed to the provider
    pub dependencies: Vec<String>,
}
