//! Graph validation: run this before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every node type must belong to the closed [`NodeType`] set.
//! 3. Every edge must reference valid node IDs (both `from` and `to`).
//! 4. The directed graph must be acyclic (depth-first search, back-edge check).
//! 5. At least one node must have no incoming edges.
//!
//! The resulting [`ValidatedGraph`] is immutable and shared read-only by every
//! run of the definition.

use std::collections::{HashMap, HashSet};

use nodes::NodeType;
use uuid::Uuid;

use crate::{
    models::{Edge, NodeDefinition, Trigger, WorkflowDefinition},
    EngineError, ValidationError,
};

/// A node together with its resolved type.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub definition: NodeDefinition,
    pub node_type: NodeType,
}

/// A validated, index-addressed view of a workflow definition.
///
/// Nodes and edges keep declaration order; node indexes and edge indexes are
/// positions in [`nodes`](Self::nodes) and [`edges`](Self::edges).
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    workflow_id: Uuid,
    name: String,
    trigger: Trigger,
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
    /// Edge indexes leaving each node, in declaration order.
    outgoing: Vec<Vec<usize>>,
    /// Edge indexes entering each node, in declaration order.
    incoming: Vec<Vec<usize>>,
    /// `(from, to)` node indexes per edge.
    endpoints: Vec<(usize, usize)>,
    entries: Vec<usize>,
}

impl ValidatedGraph {
    /// Validate `definition` and build its graph.
    ///
    /// # Errors
    /// - [`ValidationError::DuplicateNodeId`] if two nodes share an ID.
    /// - [`EngineError::UnknownNodeType`] if a node type is outside the closed set.
    /// - [`ValidationError::UnknownNodeReference`] if an edge references a missing node.
    /// - [`ValidationError::CycleDetected`] if the graph is not acyclic.
    /// - [`ValidationError::NoEntryNodes`] if no node is free of incoming edges.
    pub fn load(definition: WorkflowDefinition) -> Result<Self, EngineError> {
        // -----------------------------------------------------------------------
        // 1. Unique ids, known types
        // -----------------------------------------------------------------------
        let mut index: HashMap<String, usize> = HashMap::with_capacity(definition.nodes.len());
        let mut nodes = Vec::with_capacity(definition.nodes.len());

        for (i, node) in definition.nodes.into_iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(ValidationError::DuplicateNodeId(node.id).into());
            }
            let node_type =
                node.node_type.parse::<NodeType>().map_err(|_| EngineError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                })?;
            nodes.push(GraphNode { definition: node, node_type });
        }

        // -----------------------------------------------------------------------
        // 2. Edge endpoints and adjacency
        // -----------------------------------------------------------------------
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut endpoints = Vec::with_capacity(definition.edges.len());

        for (e, edge) in definition.edges.iter().enumerate() {
            let from = *index.get(&edge.from).ok_or_else(|| ValidationError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            })?;
            let to = *index.get(&edge.to).ok_or_else(|| ValidationError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            })?;
            outgoing[from].push(e);
            incoming[to].push(e);
            endpoints.push((from, to));
        }

        let graph = Self {
            workflow_id: definition.id,
            name: definition.name,
            trigger: definition.trigger,
            entries: (0..nodes.len()).filter(|&n| incoming[n].is_empty()).collect(),
            nodes,
            edges: definition.edges,
            index,
            outgoing,
            incoming,
            endpoints,
        };

        // -----------------------------------------------------------------------
        // 3. Acyclicity, 4. entry set
        // -----------------------------------------------------------------------
        graph.check_acyclic()?;
        if graph.entries.is_empty() {
            return Err(ValidationError::NoEntryNodes.into());
        }

        Ok(graph)
    }

    /// Depth-first search from every unvisited node, tracking the nodes that
    /// are currently on the traversal stack. An edge into one of those is a
    /// back-edge, i.e. a cycle.
    fn check_acyclic(&self) -> Result<(), ValidationError> {
        let mut done = vec![false; self.nodes.len()];
        let mut on_stack = vec![false; self.nodes.len()];

        for root in 0..self.nodes.len() {
            if done[root] {
                continue;
            }
            // (node, next outgoing edge position to explore)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            on_stack[root] = true;

            while let Some((node, pos)) = stack.last_mut() {
                let node = *node;
                match self.outgoing[node].get(*pos) {
                    Some(&edge) => {
                        *pos += 1;
                        let (_, next) = self.endpoints[edge];
                        if on_stack[next] {
                            let id = self.nodes[next].definition.id.clone();
                            return Err(ValidationError::CycleDetected(id));
                        }
                        if !done[next] {
                            on_stack[next] = true;
                            stack.push((next, 0));
                        }
                    }
                    None => {
                        on_stack[node] = false;
                        done[node] = true;
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Ids of the nodes with no incoming edges.
    pub fn entry_nodes(&self) -> HashSet<&str> {
        self.entries.iter().map(|&n| self.node_id(n)).collect()
    }

    /// Edges leaving `node_id`, in declaration order. Empty for unknown ids.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.index
            .get(node_id)
            .map(|&n| self.outgoing[n].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.index.get(node_id).map(|&n| &self.nodes[n].definition)
    }

    /// Node ids in an order where every edge points forward, ties broken by
    /// declaration order.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut placed = vec![false; self.nodes.len()];

        while order.len() < self.nodes.len() {
            let Some(next) = (0..self.nodes.len()).find(|&n| !placed[n] && in_degree[n] == 0) else {
                break;
            };
            placed[next] = true;
            order.push(self.node_id(next));
            for &e in &self.outgoing[next] {
                in_degree[self.endpoints[e].1] -= 1;
            }
        }

        order
    }

    // -----------------------------------------------------------------------
    // Index-based accessors used by the run state machine.
    // -----------------------------------------------------------------------

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn graph_node(&self, n: usize) -> &GraphNode {
        &self.nodes[n]
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    pub(crate) fn node_id(&self, n: usize) -> &str {
        &self.nodes[n].definition.id
    }

    pub(crate) fn index_of(&self, node_id: &str) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    pub(crate) fn edge(&self, e: usize) -> &Edge {
        &self.edges[e]
    }

    pub(crate) fn outgoing_of(&self, n: usize) -> &[usize] {
        &self.outgoing[n]
    }

    pub(crate) fn incoming_of(&self, n: usize) -> &[usize] {
        &self.incoming[n]
    }

    pub(crate) fn target_of(&self, e: usize) -> usize {
        self.endpoints[e].1
    }

    pub(crate) fn is_entry(&self, n: usize) -> bool {
        self.incoming[n].is_empty()
    }
}
