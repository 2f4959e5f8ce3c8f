//! Arena-backed control-flow graph.

use kiln_common::{arena_id, Arena};
use kiln_syntax::SyntaxNodeId;
use serde::{Deserialize, Serialize};

arena_id! {
    /// Opaque handle to one CFG node.
    pub struct CfgNodeId
}

arena_id! {
    /// Opaque handle to one CFG edge.
    pub struct CfgEdgeId
}

/// One node of the control-flow graph.
///
/// A node wraps exactly one syntax node, or is a synthetic no-op placeholder
/// (`syntax == None`) left behind when a deletion transformation replaced it.
/// Invariant: every non-synthetic node except the entry context node has a
/// non-null structural parent while it is live in a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    /// The syntax fragment this node wraps; `None` marks a synthetic no-op.
    pub syntax: Option<SyntaxNodeId>,
    /// The node of the enclosing statement, `None` only for the entry
    /// context node.
    pub parent: Option<CfgNodeId>,
    /// Incoming edges, in insertion order.
    pub in_edges: Vec<CfgEdgeId>,
    /// Outgoing edges, in insertion order.
    pub out_edges: Vec<CfgEdgeId>,
}

impl CfgNode {
    /// Returns `true` if this node is a synthetic no-op placeholder.
    pub fn is_noop(&self) -> bool {
        self.syntax.is_none()
    }
}

/// A directed edge between two CFG nodes.
///
/// `source == None` marks a graph-in (entry) edge; `target == None` marks a
/// graph-out (exit) edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CfgEdge {
    /// Source node, absent for graph-in edges.
    pub source: Option<CfgNodeId>,
    /// Target node, absent for graph-out edges.
    pub target: Option<CfgNodeId>,
}

/// The control-flow graph of one compiled unit.
///
/// Exclusively owned by the single compile invocation processing it; never
/// shared across jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cfg {
    nodes: Arena<CfgNodeId, CfgNode>,
    edges: Arena<CfgEdgeId, CfgEdge>,
    graph_in: Vec<CfgEdgeId>,
    graph_out: Vec<CfgEdgeId>,
}

impl Cfg {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node wrapping the given syntax fragment.
    pub fn add_node(&mut self, syntax: SyntaxNodeId, parent: Option<CfgNodeId>) -> CfgNodeId {
        self.nodes.alloc(CfgNode {
            syntax: Some(syntax),
            parent,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        })
    }

    /// Adds an edge. Endpoint edge lists and the graph-in set are maintained
    /// here; graph-out membership is claimed explicitly via
    /// [`mark_graph_out`](Self::mark_graph_out) because an edge's target may
    /// legitimately be patched in later during construction.
    pub fn add_edge(&mut self, source: Option<CfgNodeId>, target: Option<CfgNodeId>) -> CfgEdgeId {
        let id = self.edges.alloc(CfgEdge { source, target });
        if let Some(source) = source {
            self.nodes.get_mut(source).out_edges.push(id);
        } else {
            self.graph_in.push(id);
        }
        if let Some(target) = target {
            self.nodes.get_mut(target).in_edges.push(id);
        }
        id
    }

    /// Sets the target of a dangling edge and links the target's in-edge list.
    ///
    /// # Panics
    ///
    /// Panics if the edge already has a target.
    pub fn set_edge_target(&mut self, edge: CfgEdgeId, target: CfgNodeId) {
        let slot = &mut self.edges.get_mut(edge).target;
        assert!(slot.is_none(), "edge target set twice");
        *slot = Some(target);
        self.nodes.get_mut(target).in_edges.push(edge);
    }

    /// Declares a (still targetless) edge to be a graph-out edge.
    pub fn mark_graph_out(&mut self, edge: CfgEdgeId) {
        self.graph_out.push(edge);
    }

    /// Returns the node with the given ID.
    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        self.nodes.get(id)
    }

    /// Returns the edge with the given ID.
    pub fn edge(&self, id: CfgEdgeId) -> &CfgEdge {
        self.edges.get(id)
    }

    /// Replaces a node with a synthetic no-op placeholder, preserving its
    /// parent reference and all edges (edge cardinality is unchanged).
    pub fn replace_with_noop(&mut self, id: CfgNodeId) {
        self.nodes.get_mut(id).syntax = None;
    }

    /// The graph-in (entry) edge set.
    pub fn graph_in_edges(&self) -> &[CfgEdgeId] {
        &self.graph_in
    }

    /// The graph-out (exit) edge set.
    pub fn graph_out_edges(&self) -> &[CfgEdgeId] {
        &self.graph_out
    }

    /// Iterates over all node IDs in allocation order.
    pub fn node_ids(&self) -> impl Iterator<Item = CfgNodeId> {
        self.nodes.ids()
    }

    /// Iterates over all edge IDs in allocation order.
    pub fn edge_ids(&self) -> impl Iterator<Item = CfgEdgeId> {
        self.edges.ids()
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
