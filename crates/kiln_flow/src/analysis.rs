//! The analysis interface: flow functions plus boundary values.

use crate::assumption::Assumption;
use crate::transform::Transformation;
use kiln_cfg::{Cfg, CfgEdgeId, CfgNodeId};
use kiln_syntax::SyntaxTree;

/// What a flow function decided about one node.
#[derive(Debug)]
pub enum FlowOutcome<V> {
    /// New assumptions for (some of) the node's out-edges. Values are
    /// joined into the edges' current assumptions, keeping the solver
    /// monotone regardless of visit order.
    Assume(Vec<(CfgEdgeId, V)>),
    /// A deferred graph/tree mutation request for this node (integrated
    /// analysis). The most recent decision per node wins; it is applied
    /// only after the fixed point is reached.
    Transform(Transformation),
}

/// A dataflow analysis: a flow function with designated boundary values.
///
/// One implementation per concrete analysis; adding an analysis means adding
/// an implementation plus its flow function, not extending a hierarchy.
pub trait Analysis {
    /// The lattice this analysis computes over.
    type Value: Assumption;

    /// Human-readable analysis name, used in internal-error messages.
    fn name(&self) -> &'static str;

    /// Seed value for graph-in (entry) edges.
    fn entry_value(&self) -> Self::Value;

    /// Seed value for graph-out (exit) edges.
    fn exit_value(&self) -> Self::Value;

    /// The flow function: given a node and the join over its in-edge
    /// assumptions, produce out-edge assumptions or a transformation.
    fn flow(
        &self,
        cfg: &Cfg,
        tree: &SyntaxTree,
        node: CfgNodeId,
        input: &Self::Value,
    ) -> FlowOutcome<Self::Value>;
}
