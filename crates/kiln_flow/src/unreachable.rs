//! Unreachable-code elimination as an integrated analysis.

use crate::analysis::{Analysis, FlowOutcome};
use crate::assumption::Assumption;
use crate::transform::Transformation;
use kiln_cfg::{Cfg, CfgNodeId};
use kiln_syntax::SyntaxTree;

/// Reachability lattice: `Unreachable` is bottom, `Reachable` is the
/// absorbing top. Any path into a node makes it reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// No execution path reaches this edge (the initial assumption).
    Unreachable,
    /// At least one execution path reaches this edge.
    Reachable,
}

impl Assumption for Reach {
    fn bottom() -> Self {
        Reach::Unreachable
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Reach::Unreachable, Reach::Unreachable) => Reach::Unreachable,
            _ => Reach::Reachable,
        }
    }
}

/// Deletes statements no execution path can reach.
///
/// Entry edges are seeded reachable. A statement node whose in-edge join is
/// still `Unreachable` at the fixed point requests its own deletion;
/// synthetic no-ops and structural nodes only forward their input.
pub struct UnreachableAnalysis;

impl Analysis for UnreachableAnalysis {
    type Value = Reach;

    fn name(&self) -> &'static str {
        "unreachable-code"
    }

    fn entry_value(&self) -> Reach {
        Reach::Reachable
    }

    fn exit_value(&self) -> Reach {
        Reach::Unreachable
    }

    fn flow(
        &self,
        cfg: &Cfg,
        tree: &SyntaxTree,
        node: CfgNodeId,
        input: &Reach,
    ) -> FlowOutcome<Reach> {
        let forward = |value: Reach| {
            FlowOutcome::Assume(
                cfg.node(node)
                    .out_edges
                    .iter()
                    .map(|&edge| (edge, value))
                    .collect(),
            )
        };

        let Some(syntax) = cfg.node(node).syntax else {
            // Synthetic no-op left behind by an earlier deletion.
            return forward(*input);
        };
        if !tree.node(syntax).kind.is_statement() {
            // Structural node (unit context, block): forwards, never deleted.
            return forward(*input);
        }
        match input {
            Reach::Unreachable => FlowOutcome::Transform(Transformation::DeleteNode { node }),
            Reach::Reachable => forward(Reach::Reachable),
        }
    }
}
