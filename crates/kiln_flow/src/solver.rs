//! Monotone worklist fixed-point solver with integrated transformation
//! application.

use crate::analysis::{Analysis, FlowOutcome};
use crate::assumption::{join_all, Assumption};
use crate::transform::Transformation;
use kiln_cfg::{Cfg, CfgEdgeId, CfgNodeId};
use kiln_common::{ArenaId, KilnResult};
use kiln_syntax::SyntaxTree;
use std::collections::{BTreeMap, VecDeque};

/// Converged per-edge assumptions from one solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeAssumptions<V> {
    by_edge: Vec<V>,
}

impl<V: Assumption> EdgeAssumptions<V> {
    fn seeded<A>(cfg: &Cfg, analysis: &A) -> Self
    where
        A: Analysis<Value = V>,
    {
        // Boundary setup: entry edges get the entry value, exit edges get
        // the exit value, interior edges start at bottom.
        let mut by_edge = vec![V::bottom(); cfg.edge_count()];
        for &edge in cfg.graph_in_edges() {
            by_edge[edge.as_raw() as usize] = analysis.entry_value();
        }
        for &edge in cfg.graph_out_edges() {
            by_edge[edge.as_raw() as usize] = analysis.exit_value();
        }
        Self { by_edge }
    }

    /// The converged assumption on one edge.
    pub fn get(&self, edge: CfgEdgeId) -> &V {
        &self.by_edge[edge.as_raw() as usize]
    }

    fn set(&mut self, edge: CfgEdgeId, value: V) {
        self.by_edge[edge.as_raw() as usize] = value;
    }

    /// The join over a node's in-edge assumptions (bottom for a node with
    /// no in-edges).
    pub fn input_of(&self, cfg: &Cfg, node: CfgNodeId) -> V {
        join_all(cfg.node(node).in_edges.iter().map(|&e| self.get(e)))
    }
}

/// Counters from one `solve_and_transform` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Solver passes run (one initial pass plus one per mutation round).
    pub passes: usize,
    /// Transformations applied across all passes.
    pub transformations_applied: usize,
}

/// Runs the worklist to the least fixed point without mutating anything.
///
/// Returns the converged edge assumptions and the pending transformations,
/// keyed by node (at most one per node; a node's latest decision wins).
/// Worklist order is FIFO over node ids — any order converges for a
/// monotone flow function over a finite-height lattice; order affects
/// efficiency only.
pub fn solve<A: Analysis>(
    cfg: &Cfg,
    tree: &SyntaxTree,
    analysis: &A,
) -> (
    EdgeAssumptions<A::Value>,
    BTreeMap<CfgNodeId, Transformation>,
) {
    let mut assumptions = EdgeAssumptions::seeded(cfg, analysis);
    let mut pending: BTreeMap<CfgNodeId, Transformation> = BTreeMap::new();

    let mut worklist: VecDeque<CfgNodeId> = cfg.node_ids().collect();
    let mut queued = vec![true; cfg.node_count()];

    while let Some(node) = worklist.pop_front() {
        queued[node.as_raw() as usize] = false;

        let input = assumptions.input_of(cfg, node);
        match analysis.flow(cfg, tree, node, &input) {
            FlowOutcome::Assume(updates) => {
                // A node that now produces assumptions withdraws any
                // transformation it requested under an earlier, weaker input.
                pending.remove(&node);
                for (edge, value) in updates {
                    let joined = assumptions.get(edge).join(&value);
                    if joined != *assumptions.get(edge) {
                        assumptions.set(edge, joined);
                        if let Some(target) = cfg.edge(edge).target {
                            if !queued[target.as_raw() as usize] {
                                queued[target.as_raw() as usize] = true;
                                worklist.push_back(target);
                            }
                        }
                    }
                }
            }
            FlowOutcome::Transform(transformation) => {
                pending.insert(node, transformation);
            }
        }
    }

    (assumptions, pending)
}

/// Solves to a fixed point, applies every pending transformation exactly
/// once, and repeats on the mutated graph until a pass applies nothing.
///
/// Transformations are applied in an order consistent with graph structure:
/// shallower syntax first, and a transformation whose target region was
/// already replaced by an ancestor's transformation is skipped. A
/// transformation that fails to apply aborts with an internal error.
pub fn solve_and_transform<A: Analysis>(
    cfg: &mut Cfg,
    tree: &mut SyntaxTree,
    analysis: &A,
) -> KilnResult<SolveStats> {
    let mut stats = SolveStats::default();

    loop {
        stats.passes += 1;
        let (_, pending) = solve(cfg, tree, analysis);
        if pending.is_empty() {
            return Ok(stats);
        }

        // Parents before children: order by syntax depth, node id as the
        // deterministic tiebreak.
        let mut ordered: Vec<(CfgNodeId, Transformation)> = pending.into_iter().collect();
        ordered.sort_by_key(|(node, _)| {
            let depth = cfg
                .node(*node)
                .syntax
                .map(|syntax| tree.depth(syntax))
                .unwrap_or(0);
            (depth, node.as_raw())
        });

        let mut applied = 0;
        for (node, transformation) in ordered {
            let Some(syntax) = cfg.node(node).syntax else {
                continue; // already replaced in an earlier round
            };
            if !tree.is_attached(syntax) {
                continue; // region replaced by an ancestor's transformation
            }
            transformation.apply(cfg, tree)?;
            applied += 1;
        }

        stats.transformations_applied += applied;
        if applied == 0 {
            return Ok(stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unreachable::{Reach, UnreachableAnalysis};
    use kiln_cfg::build_cfg;
    use kiln_diagnostics::DiagnosticSink;
    use kiln_syntax::parse_unit;

    fn parse(source: &str) -> SyntaxTree {
        let sink = DiagnosticSink::new();
        parse_unit(source, &sink).expect("test source must parse")
    }

    #[test]
    fn converges_on_straight_line() {
        let tree = parse("unit main\nlet a = 1\nlet b = 2\nret\n");
        let cfg = build_cfg(&tree);
        let (assumptions, pending) = solve(&cfg, &tree, &UnreachableAnalysis);

        assert!(pending.is_empty());
        for edge in cfg.edge_ids() {
            assert_eq!(*assumptions.get(edge), Reach::Reachable);
        }
    }

    #[test]
    fn converges_with_loop_back_edge() {
        let tree = parse("unit main\nloop l {\nlet a = 1\nif x {\nbreak l\n}\n}\nret\n");
        let cfg = build_cfg(&tree);
        let (assumptions, pending) = solve(&cfg, &tree, &UnreachableAnalysis);

        assert!(pending.is_empty());
        for edge in cfg.edge_ids() {
            assert_eq!(*assumptions.get(edge), Reach::Reachable);
        }
    }

    #[test]
    fn solve_is_idempotent() {
        let tree = parse("unit main\nif x {\nret\n}\nret\n");
        let cfg = build_cfg(&tree);
        let (first, _) = solve(&cfg, &tree, &UnreachableAnalysis);
        let (second, _) = solve(&cfg, &tree, &UnreachableAnalysis);
        assert_eq!(first, second);
    }

    #[test]
    fn rerun_after_convergence_changes_nothing() {
        let mut tree = parse("unit main\nret\nlet dead = 1\n");
        let mut cfg = build_cfg(&tree);

        let stats = solve_and_transform(&mut cfg, &mut tree, &UnreachableAnalysis).unwrap();
        assert_eq!(stats.transformations_applied, 1);

        let again = solve_and_transform(&mut cfg, &mut tree, &UnreachableAnalysis).unwrap();
        assert_eq!(again.transformations_applied, 0);
    }

    #[test]
    fn nested_dead_region_applies_parent_only() {
        let mut tree = parse("unit main\nret\nif x {\nlet a = 1\nlet b = 2\n}\n");
        let mut cfg = build_cfg(&tree);

        let stats = solve_and_transform(&mut cfg, &mut tree, &UnreachableAnalysis).unwrap();
        // The `if` is deleted as one statement; its arm's statements are
        // skipped as already-detached, not double-deleted.
        assert_eq!(stats.transformations_applied, 1);
        assert_eq!(tree.node(tree.root()).children.len(), 1);
    }

    #[test]
    fn boundary_seeding() {
        let tree = parse("unit main\nret\n");
        let cfg = build_cfg(&tree);
        let (assumptions, _) = solve(&cfg, &tree, &UnreachableAnalysis);
        for &edge in cfg.graph_in_edges() {
            assert_eq!(*assumptions.get(edge), Reach::Reachable);
        }
    }
}
