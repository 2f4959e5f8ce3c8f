//! Structural CFG construction from a unit's syntax tree.
//!
//! Straight-line statements chain through interior edges; `ret` edges to the
//! graph exit with no fall-through; `if` forks and joins; `loop` forms a
//! back edge to its header with `break <label>` edges continuing past the
//! loop. A statement following a terminator receives no in-edges, so its
//! join over the (empty) in-edge set is the lattice bottom.

use crate::graph::{Cfg, CfgEdgeId, CfgNodeId};
use kiln_syntax::{SyntaxKind, SyntaxNodeId, SyntaxTree};

/// Per-label bookkeeping for a loop currently being built.
struct OpenLoop {
    label: String,
    break_edges: Vec<CfgEdgeId>,
}

struct Builder<'t> {
    tree: &'t SyntaxTree,
    cfg: Cfg,
    open_loops: Vec<OpenLoop>,
}

/// Builds the control-flow graph of a unit.
///
/// The entry context node wraps the unit root; the single graph-in edge
/// targets it. Every path that leaves the unit (falling off the end, `ret`,
/// or `break` to an unknown label) contributes one graph-out edge.
pub fn build_cfg(tree: &SyntaxTree) -> Cfg {
    let mut builder = Builder {
        tree,
        cfg: Cfg::new(),
        open_loops: Vec::new(),
    };

    let context = builder.cfg.add_node(tree.root(), None);
    builder.cfg.add_edge(None, Some(context));
    let first = builder.cfg.add_edge(Some(context), None);

    let survivors = builder.build_block(tree.root(), context, vec![first]);
    for edge in survivors {
        builder.cfg.mark_graph_out(edge);
    }
    builder.cfg
}

impl<'t> Builder<'t> {
    /// Builds the statements of `block`, threading `preds` (dangling edges
    /// awaiting a target) through them. Returns the dangling edges that
    /// survive to the end of the block.
    fn build_block(
        &mut self,
        block: SyntaxNodeId,
        parent: CfgNodeId,
        mut preds: Vec<CfgEdgeId>,
    ) -> Vec<CfgEdgeId> {
        let children: Vec<SyntaxNodeId> = self.tree.node(block).children.clone();
        for stmt in children {
            preds = self.build_statement(stmt, parent, preds);
        }
        preds
    }

    fn build_statement(
        &mut self,
        stmt: SyntaxNodeId,
        parent: CfgNodeId,
        preds: Vec<CfgEdgeId>,
    ) -> Vec<CfgEdgeId> {
        match self.tree.node(stmt).kind.clone() {
            SyntaxKind::Unit | SyntaxKind::Block => {
                // Wrappers never appear as block children in a parsed tree.
                preds
            }
            SyntaxKind::Let { .. } => {
                let node = self.sequential_node(stmt, parent, preds);
                vec![self.cfg.add_edge(Some(node), None)]
            }
            SyntaxKind::Ret => {
                let node = self.sequential_node(stmt, parent, preds);
                let exit = self.cfg.add_edge(Some(node), None);
                self.cfg.mark_graph_out(exit);
                Vec::new()
            }
            SyntaxKind::Break { label } => {
                let node = self.sequential_node(stmt, parent, preds);
                let edge = self.cfg.add_edge(Some(node), None);
                match self
                    .open_loops
                    .iter_mut()
                    .rev()
                    .find(|open| open.label == label)
                {
                    Some(open) => open.break_edges.push(edge),
                    // A break past every open loop leaves the unit.
                    None => self.cfg.mark_graph_out(edge),
                }
                Vec::new()
            }
            SyntaxKind::If { .. } => {
                let node = self.sequential_node(stmt, parent, preds);
                let then_edge = self.cfg.add_edge(Some(node), None);
                let else_edge = self.cfg.add_edge(Some(node), None);

                let arms: Vec<SyntaxNodeId> = self.tree.node(stmt).children.clone();
                let mut survivors = match arms.first() {
                    Some(&then_block) => self.build_block(then_block, node, vec![then_edge]),
                    None => vec![then_edge],
                };
                let else_survivors = match arms.get(1) {
                    Some(&else_block) => self.build_block(else_block, node, vec![else_edge]),
                    None => vec![else_edge],
                };
                survivors.extend(else_survivors);
                survivors
            }
            SyntaxKind::Loop { label } => {
                let header = self.sequential_node(stmt, parent, preds);
                let body_edge = self.cfg.add_edge(Some(header), None);

                self.open_loops.push(OpenLoop {
                    label,
                    break_edges: Vec::new(),
                });
                let body = self.tree.node(stmt).children.first().copied();
                let back_edges = match body {
                    Some(body) => self.build_block(body, header, vec![body_edge]),
                    None => vec![body_edge],
                };
                for edge in back_edges {
                    self.cfg.set_edge_target(edge, header);
                }
                let open = self.open_loops.pop().unwrap();
                open.break_edges
            }
        }
    }

    /// Adds the node for `stmt` and routes all pending predecessor edges
    /// into it.
    fn sequential_node(
        &mut self,
        stmt: SyntaxNodeId,
        parent: CfgNodeId,
        preds: Vec<CfgEdgeId>,
    ) -> CfgNodeId {
        let node = self.cfg.add_node(stmt, Some(parent));
        for edge in preds {
            self.cfg.set_edge_target(edge, node);
        }
        node
    }
}
