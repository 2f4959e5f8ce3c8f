//! Deferred graph/tree mutations proposed by integrated analyses.

use kiln_cfg::{Cfg, CfgNodeId};
use kiln_common::{InternalError, KilnResult};
use kiln_syntax::{delete_statement, SyntaxTree};

/// A named, deferred CFG/syntax-tree mutation.
///
/// Each variant carries a tree-side transformer and a graph-side
/// replacement. Application is all-or-nothing: either the tree and graph
/// are both updated, or the attempt is aborted with an internal error —
/// a partially applied transformation is never an accepted end state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformation {
    /// Delete the statement a node wraps. The graph-side replacement is a
    /// synthetic no-op node that keeps the parent reference and all edges,
    /// preserving edge cardinality.
    DeleteNode {
        /// The CFG node whose statement is deleted.
        node: CfgNodeId,
    },
}

impl Transformation {
    /// A short description for internal-error diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Transformation::DeleteNode { node } => format!("delete node {node:?}"),
        }
    }

    /// The CFG node this transformation targets.
    pub fn target(&self) -> CfgNodeId {
        match self {
            Transformation::DeleteNode { node } => *node,
        }
    }

    /// Applies this transformation to the live graph and tree.
    ///
    /// A deletion whose visitor reports no change is an internal
    /// consistency error: the analysis asserted deletability that did not
    /// hold. It is not retried and not recovered.
    pub fn apply(&self, cfg: &mut Cfg, tree: &mut SyntaxTree) -> KilnResult<()> {
        match self {
            Transformation::DeleteNode { node } => {
                let Some(syntax) = cfg.node(*node).syntax else {
                    return Err(InternalError::failed_transformation(
                        self.describe(),
                        "node is already a synthetic no-op",
                    ));
                };
                if !delete_statement(tree, syntax) {
                    return Err(InternalError::failed_transformation(
                        self.describe(),
                        "deletion visitor removed nothing",
                    ));
                }
                cfg.replace_with_noop(*node);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_cfg::build_cfg;
    use kiln_diagnostics::DiagnosticSink;
    use kiln_syntax::parse_unit;

    fn parse(source: &str) -> SyntaxTree {
        let sink = DiagnosticSink::new();
        parse_unit(source, &sink).expect("test source must parse")
    }

    fn node_wrapping(cfg: &Cfg, syntax: kiln_syntax::SyntaxNodeId) -> CfgNodeId {
        cfg.node_ids()
            .find(|&id| cfg.node(id).syntax == Some(syntax))
            .expect("no node wraps that syntax")
    }

    #[test]
    fn delete_updates_tree_and_graph() {
        let mut tree = parse("unit main\nret\nlet dead = 1\n");
        let mut cfg = build_cfg(&tree);
        let dead_syntax = tree.node(tree.root()).children[1];
        let dead_node = node_wrapping(&cfg, dead_syntax);

        let before_in = cfg.graph_in_edges().len();
        let before_out = cfg.graph_out_edges().len();

        Transformation::DeleteNode { node: dead_node }
            .apply(&mut cfg, &mut tree)
            .unwrap();

        assert!(!tree.is_attached(dead_syntax));
        assert!(cfg.node(dead_node).is_noop());
        assert!(cfg.node(dead_node).parent.is_some());
        // Graph boundary sets are untouched by deletion.
        assert_eq!(cfg.graph_in_edges().len(), before_in);
        assert_eq!(cfg.graph_out_edges().len(), before_out);
    }

    #[test]
    fn double_application_is_fatal() {
        let mut tree = parse("unit main\nret\nlet dead = 1\n");
        let mut cfg = build_cfg(&tree);
        let dead_syntax = tree.node(tree.root()).children[1];
        let dead_node = node_wrapping(&cfg, dead_syntax);
        let transformation = Transformation::DeleteNode { node: dead_node };

        transformation.apply(&mut cfg, &mut tree).unwrap();
        let err = transformation.apply(&mut cfg, &mut tree).unwrap_err();
        assert!(err.message.contains("no-op"));
    }

    #[test]
    fn undeleteable_statement_is_fatal() {
        let mut tree = parse("unit main\nret\nlet dead = 1\n");
        let mut cfg = build_cfg(&tree);
        let dead_syntax = tree.node(tree.root()).children[1];
        let dead_node = node_wrapping(&cfg, dead_syntax);

        // Unlink behind the transformation's back; the visitor then finds
        // nothing to remove, which is an analysis bug, not a recoverable
        // condition.
        assert!(delete_statement(&mut tree, dead_syntax));
        let err = Transformation::DeleteNode { node: dead_node }
            .apply(&mut cfg, &mut tree)
            .unwrap_err();
        assert!(err.message.contains("removed nothing"));
    }
}
