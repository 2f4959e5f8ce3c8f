//! Deletion protocol for syntax nodes.
//!
//! Deletion is two-phase: locate the nearest enclosing statement for the
//! requested node, then structurally unlink that statement from its parent
//! by identity. The visitor reports whether it removed anything; a `false`
//! return means the caller's deletability assumption did not hold, which
//! callers treat as a fatal internal error.

use crate::ast::{SyntaxKind, SyntaxNodeId, SyntaxTree};

/// Walks a parent fragment searching for the exact node instance to remove.
///
/// Matching is by identity (arena ID), never by value: two structurally
/// equal statements are still distinct nodes.
struct DeletionVisitor {
    target: SyntaxNodeId,
    removed: bool,
}

impl DeletionVisitor {
    fn new(target: SyntaxNodeId) -> Self {
        Self {
            target,
            removed: false,
        }
    }

    fn visit_children(&mut self, tree: &mut SyntaxTree, parent: SyntaxNodeId) {
        let position = tree
            .node(parent)
            .children
            .iter()
            .position(|&child| child == self.target);
        if let Some(position) = position {
            tree.node_mut(parent).children.remove(position);
            tree.node_mut(self.target).parent = None;
            self.removed = true;
        }
    }
}

/// Resolves the statement that deletion of `node` actually removes.
///
/// Ascends past block wrappers to the nearest enclosing statement. A loop
/// body resolves to its loop, so labeled constructs are deleted together
/// with their label.
fn enclosing_statement(tree: &SyntaxTree, node: SyntaxNodeId) -> Option<SyntaxNodeId> {
    let mut current = node;
    loop {
        if tree.node(current).kind.is_statement() {
            return Some(current);
        }
        current = tree.node(current).parent?;
    }
}

/// Deletes the statement enclosing `node` from the tree.
///
/// Returns `true` if a statement was unlinked. Returns `false` if no
/// enclosing statement exists or the statement was not found among its
/// parent's children — callers must treat `false` as an internal
/// consistency error, not retry it.
pub fn delete_statement(tree: &mut SyntaxTree, node: SyntaxNodeId) -> bool {
    let Some(statement) = enclosing_statement(tree, node) else {
        return false;
    };
    let Some(parent) = tree.node(statement).parent else {
        return false;
    };

    let mut visitor = DeletionVisitor::new(statement);
    visitor.visit_children(tree, parent);
    visitor.removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_unit;
    use kiln_diagnostics::DiagnosticSink;

    fn parse(source: &str) -> SyntaxTree {
        let sink = DiagnosticSink::new();
        parse_unit(source, &sink).expect("test source must parse")
    }

    #[test]
    fn deletes_simple_statement() {
        let mut tree = parse("unit main\nret\nlet x = 1\n");
        let root = tree.root();
        let dead = tree.node(root).children[1];

        assert!(delete_statement(&mut tree, dead));
        assert_eq!(tree.node(root).children.len(), 1);
        assert!(!tree.is_attached(dead));
    }

    #[test]
    fn block_resolves_to_enclosing_loop() {
        let mut tree = parse("unit main\nloop outer {\nbreak outer\n}\nret\n");
        let root = tree.root();
        let loop_id = tree.node(root).children[0];
        let body = tree.node(loop_id).children[0];

        // Requesting deletion of the loop body removes the labeled loop itself.
        assert!(delete_statement(&mut tree, body));
        assert!(!tree.is_attached(loop_id));
        assert_eq!(tree.node(root).children.len(), 1);
        assert!(matches!(
            tree.node(tree.node(root).children[0]).kind,
            SyntaxKind::Ret
        ));
    }

    #[test]
    fn deleting_if_removes_both_arms() {
        let mut tree = parse("unit main\nif x {\nret\n} else {\nret\n}\nret\n");
        let root = tree.root();
        let if_id = tree.node(root).children[0];
        let then_block = tree.node(if_id).children[0];
        let inner_ret = tree.node(then_block).children[0];

        assert!(delete_statement(&mut tree, if_id));
        assert!(!tree.is_attached(if_id));
        assert!(!tree.is_attached(inner_ret));
    }

    #[test]
    fn double_delete_reports_no_change() {
        let mut tree = parse("unit main\nret\nlet x = 1\n");
        let dead = tree.node(tree.root()).children[1];

        assert!(delete_statement(&mut tree, dead));
        // The node is already unlinked; the visitor finds nothing to remove.
        assert!(!delete_statement(&mut tree, dead));
    }

    #[test]
    fn deleting_the_root_is_rejected() {
        let mut tree = parse("unit main\nret\n");
        let root = tree.root();
        assert!(!delete_statement(&mut tree, root));
    }

    #[test]
    fn identity_not_value_match() {
        // Two identical `ret` statements; deleting the second must not
        // touch the first.
        let mut tree = parse("unit main\nret\nret\n");
        let root = tree.root();
        let first = tree.node(root).children[0];
        let second = tree.node(root).children[1];

        assert!(delete_statement(&mut tree, second));
        assert!(tree.is_attached(first));
        assert!(!tree.is_attached(second));
    }
}
