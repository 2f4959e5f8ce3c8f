//! Lowering of an optimized syntax tree to target text.
//!
//! The reference emitter prints one line per surviving statement. The real
//! emitter is a collaborator; the core only needs a deterministic, cacheable
//! rendition of "the unit after optimization".

use crate::ast::{SyntaxKind, SyntaxNodeId, SyntaxTree};
use std::fmt::Write;

/// Lowers the surviving statements of a unit to deterministic target text.
pub fn lower_unit(tree: &SyntaxTree) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "unit {}", tree.unit_name());
    lower_children(tree, tree.root(), 0, &mut out);
    out
}

fn lower_children(tree: &SyntaxTree, parent: SyntaxNodeId, indent: usize, out: &mut String) {
    for &child in &tree.node(parent).children {
        lower_node(tree, child, indent, out);
    }
}

fn lower_node(tree: &SyntaxTree, id: SyntaxNodeId, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match &tree.node(id).kind {
        SyntaxKind::Unit => lower_children(tree, id, indent, out),
        SyntaxKind::Block => lower_children(tree, id, indent, out),
        SyntaxKind::Let { name, expr } => {
            let _ = writeln!(out, "{pad}set {name} := {expr}");
        }
        SyntaxKind::Ret => {
            let _ = writeln!(out, "{pad}return");
        }
        SyntaxKind::If { cond } => {
            let _ = writeln!(out, "{pad}branch {cond}");
            let children = &tree.node(id).children;
            if let Some(&then_block) = children.first() {
                lower_node(tree, then_block, indent + 1, out);
            }
            if let Some(&else_block) = children.get(1) {
                let _ = writeln!(out, "{pad}otherwise");
                lower_node(tree, else_block, indent + 1, out);
            }
            let _ = writeln!(out, "{pad}join");
        }
        SyntaxKind::Loop { label } => {
            let _ = writeln!(out, "{pad}repeat {label}");
            lower_children(tree, id, indent + 1, out);
            let _ = writeln!(out, "{pad}end {label}");
        }
        SyntaxKind::Break { label } => {
            let _ = writeln!(out, "{pad}exit {label}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delete::delete_statement;
    use crate::parse::parse_unit;
    use kiln_diagnostics::DiagnosticSink;

    fn parse(source: &str) -> SyntaxTree {
        let sink = DiagnosticSink::new();
        parse_unit(source, &sink).expect("test source must parse")
    }

    #[test]
    fn deterministic() {
        let tree = parse("unit main\nlet x = 1\nret\n");
        assert_eq!(lower_unit(&tree), lower_unit(&tree));
    }

    #[test]
    fn statement_shapes() {
        let tree = parse("unit main\nlet x = 1\nif x {\nret\n}\nloop l {\nbreak l\n}\nret\n");
        let text = lower_unit(&tree);
        assert!(text.starts_with("unit main\n"));
        assert!(text.contains("set x := 1"));
        assert!(text.contains("branch x"));
        assert!(text.contains("repeat l"));
        assert!(text.contains("exit l"));
    }

    #[test]
    fn deleted_statements_do_not_appear() {
        let mut tree = parse("unit main\nret\nlet dead = 1\n");
        let dead = tree.node(tree.root()).children[1];
        assert!(delete_statement(&mut tree, dead));

        let text = lower_unit(&tree);
        assert!(!text.contains("dead"));
        assert!(text.contains("return"));
    }
}
