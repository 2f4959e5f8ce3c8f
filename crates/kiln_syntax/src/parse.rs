//! Line-based reference parser for `.ku` unit sources.
//!
//! Grammar, one construct per line (`#` starts a comment):
//!
//! ```text
//! unit <name>            first significant line, names the unit
//! use <name>             reference to another unit
//! gen <rule> <Query>     rebind directive
//! let <name> = <expr>
//! ret
//! if <cond> {
//! } else {
//! loop <label> {
//! break <label>
//! }
//! ```

use crate::ast::{RebindDirective, SyntaxKind, SyntaxNodeId, SyntaxTree};
use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};

/// Missing or misplaced `unit` declaration.
const MISSING_UNIT_DECL: DiagnosticCode = DiagnosticCode {
    category: Category::Error,
    number: 101,
};
/// A line that is not a recognized construct.
const UNKNOWN_STATEMENT: DiagnosticCode = DiagnosticCode {
    category: Category::Error,
    number: 102,
};
/// Braces do not balance.
const UNBALANCED_BRACES: DiagnosticCode = DiagnosticCode {
    category: Category::Error,
    number: 103,
};
/// A recognized construct with malformed arguments.
const MALFORMED_STATEMENT: DiagnosticCode = DiagnosticCode {
    category: Category::Error,
    number: 104,
};

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses one unit source into a syntax tree.
///
/// On malformed input, emits an error diagnostic to `sink` and returns
/// `None` — an unparsable unit is a recoverable, job-scoped failure.
pub fn parse_unit(source: &str, sink: &DiagnosticSink) -> Option<SyntaxTree> {
    let mut tree: Option<SyntaxTree> = None;
    // Stack of open blocks; the `if` node is remembered so `} else {` can
    // attach its second arm.
    let mut stack: Vec<(SyntaxNodeId, Option<SyntaxNodeId>)> = Vec::new();

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = (index + 1) as u32;
        let line = match raw_line.find('#') {
            Some(pos) => raw_line[..pos].trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();

        let tree = match tree.as_mut() {
            Some(tree) => tree,
            None => {
                // The first significant line must declare the unit.
                if tokens.len() == 2 && tokens[0] == "unit" && is_ident(tokens[1]) {
                    let parsed = SyntaxTree::new(tokens[1]);
                    stack.push((parsed.root(), None));
                    tree = Some(parsed);
                    continue;
                }
                sink.emit(Diagnostic::error(
                    MISSING_UNIT_DECL,
                    format!("line {line_no}: expected 'unit <name>' declaration"),
                ));
                return None;
            }
        };
        let unit_name = tree.unit_name().to_string();
        let (current_block, _) = *stack.last().unwrap();

        match tokens[0] {
            "use" => {
                if tokens.len() != 2 || !is_ident(tokens[1]) {
                    return fail(sink, MALFORMED_STATEMENT, &unit_name, line_no, "use <name>");
                }
                tree.add_reference(tokens[1]);
            }
            "gen" => {
                if tokens.len() != 3 || !is_ident(tokens[1]) || !is_ident(tokens[2]) {
                    return fail(
                        sink,
                        MALFORMED_STATEMENT,
                        &unit_name,
                        line_no,
                        "gen <rule> <Query>",
                    );
                }
                tree.add_rebind(RebindDirective {
                    rule: tokens[1].to_string(),
                    query_type: tokens[2].to_string(),
                });
            }
            "let" => {
                let rest = line.strip_prefix("let").unwrap_or("").trim();
                let (name, expr) = match rest.split_once('=') {
                    Some((name, expr)) => (name.trim(), expr.trim()),
                    None => {
                        return fail(
                            sink,
                            MALFORMED_STATEMENT,
                            &unit_name,
                            line_no,
                            "let <name> = <expr>",
                        )
                    }
                };
                if !is_ident(name) || expr.is_empty() {
                    return fail(
                        sink,
                        MALFORMED_STATEMENT,
                        &unit_name,
                        line_no,
                        "let <name> = <expr>",
                    );
                }
                tree.add_node(
                    SyntaxKind::Let {
                        name: name.to_string(),
                        expr: expr.to_string(),
                    },
                    current_block,
                    line_no,
                );
            }
            "ret" => {
                if tokens.len() != 1 {
                    return fail(sink, MALFORMED_STATEMENT, &unit_name, line_no, "ret");
                }
                tree.add_node(SyntaxKind::Ret, current_block, line_no);
            }
            "if" => {
                if tokens.len() != 3 || tokens[2] != "{" || !is_ident(tokens[1]) {
                    return fail(sink, MALFORMED_STATEMENT, &unit_name, line_no, "if <cond> {");
                }
                let if_node = tree.add_node(
                    SyntaxKind::If {
                        cond: tokens[1].to_string(),
                    },
                    current_block,
                    line_no,
                );
                let then_block = tree.add_node(SyntaxKind::Block, if_node, line_no);
                stack.push((then_block, Some(if_node)));
            }
            "loop" => {
                if tokens.len() != 3 || tokens[2] != "{" || !is_ident(tokens[1]) {
                    return fail(
                        sink,
                        MALFORMED_STATEMENT,
                        &unit_name,
                        line_no,
                        "loop <label> {",
                    );
                }
                let loop_node = tree.add_node(
                    SyntaxKind::Loop {
                        label: tokens[1].to_string(),
                    },
                    current_block,
                    line_no,
                );
                let body = tree.add_node(SyntaxKind::Block, loop_node, line_no);
                stack.push((body, None));
            }
            "break" => {
                if tokens.len() != 2 || !is_ident(tokens[1]) {
                    return fail(
                        sink,
                        MALFORMED_STATEMENT,
                        &unit_name,
                        line_no,
                        "break <label>",
                    );
                }
                tree.add_node(
                    SyntaxKind::Break {
                        label: tokens[1].to_string(),
                    },
                    current_block,
                    line_no,
                );
            }
            "}" if tokens.len() == 3 && tokens[1] == "else" && tokens[2] == "{" => {
                let (_, if_node) = stack.pop().unwrap();
                let Some(if_node) = if_node else {
                    sink.emit(
                        Diagnostic::error(
                            UNBALANCED_BRACES,
                            format!("line {line_no}: '}} else {{' without a matching if"),
                        )
                        .with_unit(&unit_name),
                    );
                    return None;
                };
                let else_block = tree.add_node(SyntaxKind::Block, if_node, line_no);
                stack.push((else_block, None));
            }
            "}" if tokens.len() == 1 => {
                stack.pop();
                if stack.is_empty() {
                    sink.emit(
                        Diagnostic::error(
                            UNBALANCED_BRACES,
                            format!("line {line_no}: unmatched '}}'"),
                        )
                        .with_unit(&unit_name),
                    );
                    return None;
                }
            }
            other => {
                sink.emit(
                    Diagnostic::error(
                        UNKNOWN_STATEMENT,
                        format!("line {line_no}: unknown statement '{other}'"),
                    )
                    .with_unit(&unit_name),
                );
                return None;
            }
        }
    }

    let tree = match tree {
        Some(tree) => tree,
        None => {
            sink.emit(Diagnostic::error(
                MISSING_UNIT_DECL,
                "empty source: expected 'unit <name>' declaration",
            ));
            return None;
        }
    };

    if stack.len() != 1 {
        sink.emit(
            Diagnostic::error(UNBALANCED_BRACES, "unit ends inside an open block")
                .with_unit(tree.unit_name()),
        );
        return None;
    }

    Some(tree)
}

fn fail(
    sink: &DiagnosticSink,
    code: DiagnosticCode,
    unit: &str,
    line_no: u32,
    expected: &str,
) -> Option<SyntaxTree> {
    sink.emit(
        Diagnostic::error(code, format!("line {line_no}: expected '{expected}'")).with_unit(unit),
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SyntaxKind;

    fn parse_ok(source: &str) -> SyntaxTree {
        let sink = DiagnosticSink::new();
        let tree = parse_unit(source, &sink);
        assert!(
            !sink.has_errors(),
            "unexpected errors: {:?}",
            sink.diagnostics()
        );
        tree.unwrap()
    }

    fn parse_err(source: &str) {
        let sink = DiagnosticSink::new();
        assert!(parse_unit(source, &sink).is_none());
        assert!(sink.has_errors());
    }

    #[test]
    fn straight_line_unit() {
        let tree = parse_ok("unit main\nlet x = 1\nret\n");
        let root = tree.root();
        assert_eq!(tree.unit_name(), "main");
        assert_eq!(tree.node(root).children.len(), 2);
        let first = tree.node(tree.node(root).children[0]);
        assert!(matches!(first.kind, SyntaxKind::Let { ref name, .. } if name == "x"));
    }

    #[test]
    fn references_and_rebinds() {
        let tree = parse_ok("unit main\nuse util\nuse data\ngen mirror Display\nret\n");
        assert_eq!(tree.references(), &["util".to_string(), "data".to_string()]);
        assert_eq!(tree.rebinds().len(), 1);
        assert_eq!(tree.rebinds()[0].rule, "mirror");
        assert_eq!(tree.rebinds()[0].query_type, "Display");
    }

    #[test]
    fn if_else_structure() {
        let tree = parse_ok("unit main\nif x {\nret\n} else {\nlet y = 2\n}\nret\n");
        let root = tree.root();
        let if_id = tree.node(root).children[0];
        let if_node = tree.node(if_id);
        assert!(matches!(if_node.kind, SyntaxKind::If { ref cond } if cond == "x"));
        assert_eq!(if_node.children.len(), 2, "then and else blocks");
    }

    #[test]
    fn labeled_loop_with_break() {
        let tree = parse_ok("unit main\nloop outer {\nbreak outer\n}\nret\n");
        let root = tree.root();
        let loop_id = tree.node(root).children[0];
        assert!(
            matches!(tree.node(loop_id).kind, SyntaxKind::Loop { ref label } if label == "outer")
        );
        let body = tree.node(loop_id).children[0];
        assert!(matches!(tree.node(body).kind, SyntaxKind::Block));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let tree = parse_ok("# header\n\nunit main\nret # trailing\n");
        assert_eq!(tree.node(tree.root()).children.len(), 1);
    }

    #[test]
    fn missing_unit_declaration() {
        parse_err("let x = 1\n");
        parse_err("");
    }

    #[test]
    fn unknown_statement() {
        parse_err("unit main\nfrobnicate\n");
    }

    #[test]
    fn unbalanced_braces() {
        parse_err("unit main\nif x {\nret\n");
        parse_err("unit main\n}\n");
    }

    #[test]
    fn malformed_let() {
        parse_err("unit main\nlet = 3\n");
        parse_err("unit main\nlet x\n");
    }

    #[test]
    fn else_without_if() {
        parse_err("unit main\nloop l {\n} else {\n}\n");
    }
}
