//! Syntax-tree model and reference front end for kiln unit sources.
//!
//! A unit is one `.ku` file. The tree is an arena of nodes with explicit
//! parent back-references; the optimizer mutates it only through the
//! deletion protocol in [`delete`]. The parser and lowerer here form the
//! reference front end used by the recompiler and by tests; a production
//! front end replaces them behind the same types.

#![warn(missing_docs)]

pub mod ast;
pub mod delete;
pub mod lower;
pub mod parse;

pub use ast::{RebindDirective, SyntaxKind, SyntaxNode, SyntaxNodeId, SyntaxTree};
pub use delete::delete_statement;
pub use lower::lower_unit;
pub use parse::parse_unit;
