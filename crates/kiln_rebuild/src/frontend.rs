//! Front-end seam between the recompiler and the unit language.

use kiln_diagnostics::DiagnosticSink;
use kiln_syntax::{lower_unit, parse_unit, SyntaxTree};

/// Parses unit sources and lowers optimized trees to target text.
///
/// The recompiler is generic over this seam; the reference implementation
/// below handles `.ku` sources, and a production front end replaces it
/// behind the same two calls. Shared read-only across worker threads.
pub trait Frontend: Send + Sync {
    /// Parses one unit source. Failures are reported through the sink and
    /// yield `None`.
    fn parse(&self, source: &str, sink: &DiagnosticSink) -> Option<SyntaxTree>;

    /// Lowers an optimized tree to deterministic target text.
    fn lower(&self, tree: &SyntaxTree) -> String;
}

/// The reference `.ku` front end.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitFrontend;

impl Frontend for UnitFrontend {
    fn parse(&self, source: &str, sink: &DiagnosticSink) -> Option<SyntaxTree> {
        parse_unit(source, sink)
    }

    fn lower(&self, tree: &SyntaxTree) -> String {
        lower_unit(tree)
    }
}
