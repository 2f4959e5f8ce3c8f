//! Structured diagnostics for the kiln recompilation core.
//!
//! Diagnostics are the channel through which compile attempts report user
//! errors (unparsable units, unresolved references, failed generators) and
//! internal errors. A [`DiagnosticSink`] accumulates them across one compile
//! attempt; the resulting vector is retained on the attempt's outcome.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
