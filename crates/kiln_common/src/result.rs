//! Common result and error types for the kiln recompilation core.

/// The standard result type for fallible internal operations.
///
/// `Ok` contains the result value (which may be partial or degraded after
/// error recovery). `Err` indicates an unrecoverable internal error (a bug
/// in kiln), not a user-facing error. User errors are reported through the
/// diagnostic sink and the operation still returns `Ok`.
pub type KilnResult<T> = Result<T, InternalError>;

/// An internal compiler error indicating a bug in kiln, not a user input problem.
///
/// The canonical producer is the transformation layer: an analysis asserted
/// that a graph mutation would apply and it did not. These errors abort the
/// surrounding compile attempt with a distinguished diagnostic rather than
/// continuing with an inconsistent graph.
#[derive(Debug, thiserror::Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// An analysis asserted that a transformation would apply and it did
    /// not. `transformation` is the mutation's own description, `cause`
    /// says what the application found instead.
    pub fn failed_transformation(
        transformation: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            message: format!(
                "transformation `{}` failed: {}",
                transformation.into(),
                cause.into()
            ),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("transformation did not apply");
        assert_eq!(
            format!("{err}"),
            "internal compiler error: transformation did not apply"
        );
    }

    #[test]
    fn from_string() {
        let err: InternalError = String::from("bad graph").into();
        assert_eq!(err.message, "bad graph");
    }

    #[test]
    fn failed_transformation_names_both_halves() {
        let err = InternalError::failed_transformation("delete node 3", "already a no-op");
        assert_eq!(
            err.message,
            "transformation `delete node 3` failed: already a no-op"
        );
    }
}
