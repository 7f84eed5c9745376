use thiserror::Error;

/// Failures of the numeric primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UtilsError {
    /// An input was outside the accepted domain.
    #[error("invalid arguments")]
    InvalidArgs,
    /// A primitive was used before its `init` was called.
    #[error("used before initialization")]
    Uninitialized,
    /// A branch that should be unreachable was taken.
    #[error("internal error")]
    Internal,
}
