use control::UtilsError;
use thiserror::Error;

/// Faults reported by motor drivers and the façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MotorError {
    /// An input was outside the accepted domain.
    #[error("invalid arguments")]
    InvalidArgs,
    /// HAL bring-up or the startup sequence failed.
    #[error("initialization failed")]
    Init,
    /// A phase voltage exceeded the configured limit.
    #[error("phase voltage above configured limit")]
    Overvoltage,
    /// A phase current exceeded the configured limit.
    #[error("phase current above configured limit")]
    Overcurrent,
    /// An illegal Hall sensor code was observed.
    #[error("illegal hall sensor code")]
    Hall,
    /// A branch that should be unreachable was taken.
    #[error("internal error")]
    Internal,
}

impl From<UtilsError> for MotorError {
    fn from(err: UtilsError) -> Self {
        match err {
            UtilsError::InvalidArgs => MotorError::InvalidArgs,
            // A primitive used before init inside a driver is a driver bug
            UtilsError::Uninitialized | UtilsError::Internal => MotorError::Internal,
        }
    }
}
