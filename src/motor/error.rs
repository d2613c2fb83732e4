// Error types for the motor control layer

use super::controller::MotorRole;

/// Errors raised by a hardware (or simulated) backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },

    #[error("Motor {id} rejected request: {reason}")]
    Rejected { id: u8, reason: String },
}

/// Errors surfaced by a [`MotorController`](super::MotorController)
///
/// A call that returns an error has not been applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotorError {
    #[error("Communication error: {0}")]
    Communication(#[from] BackendError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Motor is bound to the {bound:?} role, got a {requested:?} request")]
    RoleMismatch {
        bound: MotorRole,
        requested: MotorRole,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Closed loop not configured: {0}")]
    NotConfigured(&'static str),
}

pub type Result<T> = std::result::Result<T, MotorError>;
