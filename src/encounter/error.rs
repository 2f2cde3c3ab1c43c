//! Turn engine errors

use thiserror::Error;

use super::repository::StorageError;
use crate::combat::DiceError;
use crate::effects::EffectError;

/// Coarse classification callers render failures by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InvalidState,
    Storage,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("dice roll failed: {0}")]
    Dice(#[from] DiceError),

    #[error("invalid effect: {0}")]
    Effect(#[from] EffectError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            // A failed roll is bad input to the operation, never a default roll
            EngineError::Validation(_) | EngineError::Dice(_) | EngineError::Effect(_) => {
                ErrorKind::Validation
            }
            EngineError::InvalidState(_) => ErrorKind::InvalidState,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
