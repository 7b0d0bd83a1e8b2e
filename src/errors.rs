use thiserror::Error;

use crate::decimal::Money;
use crate::types::LoanStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LendingError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("access denied: {message}")]
    AccessDenied {
        message: String,
    },

    #[error("invalid state transition: loan is {current}, {message}")]
    InvalidStateTransition {
        current: LoanStatus,
        message: String,
    },

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Money,
        requested: Money,
    },

    #[error("write conflict on {entity} {id}: modified concurrently")]
    Conflict {
        entity: &'static str,
        id: String,
    },

    #[error("internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LendingError {
    pub fn validation(message: impl Into<String>) -> Self {
        LendingError::Validation { message: message.into() }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        LendingError::AccessDenied { message: message.into() }
    }

    pub fn invalid_transition(current: LoanStatus, message: impl Into<String>) -> Self {
        LendingError::InvalidStateTransition {
            current,
            message: message.into(),
        }
    }

    /// business rejections are reported to the caller and never retried;
    /// only `Internal` signals a fault in the environment
    pub fn is_business_rejection(&self) -> bool {
        !matches!(self, LendingError::Internal { .. })
    }

    /// a conflict may succeed if the caller re-reads and tries again
    pub fn is_conflict(&self) -> bool {
        matches!(self, LendingError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;
