use thiserror::Error;

use crate::lifecycle::{ApplicationStatus, CollaborationStatus};

/// Business-rule failures raised by the pure domain checks in this crate.
///
/// None of these imply a write happened; callers surface them and leave state
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// A required field is missing or malformed. `field` names the offending
    /// input so clients can render the failure inline.
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("invalid check-in payload: {0}")]
    InvalidPayload(String),

    #[error("check-in payload was issued for a different business")]
    BusinessMismatch,

    #[error("application cannot move from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("collaboration has already been checked in")]
    AlreadyCheckedIn,

    #[error("collaboration is {0}, expected active")]
    CollaborationNotActive(CollaborationStatus),

    #[error("content proof must be submitted before completion")]
    ProofMissing,

    #[error("unknown {kind} value: '{value}'")]
    UnknownValue { kind: &'static str, value: String },
}

impl RuleError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// The input field a validation failure refers to, if any.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }
}
