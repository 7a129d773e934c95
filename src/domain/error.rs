use thiserror::Error;

use crate::domain::experiment::ValidationViolation;

/// Core engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation failed: {}", format_violations(.violations))]
    Validation {
        violations: Vec<ValidationViolation>,
    },

    #[error("Invalid ID format: {message}")]
    InvalidId { message: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Missing approval gates: {}", .gates.join(", "))]
    MissingApprovals { gates: Vec<String> },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

fn format_violations(violations: &[ValidationViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(violations: Vec<ValidationViolation>) -> Self {
        Self::Validation { violations }
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn missing_approvals(gates: Vec<String>) -> Self {
        Self::MissingApprovals { gates }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// All violations carried by a `Validation` error, empty otherwise.
    pub fn violations(&self) -> &[ValidationViolation] {
        match self {
            Self::Validation { violations } => violations,
            _ => &[],
        }
    }
}

impl From<ValidationViolation> for EngineError {
    fn from(violation: ValidationViolation) -> Self {
        match violation {
            ValidationViolation::InvalidStatusTransition(from, to) => {
                Self::InvalidTransition { from, to }
            }
            other => Self::Validation {
                violations: vec![other],
            },
        }
    }
}
