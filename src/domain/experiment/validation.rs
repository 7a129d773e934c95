//! Experiment validation utilities

use std::fmt;

use thiserror::Error;

/// Maximum length for experiment IDs
pub const MAX_EXPERIMENT_ID_LENGTH: usize = 50;

/// Maximum length for variant IDs
pub const MAX_VARIANT_ID_LENGTH: usize = 50;

/// Traffic allocation percentages must sum to this total
pub const TRAFFIC_SUM_TARGET: f64 = 100.0;

/// Allowed deviation from [`TRAFFIC_SUM_TARGET`]
pub const TRAFFIC_SUM_TOLERANCE: f64 = 0.1;

/// Which kind of identifier a violation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Experiment,
    Variant,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::Experiment => write!(f, "Experiment"),
            IdKind::Variant => write!(f, "Variant"),
        }
    }
}

/// A single violated invariant of an experiment configuration.
///
/// Creation-time validation collects every violation before reporting, so
/// callers see the complete list at once rather than one failure per round
/// trip.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationViolation {
    #[error("{kind} ID cannot be empty")]
    EmptyId { kind: IdKind },

    #[error("{kind} ID exceeds maximum length of {max} characters")]
    IdTooLong { kind: IdKind, max: usize },

    #[error("{kind} ID must start with a letter or number")]
    InvalidIdStart { kind: IdKind },

    #[error("{kind} ID must end with a letter or number")]
    InvalidIdEnd { kind: IdKind },

    #[error("{kind} ID contains invalid character: '{character}'")]
    InvalidIdCharacter { kind: IdKind, character: char },

    #[error("{kind} ID cannot contain consecutive hyphens")]
    ConsecutiveHyphens { kind: IdKind },

    #[error("at least 2 variants required, got {found}")]
    InsufficientVariants { found: usize },

    #[error("traffic allocations must sum to 100, got {total}")]
    TrafficSumMismatch { total: f64 },

    #[error("Duplicate variant ID: '{0}'")]
    DuplicateVariantId(String),

    #[error("Traffic allocated to unknown variant: '{0}'")]
    UnknownVariantInAllocation(String),

    #[error("Variant '{0}' must have a positive weight")]
    NonPositiveVariantWeight(String),

    #[error("Cultural segment at position {0} is missing a name")]
    SegmentMissingName(usize),

    #[error("Cultural segment '{0}' must declare a positive expected share")]
    NonPositiveSegmentShare(String),

    #[error("Neuroscience objective '{0}' must declare a validation method")]
    ObjectiveMissingValidationMethod(String),

    #[error("Neuroscience objective '{0}' must declare a positive expected improvement")]
    NonPositiveExpectedImprovement(String),

    #[error("Significance level must be in (0, 1), got {0}")]
    SignificanceLevelOutOfRange(f64),

    #[error("Statistical power must be in (0, 1), got {0}")]
    PowerOutOfRange(f64),

    #[error("Minimum detectable effect must be positive, got {0}")]
    NonPositiveMinimumDetectableEffect(f64),

    #[error("Invalid experiment status transition from {0} to {1}")]
    InvalidStatusTransition(String, String),
}

/// Validate an experiment ID
pub fn validate_experiment_id(id: &str) -> Result<(), ValidationViolation> {
    validate_id(IdKind::Experiment, id, MAX_EXPERIMENT_ID_LENGTH)
}

/// Validate a variant ID
pub fn validate_variant_id(id: &str) -> Result<(), ValidationViolation> {
    validate_id(IdKind::Variant, id, MAX_VARIANT_ID_LENGTH)
}

fn validate_id(kind: IdKind, id: &str, max: usize) -> Result<(), ValidationViolation> {
    if id.is_empty() {
        return Err(ValidationViolation::EmptyId { kind });
    }

    if id.len() > max {
        return Err(ValidationViolation::IdTooLong { kind, max });
    }

    if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(ValidationViolation::InvalidIdStart { kind });
    }

    if !id.ends_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(ValidationViolation::InvalidIdEnd { kind });
    }

    let mut prev_was_hyphen = false;

    for ch in id.chars() {
        if ch == '-' {
            if prev_was_hyphen {
                return Err(ValidationViolation::ConsecutiveHyphens { kind });
            }
            prev_was_hyphen = true;
        } else if ch.is_ascii_alphanumeric() {
            prev_was_hyphen = false;
        } else {
            return Err(ValidationViolation::InvalidIdCharacter {
                kind,
                character: ch,
            });
        }
    }

    Ok(())
}

/// Check a traffic-percentage total against the 100 ± tolerance window.
pub fn traffic_sum_in_tolerance(total: f64) -> bool {
    (total - TRAFFIC_SUM_TARGET).abs() <= TRAFFIC_SUM_TOLERANCE
}
