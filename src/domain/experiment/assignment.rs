//! Participant assignment records and context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::entity::{ExperimentId, VariantId};

/// Attribute key holding the participant's cultural background
pub const CULTURAL_ATTRIBUTE: &str = "cultural_background";

/// Attribute key holding the participant's declared accessibility needs
pub const ACCESSIBILITY_ATTRIBUTE: &str = "accessibility_needs";

// ============================================================================
// ParticipantContext
// ============================================================================

/// Caller-supplied attributes describing a participant.
///
/// Audience rules evaluate against arbitrary attributes; the
/// [`CULTURAL_ATTRIBUTE`] and [`ACCESSIBILITY_ATTRIBUTE`] keys additionally
/// feed segment and accessibility eligibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParticipantContext {
    #[serde(flatten)]
    attributes: HashMap<String, Value>,
}

impl ParticipantContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(field.into(), value);
        self
    }

    /// Look up an attribute
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// The participant's cultural background, if declared
    pub fn cultural_background(&self) -> Option<&str> {
        self.attributes.get(CULTURAL_ATTRIBUTE).and_then(Value::as_str)
    }

    /// The participant's declared accessibility needs
    pub fn accessibility_needs(&self) -> Vec<String> {
        self.attributes
            .get(ACCESSIBILITY_ATTRIBUTE)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Assignment
// ============================================================================

/// An immutable record binding a participant to a variant.
///
/// Created at most once per (experiment, user) pair and never reassigned
/// while the experiment record exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    experiment_id: ExperimentId,
    user_id: String,
    variant_id: VariantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    cultural_segment: Option<String>,
    assigned_at: DateTime<Utc>,
}

impl Assignment {
    /// Create a new assignment stamped with the current time
    pub fn new(
        experiment_id: ExperimentId,
        user_id: impl Into<String>,
        variant_id: VariantId,
    ) -> Self {
        Self {
            experiment_id,
            user_id: user_id.into(),
            variant_id,
            cultural_segment: None,
            assigned_at: Utc::now(),
        }
    }

    /// Record which cultural segment the participant matched
    pub fn with_cultural_segment(mut self, segment: impl Into<String>) -> Self {
        self.cultural_segment = Some(segment.into());
        self
    }

    /// Get the experiment ID
    pub fn experiment_id(&self) -> &ExperimentId {
        &self.experiment_id
    }

    /// Get the user ID
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the assigned variant
    pub fn variant_id(&self) -> &VariantId {
        &self.variant_id
    }

    /// Get the matched cultural segment, if any
    pub fn cultural_segment(&self) -> Option<&str> {
        self.cultural_segment.as_deref()
    }

    /// Get when the assignment was created
    pub fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }
}
