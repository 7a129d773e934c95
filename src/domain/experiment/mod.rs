//! Experiment domain module
//!
//! This module provides the types and traits for defining experiments,
//! assigning participants to variants, and aggregating outcome metrics.

mod assignment;
mod entity;
mod event;
mod metrics;
mod result;
mod store;
mod validation;

// Re-export all public types
pub use assignment::{
    Assignment, ParticipantContext, ACCESSIBILITY_ATTRIBUTE, CULTURAL_ATTRIBUTE,
};
pub use entity::{
    AccessibilityConsideration, ApprovalGates, AudienceRule, CulturalSegment, Experiment,
    ExperimentId, ExperimentStatus, ExperimentType, Guardrail, GuardrailAction,
    GuardrailDirection, MultipleTestingCorrection, NeuroscienceObjective, RuleOperator, Schedule,
    StatisticalConfig, TrafficAllocation, Variant, VariantId,
};
pub use event::{EventKind, ExperimentEvent, PauseReason, StopReason};
pub use metrics::{MeasurementChannel, MetricKey, MetricSnapshot, MetricState};
pub use result::{
    BiasReport, BiasType, ConfidenceInterval, CulturalAnalysis, ExperimentAnalysis,
    ExperimentResult, NeuroscienceAnalysis, ObjectiveOutcome, PairwiseComparison,
    SegmentRepresentation, StatisticalAnalysis, VariantResult,
};
pub use store::{AssignmentStore, ExperimentQuery, ExperimentStore, StatusTransition};
pub use validation::{
    traffic_sum_in_tolerance, validate_experiment_id, validate_variant_id, IdKind,
    ValidationViolation, MAX_EXPERIMENT_ID_LENGTH, MAX_VARIANT_ID_LENGTH, TRAFFIC_SUM_TARGET,
    TRAFFIC_SUM_TOLERANCE,
};

#[cfg(test)]
pub use store::mock::{MockAssignmentStore, MockExperimentStore};
