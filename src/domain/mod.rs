//! Domain layer - Core business logic and entities

pub mod error;
pub mod experiment;

pub use error::EngineError;
pub use experiment::{
    AccessibilityConsideration, ApprovalGates, Assignment, AssignmentStore, AudienceRule,
    BiasReport, BiasType, ConfidenceInterval, CulturalAnalysis, CulturalSegment, EventKind,
    Experiment, ExperimentAnalysis, ExperimentEvent, ExperimentId, ExperimentQuery,
    ExperimentResult, ExperimentStatus, ExperimentStore, ExperimentType, Guardrail,
    GuardrailAction, GuardrailDirection, MeasurementChannel, MetricKey, MetricSnapshot,
    MetricState, MultipleTestingCorrection, NeuroscienceAnalysis, NeuroscienceObjective,
    ObjectiveOutcome, PairwiseComparison, ParticipantContext, PauseReason, RuleOperator, Schedule,
    SegmentRepresentation, StatisticalAnalysis, StatisticalConfig, StatusTransition, StopReason,
    TrafficAllocation, ValidationViolation, Variant, VariantId, VariantResult,
};
