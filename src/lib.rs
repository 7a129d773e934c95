//! Trialgate Experimentation Engine
//!
//! An online experimentation engine with support for:
//! - Deterministic, exactly-once variant assignment
//! - Streaming metric aggregation and two-proportion significance testing
//! - Cultural segments, neuroscience objectives, and accessibility-aware
//!   eligibility
//! - Guardrail monitoring with automatic pause and stop
//! - Bias detection over live assignment data
//!
//! The [`ExperimentEngine`] facade composes the registry, assignment,
//! metrics, and monitor services over a pluggable store pair; the
//! bundled in-memory stores make it usable without any backing service.

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::EngineConfig;

pub use domain::{
    AccessibilityConsideration, ApprovalGates, Assignment, AssignmentStore, AudienceRule,
    BiasReport, BiasType, CulturalSegment, EngineError, EventKind, Experiment,
    ExperimentAnalysis, ExperimentEvent, ExperimentId, ExperimentQuery, ExperimentResult,
    ExperimentStatus, ExperimentStore, ExperimentType, Guardrail, GuardrailAction,
    GuardrailDirection, MeasurementChannel, NeuroscienceObjective, ParticipantContext,
    RuleOperator, Schedule, StatisticalConfig, TrafficAllocation, Variant, VariantId,
};

pub use infrastructure::events::{EventChannel, EventSubscription};
pub use infrastructure::experiment::{InMemoryAssignmentStore, InMemoryExperimentStore};
pub use infrastructure::logging::init_logging;
pub use infrastructure::services::{
    AllocationRequest, AssignmentService, CreateExperimentRequest, CreateVariantRequest,
    ExperimentEngine, MetricsService, MonitorHandle, MonitorService, RegistryService,
};
