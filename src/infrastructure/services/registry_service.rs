//! Experiment registry service
//!
//! Owns experiment configuration and lifecycle state. Creation validates
//! the whole draft and reports every violation at once; lifecycle
//! transitions go through the store's atomic compare-and-set.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::experiment::{
    traffic_sum_in_tolerance, validate_experiment_id, validate_variant_id,
    AccessibilityConsideration, ApprovalGates, AudienceRule, CulturalSegment, Experiment,
    ExperimentId, ExperimentQuery, ExperimentStore, ExperimentType, Guardrail,
    NeuroscienceObjective, PauseReason, Schedule, StatisticalConfig, StatusTransition,
    StopReason, TrafficAllocation, ValidationViolation, Variant, VariantId,
};
use crate::domain::{EngineError, ExperimentEvent};
use crate::infrastructure::events::EventChannel;
use crate::infrastructure::experiment::statistics;

// ============================================================================
// Request Types
// ============================================================================

/// Request to create a new experiment
#[derive(Debug, Clone, Default)]
pub struct CreateExperimentRequest {
    /// Explicit experiment ID; generated when absent
    pub id: Option<String>,
    pub name: String,
    pub hypothesis: Option<String>,
    pub experiment_type: ExperimentType,
    pub variants: Vec<CreateVariantRequest>,
    pub traffic_allocation: Vec<AllocationRequest>,
    pub include_rules: Vec<AudienceRule>,
    pub exclude_rules: Vec<AudienceRule>,
    pub cultural_segments: Vec<CulturalSegment>,
    pub neuroscience_objectives: Vec<NeuroscienceObjective>,
    pub accessibility_considerations: Vec<AccessibilityConsideration>,
    /// Primary metric ID; defaults to `conversion` when absent
    pub primary_metric: Option<String>,
    pub secondary_metrics: Vec<String>,
    pub guardrails: Vec<Guardrail>,
    pub statistics: StatisticalConfig,
    pub schedule: Schedule,
    pub gates: ApprovalGates,
}

/// Request to create a new variant
#[derive(Debug, Clone)]
pub struct CreateVariantRequest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub weight: f64,
    pub payload: serde_json::Value,
}

impl CreateVariantRequest {
    /// Create a variant request with weight 1.0 and an empty payload
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            weight: 1.0,
            payload: serde_json::Value::Null,
        }
    }
}

/// Requested traffic share for one variant
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub variant_id: String,
    pub percentage: f64,
    pub conditions: Vec<AudienceRule>,
}

impl AllocationRequest {
    /// Create an unconditional allocation
    pub fn new(variant_id: impl Into<String>, percentage: f64) -> Self {
        Self {
            variant_id: variant_id.into(),
            percentage,
            conditions: Vec::new(),
        }
    }
}

// ============================================================================
// Registry Service
// ============================================================================

/// Service owning experiment configuration and lifecycle
#[derive(Debug)]
pub struct RegistryService<S: ExperimentStore> {
    store: Arc<S>,
    events: Arc<EventChannel>,
}

impl<S: ExperimentStore> RegistryService<S> {
    /// Create a new registry service
    pub fn new(store: Arc<S>, events: Arc<EventChannel>) -> Self {
        Self { store, events }
    }

    // ========================================================================
    // CRUD Operations
    // ========================================================================

    /// Get an experiment by ID
    pub async fn get(&self, id: &str) -> Result<Option<Experiment>, EngineError> {
        let experiment_id = self.parse_id(id)?;
        self.store.get(&experiment_id).await
    }

    /// List experiments with optional filters
    pub async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, EngineError> {
        self.store.list(query).await
    }

    /// Create a new experiment in Draft status.
    ///
    /// The request is validated as a whole and every violation is reported
    /// in a single error rather than one per call.
    pub async fn create(
        &self,
        request: CreateExperimentRequest,
    ) -> Result<Experiment, EngineError> {
        debug!(name = %request.name, "Creating experiment");

        let violations = validate_request(&request);

        if !violations.is_empty() {
            return Err(EngineError::validation(violations));
        }

        let experiment_id = match &request.id {
            Some(id) => ExperimentId::new(id)?,
            None => ExperimentId::generate(),
        };

        if self.store.exists(&experiment_id).await? {
            return Err(EngineError::conflict(format!(
                "Experiment '{}' already exists",
                experiment_id
            )));
        }

        let experiment = build_experiment(experiment_id.clone(), request)?;
        let created = self.store.insert(experiment).await?;

        self.events.publish(ExperimentEvent::ExperimentCreated {
            experiment_id: experiment_id.clone(),
            name: created.name().to_string(),
        });
        info!(experiment_id = %experiment_id, "Experiment created");

        Ok(created)
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Start an experiment (Draft -> Running).
    ///
    /// Checks the approval gates the configuration requires, reporting all
    /// missing gates together, and records the required sample size.
    pub async fn start(&self, id: &str) -> Result<Experiment, EngineError> {
        debug!(experiment_id = %id, "Starting experiment");

        let experiment_id = self.parse_id(id)?;

        let experiment = self
            .store
            .get(&experiment_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Experiment '{}' not found", id)))?;

        check_gates(&experiment)?;

        let required_sample_size = statistics::required_sample_size(
            experiment.statistics(),
            experiment.cultural_segments().len(),
            experiment.variants().len(),
        );

        let started = self
            .store
            .apply_transition(
                &experiment_id,
                StatusTransition::Start {
                    required_sample_size,
                },
            )
            .await?;

        self.events.publish(ExperimentEvent::ExperimentStarted {
            experiment_id: experiment_id.clone(),
            required_sample_size,
        });
        info!(experiment_id = %id, required_sample_size, "Experiment started");

        Ok(started)
    }

    /// Pause an experiment on operator request (Running -> Paused)
    pub async fn pause(&self, id: &str) -> Result<Experiment, EngineError> {
        let experiment_id = self.parse_id(id)?;
        self.pause_with_reason(&experiment_id, PauseReason::Operator)
            .await
    }

    /// Pause an experiment for a given reason
    pub async fn pause_with_reason(
        &self,
        id: &ExperimentId,
        reason: PauseReason,
    ) -> Result<Experiment, EngineError> {
        debug!(experiment_id = %id, reason = %reason, "Pausing experiment");

        let paused = self
            .store
            .apply_transition(id, StatusTransition::Pause)
            .await?;

        self.events.publish(ExperimentEvent::ExperimentPaused {
            experiment_id: id.clone(),
            reason: reason.clone(),
        });
        info!(experiment_id = %id, reason = %reason, "Experiment paused");

        Ok(paused)
    }

    /// Resume a paused experiment (Paused -> Running)
    pub async fn resume(&self, id: &str) -> Result<Experiment, EngineError> {
        debug!(experiment_id = %id, "Resuming experiment");

        let experiment_id = self.parse_id(id)?;

        let resumed = self
            .store
            .apply_transition(&experiment_id, StatusTransition::Resume)
            .await?;

        info!(experiment_id = %id, "Experiment resumed");

        Ok(resumed)
    }

    /// Stop an experiment on operator request (Running -> Completed)
    pub async fn stop(&self, id: &str) -> Result<Experiment, EngineError> {
        let experiment_id = self.parse_id(id)?;
        self.stop_with_reason(&experiment_id, StopReason::Operator)
            .await
    }

    /// Stop an experiment for a given reason
    pub async fn stop_with_reason(
        &self,
        id: &ExperimentId,
        reason: StopReason,
    ) -> Result<Experiment, EngineError> {
        debug!(experiment_id = %id, reason = %reason, "Stopping experiment");

        let stopped = self
            .store
            .apply_transition(id, StatusTransition::Complete)
            .await?;

        self.events.publish(ExperimentEvent::ExperimentStopped {
            experiment_id: id.clone(),
            reason: reason.clone(),
        });
        info!(experiment_id = %id, reason = %reason, "Experiment stopped");

        Ok(stopped)
    }

    /// Cancel an experiment (Running | Paused -> Cancelled)
    pub async fn cancel(&self, id: &str) -> Result<Experiment, EngineError> {
        debug!(experiment_id = %id, "Cancelling experiment");

        let experiment_id = self.parse_id(id)?;

        let cancelled = self
            .store
            .apply_transition(&experiment_id, StatusTransition::Cancel)
            .await?;

        self.events.publish(ExperimentEvent::ExperimentStopped {
            experiment_id: experiment_id.clone(),
            reason: StopReason::Operator,
        });
        info!(experiment_id = %id, "Experiment cancelled");

        Ok(cancelled)
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    fn parse_id(&self, id: &str) -> Result<ExperimentId, EngineError> {
        ExperimentId::new(id).map_err(|violation| EngineError::invalid_id(violation.to_string()))
    }
}

/// Collect every violation in a create request
fn validate_request(request: &CreateExperimentRequest) -> Vec<ValidationViolation> {
    let mut violations = Vec::new();

    if let Some(id) = &request.id {
        if let Err(violation) = validate_experiment_id(id) {
            violations.push(violation);
        }
    }

    if request.variants.len() < 2 {
        violations.push(ValidationViolation::InsufficientVariants {
            found: request.variants.len(),
        });
    }

    let mut seen_ids = HashSet::new();

    for variant in &request.variants {
        if let Err(violation) = validate_variant_id(&variant.id) {
            violations.push(violation);
        }

        if !seen_ids.insert(variant.id.as_str()) {
            violations.push(ValidationViolation::DuplicateVariantId(variant.id.clone()));
        }

        if variant.weight <= 0.0 {
            violations.push(ValidationViolation::NonPositiveVariantWeight(
                variant.id.clone(),
            ));
        }
    }

    let total: f64 = request.traffic_allocation.iter().map(|a| a.percentage).sum();

    if !traffic_sum_in_tolerance(total) {
        violations.push(ValidationViolation::TrafficSumMismatch { total });
    }

    let variant_ids: HashSet<&str> = request.variants.iter().map(|v| v.id.as_str()).collect();

    for allocation in &request.traffic_allocation {
        if !variant_ids.contains(allocation.variant_id.as_str()) {
            violations.push(ValidationViolation::UnknownVariantInAllocation(
                allocation.variant_id.clone(),
            ));
        }
    }

    for (position, segment) in request.cultural_segments.iter().enumerate() {
        if segment.name().trim().is_empty() {
            violations.push(ValidationViolation::SegmentMissingName(position));
        }

        if segment.expected_share() <= 0.0 {
            violations.push(ValidationViolation::NonPositiveSegmentShare(
                segment.id().to_string(),
            ));
        }
    }

    for objective in &request.neuroscience_objectives {
        if objective.validation_method().trim().is_empty() {
            violations.push(ValidationViolation::ObjectiveMissingValidationMethod(
                objective.id().to_string(),
            ));
        }

        if objective.expected_improvement() <= 0.0 {
            violations.push(ValidationViolation::NonPositiveExpectedImprovement(
                objective.id().to_string(),
            ));
        }
    }

    let statistics = &request.statistics;

    if statistics.significance_level() <= 0.0 || statistics.significance_level() >= 1.0 {
        violations.push(ValidationViolation::SignificanceLevelOutOfRange(
            statistics.significance_level(),
        ));
    }

    if statistics.power() <= 0.0 || statistics.power() >= 1.0 {
        violations.push(ValidationViolation::PowerOutOfRange(statistics.power()));
    }

    if statistics.minimum_detectable_effect() <= 0.0 {
        violations.push(ValidationViolation::NonPositiveMinimumDetectableEffect(
            statistics.minimum_detectable_effect(),
        ));
    }

    violations
}

/// Check the approval gates the configuration requires, reporting every
/// missing gate in one error
fn check_gates(experiment: &Experiment) -> Result<(), EngineError> {
    let mut missing = Vec::new();

    if !experiment.cultural_segments().is_empty() && !experiment.gates().cultural_approval() {
        missing.push("cultural_approval".to_string());
    }

    if !experiment.neuroscience_objectives().is_empty()
        && !experiment.gates().neuroscience_validation()
    {
        missing.push("neuroscience_validation".to_string());
    }

    if !experiment.gates().ethics_review() {
        missing.push("ethics_review".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::missing_approvals(missing))
    }
}

fn build_experiment(
    id: ExperimentId,
    request: CreateExperimentRequest,
) -> Result<Experiment, EngineError> {
    let mut experiment = Experiment::new(id, &request.name)
        .with_experiment_type(request.experiment_type)
        .with_statistics(request.statistics)
        .with_schedule(request.schedule)
        .with_gates(request.gates);

    if let Some(hypothesis) = request.hypothesis {
        experiment = experiment.with_hypothesis(hypothesis);
    }

    if let Some(primary_metric) = request.primary_metric {
        experiment = experiment.with_primary_metric(primary_metric);
    }

    for variant_request in request.variants {
        experiment = experiment.with_variant(build_variant(variant_request)?);
    }

    for allocation in request.traffic_allocation {
        let variant_id = VariantId::new(&allocation.variant_id)?;
        let mut built = TrafficAllocation::new(variant_id, allocation.percentage);

        for condition in allocation.conditions {
            built = built.with_condition(condition);
        }

        experiment = experiment.with_traffic_allocation(built);
    }

    for rule in request.include_rules {
        experiment = experiment.with_include_rule(rule);
    }

    for rule in request.exclude_rules {
        experiment = experiment.with_exclude_rule(rule);
    }

    for segment in request.cultural_segments {
        experiment = experiment.with_cultural_segment(segment);
    }

    for objective in request.neuroscience_objectives {
        experiment = experiment.with_neuroscience_objective(objective);
    }

    for consideration in request.accessibility_considerations {
        experiment = experiment.with_accessibility_consideration(consideration);
    }

    for metric in request.secondary_metrics {
        experiment = experiment.with_secondary_metric(metric);
    }

    for guardrail in request.guardrails {
        experiment = experiment.with_guardrail(guardrail);
    }

    Ok(experiment)
}

fn build_variant(request: CreateVariantRequest) -> Result<Variant, EngineError> {
    let variant_id = VariantId::new(&request.id)?;
    let mut variant = Variant::new(variant_id, &request.name).with_weight(request.weight);

    if let Some(description) = request.description {
        variant = variant.with_description(description);
    }

    if !request.payload.is_null() {
        variant = variant.with_payload(request.payload);
    }

    Ok(variant)
}
