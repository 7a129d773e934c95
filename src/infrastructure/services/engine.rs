//! Engine facade
//!
//! Composes the registry, assignment, metrics, and monitor services over
//! a shared store pair, event channel, and metric aggregator, and exposes
//! the public surface of the engine as one object.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::experiment::{
    Assignment, AssignmentStore, BiasReport, Experiment, ExperimentAnalysis, ExperimentId,
    ExperimentQuery, ExperimentResult, ExperimentStore, MeasurementChannel, ParticipantContext,
    VariantId,
};
use crate::domain::EngineError;
use crate::infrastructure::events::{EventChannel, EventSubscription};
use crate::infrastructure::experiment::{
    BiasDetector, BiasThresholds, InMemoryAssignmentStore, InMemoryExperimentStore,
    MetricsAggregator,
};
use crate::infrastructure::services::{
    AssignmentService, CreateExperimentRequest, MetricsService, MonitorHandle, MonitorService,
    RegistryService,
};

/// The experimentation engine
#[derive(Debug)]
pub struct ExperimentEngine<S: ExperimentStore, A: AssignmentStore> {
    registry: Arc<RegistryService<S>>,
    assignment: Arc<AssignmentService<S, A>>,
    metrics: Arc<MetricsService<S, A>>,
    monitor: Arc<MonitorService<S, A>>,
    events: Arc<EventChannel>,
}

impl ExperimentEngine<InMemoryExperimentStore, InMemoryAssignmentStore> {
    /// Engine over in-memory stores with default configuration
    pub fn in_memory() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine over in-memory stores with the given configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryExperimentStore::new()),
            Arc::new(InMemoryAssignmentStore::new()),
            config,
        )
    }
}

impl<S: ExperimentStore, A: AssignmentStore> ExperimentEngine<S, A> {
    /// Compose an engine over the given stores
    pub fn new(experiments: Arc<S>, assignments: Arc<A>, config: EngineConfig) -> Self {
        let events = Arc::new(EventChannel::new());
        let aggregator = Arc::new(MetricsAggregator::new());

        let bias = BiasDetector::new(BiasThresholds {
            selection_deviation: config.bias.selection_deviation,
            selection_severity: config.bias.selection_severity,
            under_representation: config.bias.under_representation,
            cultural_severity: config.bias.cultural_severity,
            dropout_spread: config.bias.dropout_spread,
            dropout_severity: config.bias.dropout_severity,
        });

        let registry = Arc::new(RegistryService::new(experiments.clone(), events.clone()));
        let assignment = Arc::new(AssignmentService::new(
            experiments.clone(),
            assignments.clone(),
            events.clone(),
        ));
        let metrics = Arc::new(MetricsService::new(
            experiments,
            assignments,
            aggregator,
            events.clone(),
            bias,
        ));
        let monitor = Arc::new(MonitorService::new(
            registry.clone(),
            metrics.clone(),
            events.clone(),
            config.monitor.interval(),
        ));

        Self {
            registry,
            assignment,
            metrics,
            monitor,
            events,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create an experiment in Draft status and return its ID
    pub async fn create_experiment(
        &self,
        request: CreateExperimentRequest,
    ) -> Result<ExperimentId, EngineError> {
        Ok(self.registry.create(request).await?.id().clone())
    }

    /// Start a draft experiment
    pub async fn start_experiment(&self, id: &str) -> Result<Experiment, EngineError> {
        self.registry.start(id).await
    }

    /// Pause a running experiment
    pub async fn pause_experiment(&self, id: &str) -> Result<Experiment, EngineError> {
        self.registry.pause(id).await
    }

    /// Resume a paused experiment
    pub async fn resume_experiment(&self, id: &str) -> Result<Experiment, EngineError> {
        self.registry.resume(id).await
    }

    /// Complete a running experiment
    pub async fn stop_experiment(&self, id: &str) -> Result<Experiment, EngineError> {
        self.registry.stop(id).await
    }

    /// Cancel a running or paused experiment
    pub async fn cancel_experiment(&self, id: &str) -> Result<Experiment, EngineError> {
        self.registry.cancel(id).await
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Assign a participant to a variant, or return the stored one
    pub async fn assign_user_to_variant(
        &self,
        experiment_id: &str,
        user_id: &str,
        context: &ParticipantContext,
    ) -> Result<Option<VariantId>, EngineError> {
        self.assignment.assign(experiment_id, user_id, context).await
    }

    /// Look up a participant's stored assignment
    pub async fn get_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
    ) -> Result<Option<Assignment>, EngineError> {
        self.assignment.get(experiment_id, user_id).await
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    /// Record a conversion or metric observation; never fails
    pub async fn track_conversion(
        &self,
        experiment_id: &str,
        user_id: &str,
        metric_id: &str,
        value: f64,
        metadata: Option<serde_json::Value>,
    ) {
        self.metrics
            .track_event(experiment_id, user_id, metric_id, value, metadata)
            .await
    }

    /// Record a participant dropout; never fails
    pub async fn record_dropout(&self, experiment_id: &str, user_id: &str) {
        self.metrics.record_dropout(experiment_id, user_id).await
    }

    /// Ingest an externally supplied channel measurement
    pub async fn record_measurement(
        &self,
        experiment_id: &str,
        variant_id: &str,
        channel: MeasurementChannel,
        metric_id: &str,
        value: f64,
    ) -> Result<(), EngineError> {
        self.metrics
            .record_measurement(experiment_id, variant_id, channel, metric_id, value)
            .await
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Get an experiment by ID
    pub async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>, EngineError> {
        self.registry.get(id).await
    }

    /// List experiments with optional filters
    pub async fn list_experiments(
        &self,
        query: &ExperimentQuery,
    ) -> Result<Vec<Experiment>, EngineError> {
        self.registry.list(query).await
    }

    /// Aggregate per-arm results for an experiment
    pub async fn get_experiment_results(
        &self,
        id: &str,
    ) -> Result<ExperimentResult, EngineError> {
        self.metrics.results(id).await
    }

    /// Run the full analysis pipeline for an experiment
    pub async fn analyze_experiment(&self, id: &str) -> Result<ExperimentAnalysis, EngineError> {
        self.metrics.analyze(id).await
    }

    /// Inspect an experiment for selection, cultural, and dropout bias
    pub async fn detect_bias(&self, id: &str) -> Result<BiasReport, EngineError> {
        let experiment = self
            .registry
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Experiment '{}' not found", id)))?;
        self.metrics.bias_report(&experiment).await
    }

    // ========================================================================
    // Events and Monitoring
    // ========================================================================

    /// Subscribe to the engine's event stream
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// Run one monitoring sweep immediately
    pub async fn run_monitor_tick(&self) {
        self.monitor.run_tick().await
    }
}

impl<S, A> ExperimentEngine<S, A>
where
    S: ExperimentStore + 'static,
    A: AssignmentStore + 'static,
{
    /// Spawn the background monitoring loop
    pub fn spawn_monitor(&self) -> MonitorHandle {
        self.monitor.clone().spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        ApprovalGates, EventKind, ExperimentStatus, Guardrail, GuardrailAction,
        GuardrailDirection,
    };
    use crate::infrastructure::services::{AllocationRequest, CreateVariantRequest};

    fn create_request(id: &str) -> CreateExperimentRequest {
        CreateExperimentRequest {
            id: Some(id.to_string()),
            name: format!("Experiment {}", id),
            variants: vec![
                CreateVariantRequest::new("control", "Control"),
                CreateVariantRequest::new("treatment", "Treatment"),
            ],
            traffic_allocation: vec![
                AllocationRequest::new("control", 50.0),
                AllocationRequest::new("treatment", 50.0),
            ],
            gates: ApprovalGates::new().with_ethics_review(true),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_experiment_lifecycle() {
        let engine = ExperimentEngine::in_memory();
        let mut subscription = engine.subscribe();

        let id = engine.create_experiment(create_request("test-exp")).await.unwrap();
        assert_eq!(id.as_str(), "test-exp");

        let started = engine.start_experiment("test-exp").await.unwrap();
        assert_eq!(started.status(), ExperimentStatus::Running);
        assert!(started.required_sample_size().is_some());

        let context = ParticipantContext::new();
        let variant = engine
            .assign_user_to_variant("test-exp", "user-1", &context)
            .await
            .unwrap()
            .unwrap();

        engine
            .track_conversion("test-exp", "user-1", "conversion", 1.0, None)
            .await;

        let results = engine.get_experiment_results("test-exp").await.unwrap();
        assert_eq!(results.total_participants, 1);
        assert_eq!(
            results.variant_result(variant.as_str()).unwrap().conversions,
            1
        );

        let stopped = engine.stop_experiment("test-exp").await.unwrap();
        assert_eq!(stopped.status(), ExperimentStatus::Completed);

        let kinds: Vec<_> = subscription.drain().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ExperimentCreated,
                EventKind::ExperimentStarted,
                EventKind::UserAssigned,
                EventKind::ConversionTracked,
                EventKind::ExperimentStopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_pause_resume_cancel_cycle() {
        let engine = ExperimentEngine::in_memory();

        engine.create_experiment(create_request("test-exp")).await.unwrap();
        engine.start_experiment("test-exp").await.unwrap();

        let paused = engine.pause_experiment("test-exp").await.unwrap();
        assert_eq!(paused.status(), ExperimentStatus::Paused);

        let resumed = engine.resume_experiment("test-exp").await.unwrap();
        assert_eq!(resumed.status(), ExperimentStatus::Running);

        let cancelled = engine.cancel_experiment("test-exp").await.unwrap();
        assert_eq!(cancelled.status(), ExperimentStatus::Cancelled);

        // Terminal states admit no further transitions
        let result = engine.start_experiment("test-exp").await;
        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_monitor_stops_breached_experiment_through_engine() {
        let engine = ExperimentEngine::in_memory();

        let mut request = create_request("test-exp");
        request.guardrails = vec![Guardrail::new(
            "error-rate",
            0.05,
            GuardrailDirection::Above,
            GuardrailAction::Stop,
        )];
        engine.create_experiment(request).await.unwrap();
        engine.start_experiment("test-exp").await.unwrap();

        let context = ParticipantContext::new();
        engine
            .assign_user_to_variant("test-exp", "user-1", &context)
            .await
            .unwrap();
        engine
            .track_conversion("test-exp", "user-1", "error-rate", 0.2, None)
            .await;

        engine.run_monitor_tick().await;

        let experiment = engine.get_experiment("test-exp").await.unwrap().unwrap();
        assert_eq!(experiment.status(), ExperimentStatus::Completed);
    }

    #[tokio::test]
    async fn test_detect_bias_reads_current_assignments() {
        let engine = ExperimentEngine::in_memory();

        engine.create_experiment(create_request("test-exp")).await.unwrap();
        engine.start_experiment("test-exp").await.unwrap();

        let report = engine.detect_bias("test-exp").await.unwrap();
        assert!(!report.bias_detected);

        let missing = engine.detect_bias("missing-exp").await;
        assert!(matches!(missing, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_analyze_via_engine() {
        let engine = ExperimentEngine::in_memory();

        engine.create_experiment(create_request("test-exp")).await.unwrap();
        engine.start_experiment("test-exp").await.unwrap();

        let context = ParticipantContext::new();
        for i in 0..20 {
            engine
                .assign_user_to_variant("test-exp", &format!("user-{}", i), &context)
                .await
                .unwrap();
        }

        let analysis = engine.analyze_experiment("test-exp").await.unwrap();
        assert_eq!(analysis.results.total_participants, 20);
        assert_eq!(analysis.analysis.comparisons.len(), 1);
        assert!(!analysis.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_monitor_shuts_down() {
        let engine = ExperimentEngine::in_memory();
        let handle = engine.spawn_monitor();
        handle.shutdown().await;
    }
}
