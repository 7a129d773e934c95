//! Metric tracking and analysis service
//!
//! Owns the hot tracking path and the analysis pipeline built on top of
//! it. Tracking never returns errors: events against unknown, stopped or
//! unassigned targets are dropped with a debug log so instrumented
//! callers cannot be broken by experiment lifecycle changes.

use std::sync::Arc;

use tracing::debug;

use crate::domain::experiment::{
    AssignmentStore, BiasReport, CulturalAnalysis, Experiment, ExperimentAnalysis, ExperimentId,
    ExperimentResult, ExperimentStore, MeasurementChannel, MetricKey, NeuroscienceAnalysis,
    ObjectiveOutcome, StatisticalAnalysis, VariantId, VariantResult,
};
use crate::domain::{EngineError, ExperimentEvent};
use crate::infrastructure::events::EventChannel;
use crate::infrastructure::experiment::{statistics, BiasDetector, MetricsAggregator};

/// Service tracking metrics and producing experiment analyses
#[derive(Debug)]
pub struct MetricsService<S: ExperimentStore, A: AssignmentStore> {
    experiments: Arc<S>,
    assignments: Arc<A>,
    aggregator: Arc<MetricsAggregator>,
    events: Arc<EventChannel>,
    bias: BiasDetector,
}

impl<S: ExperimentStore, A: AssignmentStore> MetricsService<S, A> {
    /// Create a new metrics service
    pub fn new(
        experiments: Arc<S>,
        assignments: Arc<A>,
        aggregator: Arc<MetricsAggregator>,
        events: Arc<EventChannel>,
        bias: BiasDetector,
    ) -> Self {
        Self {
            experiments,
            assignments,
            aggregator,
            events,
            bias,
        }
    }

    // ========================================================================
    // Tracking Operations
    // ========================================================================

    /// Record a metric observation for an assigned participant.
    ///
    /// Drops the event silently when the experiment is unknown or not
    /// running, or when the participant has no assignment. Emits
    /// `conversion_tracked` for every recorded observation.
    pub async fn track_event(
        &self,
        experiment_id: &str,
        user_id: &str,
        metric_id: &str,
        value: f64,
        metadata: Option<serde_json::Value>,
    ) {
        let Some((experiment_id, variant_id)) =
            self.tracking_target(experiment_id, user_id).await
        else {
            return;
        };

        let key = MetricKey::new(experiment_id.clone(), variant_id, metric_id);
        self.aggregator.record_value(key, value);

        self.events.publish(ExperimentEvent::ConversionTracked {
            experiment_id,
            user_id: user_id.to_string(),
            metric_id: metric_id.to_string(),
            value,
            metadata,
        });
    }

    /// Record that an assigned participant abandoned the experiment.
    ///
    /// Gated exactly like `track_event`; dropped silently on any miss.
    pub async fn record_dropout(&self, experiment_id: &str, user_id: &str) {
        let Some((experiment_id, variant_id)) =
            self.tracking_target(experiment_id, user_id).await
        else {
            return;
        };

        self.aggregator.record_dropout(&experiment_id, &variant_id);
        debug!(
            experiment_id = %experiment_id,
            user_id = %user_id,
            variant_id = %variant_id,
            "Dropout recorded"
        );
    }

    /// Ingest an externally supplied measurement for a variant.
    ///
    /// Cultural, neuroscience and accessibility instruments report per
    /// variant rather than per participant, and their data may arrive
    /// after the experiment has ended, so only the experiment and the
    /// variant have to exist.
    pub async fn record_measurement(
        &self,
        experiment_id: &str,
        variant_id: &str,
        channel: MeasurementChannel,
        metric_id: &str,
        value: f64,
    ) -> Result<(), EngineError> {
        let experiment_id = self.parse_id(experiment_id)?;
        let experiment = self.get_experiment(&experiment_id).await?;

        let variant_id = VariantId::new(variant_id)
            .map_err(|violation| EngineError::invalid_id(violation.to_string()))?;
        if experiment.variant(&variant_id).is_none() {
            return Err(EngineError::not_found(format!(
                "Variant '{}' not found in experiment '{}'",
                variant_id, experiment_id
            )));
        }

        let key = MetricKey::new(experiment_id, variant_id, metric_id);
        self.aggregator.record_measurement(channel, key, value);
        Ok(())
    }

    // ========================================================================
    // Analysis Operations
    // ========================================================================

    /// Aggregate per-arm results for an experiment
    pub async fn results(&self, experiment_id: &str) -> Result<ExperimentResult, EngineError> {
        let experiment_id = self.parse_id(experiment_id)?;
        let experiment = self.get_experiment(&experiment_id).await?;
        self.results_for(&experiment).await
    }

    /// Aggregate per-arm results for an already loaded experiment.
    ///
    /// Every declared variant appears in declared order, zeroed when no
    /// participant reached it yet; the control arm is the first one.
    pub async fn results_for(
        &self,
        experiment: &Experiment,
    ) -> Result<ExperimentResult, EngineError> {
        let variant_counts = self.assignments.variant_counts(experiment.id()).await?;

        let mut result = ExperimentResult::new(
            experiment.id().as_str(),
            experiment.name(),
            experiment.status(),
        );

        for variant in experiment.variants() {
            let participants = variant_counts.get(variant.id()).copied().unwrap_or(0);
            let primary_key = MetricKey::new(
                experiment.id().clone(),
                variant.id().clone(),
                experiment.primary_metric(),
            );
            let conversions = self.aggregator.event_count(&primary_key);
            let dropouts = self.aggregator.dropout_count(experiment.id(), variant.id());

            let mut variant_result = VariantResult::new(variant.id().as_str(), variant.name())
                .with_participation(participants, conversions, dropouts);

            for snapshot in self.aggregator.metric_snapshots(experiment.id(), variant.id()) {
                variant_result = variant_result.with_metric(snapshot);
            }
            for snapshot in self.aggregator.channel_snapshots(
                experiment.id(),
                variant.id(),
                MeasurementChannel::Cultural,
            ) {
                variant_result = variant_result.with_cultural_metric(snapshot);
            }
            for snapshot in self.aggregator.channel_snapshots(
                experiment.id(),
                variant.id(),
                MeasurementChannel::Neuroscience,
            ) {
                variant_result = variant_result.with_neuroscience_metric(snapshot);
            }
            for snapshot in self.aggregator.channel_snapshots(
                experiment.id(),
                variant.id(),
                MeasurementChannel::Accessibility,
            ) {
                variant_result = variant_result.with_accessibility_metric(snapshot);
            }

            result = result.with_variant_result(variant_result);
        }

        Ok(result)
    }

    /// Run the full analysis pipeline for an experiment
    pub async fn analyze(&self, experiment_id: &str) -> Result<ExperimentAnalysis, EngineError> {
        let experiment_id = self.parse_id(experiment_id)?;
        let experiment = self.get_experiment(&experiment_id).await?;
        self.analyze_for(&experiment).await
    }

    /// Run the full analysis pipeline for an already loaded experiment
    pub async fn analyze_for(
        &self,
        experiment: &Experiment,
    ) -> Result<ExperimentAnalysis, EngineError> {
        let results = self.results_for(experiment).await?;
        let analysis = statistics::analyze(
            experiment.statistics(),
            &results.variant_results,
            experiment.cultural_segments().len(),
        );

        let segment_counts = self.assignments.segment_counts(experiment.id()).await?;
        let report = self
            .bias
            .analyze(experiment, &results.variant_results, &segment_counts);

        let cultural_analysis = if experiment.cultural_segments().is_empty() {
            None
        } else {
            Some(CulturalAnalysis {
                representation: self.bias.segment_representation(
                    experiment,
                    &segment_counts,
                    results.total_participants,
                ),
            })
        };

        let neuroscience_analysis = if experiment.neuroscience_objectives().is_empty() {
            None
        } else {
            Some(neuroscience_outcomes(experiment, &results))
        };

        let mut recommendations = statistical_recommendations(&results, &analysis);
        recommendations.extend(report.recommendations.clone());

        Ok(ExperimentAnalysis {
            results,
            analysis,
            cultural_analysis,
            neuroscience_analysis,
            recommendations,
        })
    }

    /// Produce a bias report for an already loaded experiment
    pub async fn bias_report(&self, experiment: &Experiment) -> Result<BiasReport, EngineError> {
        let results = self.results_for(experiment).await?;
        let segment_counts = self.assignments.segment_counts(experiment.id()).await?;
        Ok(self
            .bias
            .analyze(experiment, &results.variant_results, &segment_counts))
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    /// Resolve the (experiment, variant) pair a tracked event belongs to.
    ///
    /// Returns `None`, after a debug log, for every condition that makes
    /// the event untrackable.
    async fn tracking_target(
        &self,
        experiment_id: &str,
        user_id: &str,
    ) -> Option<(ExperimentId, VariantId)> {
        let Ok(experiment_id) = ExperimentId::new(experiment_id) else {
            debug!(experiment_id, "Invalid experiment ID, event dropped");
            return None;
        };

        let experiment = match self.experiments.get(&experiment_id).await {
            Ok(Some(experiment)) => experiment,
            Ok(None) => {
                debug!(experiment_id = %experiment_id, "Unknown experiment, event dropped");
                return None;
            }
            Err(error) => {
                debug!(experiment_id = %experiment_id, error = %error, "Store failure, event dropped");
                return None;
            }
        };

        if !experiment.status().is_running() {
            debug!(
                experiment_id = %experiment_id,
                status = %experiment.status(),
                "Experiment not running, event dropped"
            );
            return None;
        }

        match self.assignments.get(&experiment_id, user_id).await {
            Ok(Some(assignment)) => Some((experiment_id, assignment.variant_id().clone())),
            Ok(None) => {
                debug!(
                    experiment_id = %experiment_id,
                    user_id = %user_id,
                    "Participant not assigned, event dropped"
                );
                None
            }
            Err(error) => {
                debug!(experiment_id = %experiment_id, error = %error, "Store failure, event dropped");
                None
            }
        }
    }

    async fn get_experiment(&self, id: &ExperimentId) -> Result<Experiment, EngineError> {
        self.experiments
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Experiment '{}' not found", id)))
    }

    fn parse_id(&self, id: &str) -> Result<ExperimentId, EngineError> {
        ExperimentId::new(id).map_err(|violation| EngineError::invalid_id(violation.to_string()))
    }
}

/// Summarize the statistical readout into actionable guidance
fn statistical_recommendations(
    results: &ExperimentResult,
    analysis: &StatisticalAnalysis,
) -> Vec<String> {
    match analysis.strongest_comparison() {
        Some(best) => vec![format!(
            "Variant '{}' shows a significant {:.1}% lift over '{}' (p = {:.4})",
            best.treatment_variant_id,
            best.lift * 100.0,
            best.control_variant_id,
            best.p_value
        )],
        None => {
            let target = analysis.required_sample_size;
            let under_powered = results
                .variant_results
                .iter()
                .any(|result| result.participants < target);

            if under_powered {
                vec![format!(
                    "No significant difference yet; keep collecting until every arm reaches {} participants",
                    target
                )]
            } else {
                vec![
                    "No significant difference at the required sample size; the tested change \
                     likely has no effect of the configured magnitude"
                        .to_string(),
                ]
            }
        }
    }
}

/// Judge each neuroscience objective against the measured channel data.
///
/// The observed improvement is the best relative gain over the control
/// arm's mean; it stays unset until measurements exist on both sides.
fn neuroscience_outcomes(
    experiment: &Experiment,
    results: &ExperimentResult,
) -> NeuroscienceAnalysis {
    let control = results.control_result();

    let objectives = experiment
        .neuroscience_objectives()
        .iter()
        .map(|objective| {
            let control_mean = control
                .and_then(|result| result.neuroscience_metric(objective.metric_id()))
                .map(|snapshot| snapshot.mean());

            let observed_improvement = control_mean.and_then(|control_mean| {
                if control_mean == 0.0 {
                    return None;
                }
                results
                    .variant_results
                    .iter()
                    .skip(1)
                    .filter_map(|result| result.neuroscience_metric(objective.metric_id()))
                    .map(|snapshot| (snapshot.mean() - control_mean) / control_mean)
                    .max_by(|a, b| a.total_cmp(b))
            });

            let achieved = observed_improvement
                .map(|observed| observed >= objective.expected_improvement());

            ObjectiveOutcome {
                objective_id: objective.id().to_string(),
                objective_name: objective.name().to_string(),
                metric_id: objective.metric_id().to_string(),
                validation_method: objective.validation_method().to_string(),
                expected_improvement: objective.expected_improvement(),
                observed_improvement,
                achieved,
            }
        })
        .collect();

    NeuroscienceAnalysis { objectives }
}
