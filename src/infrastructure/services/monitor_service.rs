//! Background experiment monitor
//!
//! Periodically sweeps every running experiment for breached guardrails,
//! expired schedules, and bias. Ticks can also be driven directly, which
//! keeps the checks deterministic under test.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::experiment::{
    AssignmentStore, Experiment, ExperimentQuery, ExperimentStatus, ExperimentStore,
    GuardrailAction, PauseReason, StopReason,
};
use crate::domain::{EngineError, ExperimentEvent};
use crate::infrastructure::events::EventChannel;
use crate::infrastructure::services::{MetricsService, RegistryService};

// ============================================================================
// MonitorHandle
// ============================================================================

/// Handle to a spawned monitor loop.
///
/// Dropping the handle also ends the loop after the current tick.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the loop and wait for the in-flight tick to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

// ============================================================================
// MonitorService
// ============================================================================

/// Service sweeping running experiments for unsafe conditions
#[derive(Debug)]
pub struct MonitorService<S: ExperimentStore, A: AssignmentStore> {
    registry: Arc<RegistryService<S>>,
    metrics: Arc<MetricsService<S, A>>,
    events: Arc<EventChannel>,
    interval: Duration,
}

impl<S: ExperimentStore, A: AssignmentStore> MonitorService<S, A> {
    /// Create a new monitor service
    pub fn new(
        registry: Arc<RegistryService<S>>,
        metrics: Arc<MetricsService<S, A>>,
        events: Arc<EventChannel>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            events,
            interval,
        }
    }

    /// Run one full monitoring sweep.
    ///
    /// A failing experiment is logged and skipped; it never blocks the
    /// checks for the others.
    pub async fn run_tick(&self) {
        let query = ExperimentQuery::new().with_status(ExperimentStatus::Running);

        let running = match self.registry.list(&query).await {
            Ok(running) => running,
            Err(error) => {
                warn!(error = %error, "Monitor could not list running experiments");
                return;
            }
        };

        for experiment in &running {
            if let Err(error) = self.inspect(experiment).await {
                warn!(
                    experiment_id = %experiment.id(),
                    error = %error,
                    "Monitor check failed"
                );
            }
        }
    }

    /// Check one experiment: guardrails first, then schedule, then bias.
    /// A lifecycle transition ends the inspection early.
    async fn inspect(&self, experiment: &Experiment) -> Result<(), EngineError> {
        if self.enforce_guardrails(experiment).await? {
            return Ok(());
        }

        if self.enforce_schedule(experiment).await? {
            return Ok(());
        }

        self.detect_bias(experiment).await
    }

    /// Evaluate every guardrail against the latest per-arm means.
    ///
    /// Returns whether a breach transitioned the experiment.
    async fn enforce_guardrails(&self, experiment: &Experiment) -> Result<bool, EngineError> {
        if experiment.guardrails().is_empty() {
            return Ok(false);
        }

        let results = self.metrics.results_for(experiment).await?;

        for guardrail in experiment.guardrails() {
            for variant in experiment.variants() {
                let Some(variant_result) = results.variant_result(variant.id().as_str()) else {
                    continue;
                };
                let Some(snapshot) = variant_result.metric(guardrail.metric_id()) else {
                    continue;
                };

                let observed = snapshot.mean();
                if !guardrail.is_breached(observed) {
                    continue;
                }

                warn!(
                    experiment_id = %experiment.id(),
                    variant_id = %variant.id(),
                    metric_id = %guardrail.metric_id(),
                    observed,
                    threshold = guardrail.threshold(),
                    action = %guardrail.action(),
                    "Guardrail breached"
                );

                self.events.publish(ExperimentEvent::GuardrailAlert {
                    experiment_id: experiment.id().clone(),
                    variant_id: variant.id().clone(),
                    metric_id: guardrail.metric_id().to_string(),
                    observed,
                    threshold: guardrail.threshold(),
                    action: guardrail.action(),
                });

                match guardrail.action() {
                    GuardrailAction::Alert => {}
                    GuardrailAction::Pause => {
                        self.registry
                            .pause_with_reason(
                                experiment.id(),
                                PauseReason::Guardrail {
                                    metric_id: guardrail.metric_id().to_string(),
                                },
                            )
                            .await?;
                        return Ok(true);
                    }
                    GuardrailAction::Stop => {
                        self.registry
                            .stop_with_reason(
                                experiment.id(),
                                StopReason::Guardrail {
                                    metric_id: guardrail.metric_id().to_string(),
                                },
                            )
                            .await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }

    /// Complete the experiment once its schedule has expired.
    ///
    /// Returns whether the experiment was completed.
    async fn enforce_schedule(&self, experiment: &Experiment) -> Result<bool, EngineError> {
        if !experiment
            .schedule()
            .is_expired(experiment.started_at(), Utc::now())
        {
            return Ok(false);
        }

        info!(experiment_id = %experiment.id(), "Schedule expired, completing experiment");
        self.registry
            .stop_with_reason(experiment.id(), StopReason::ScheduleExpired)
            .await?;
        Ok(true)
    }

    /// Emit a bias event when the detector flags anything
    async fn detect_bias(&self, experiment: &Experiment) -> Result<(), EngineError> {
        let report = self.metrics.bias_report(experiment).await?;

        if report.bias_detected {
            warn!(
                experiment_id = %experiment.id(),
                bias_score = report.bias_score,
                "Bias detected"
            );

            self.events.publish(ExperimentEvent::BiasDetected {
                experiment_id: experiment.id().clone(),
                bias_types: report.bias_types,
                bias_score: report.bias_score,
            });
        }

        Ok(())
    }
}

impl<S, A> MonitorService<S, A>
where
    S: ExperimentStore + 'static,
    A: AssignmentStore + 'static,
{
    /// Spawn the periodic monitoring loop
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            info!(
                interval_secs = self.interval.as_secs(),
                "Experiment monitor started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_tick().await,
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Experiment monitor stopped");
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}
