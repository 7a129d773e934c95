//! Variant assignment service
//!
//! Maps (experiment, participant) to a variant deterministically and
//! exactly once. Eligibility filtering and the hash walk are pure; the
//! store's insert-if-absent makes the persisted assignment the single
//! source of truth under concurrent calls.

use std::sync::Arc;

use tracing::debug;

use crate::domain::experiment::{
    Assignment, AssignmentStore, Experiment, ExperimentId, ExperimentStore, ParticipantContext,
    VariantId,
};
use crate::domain::{EngineError, ExperimentEvent};
use crate::infrastructure::events::EventChannel;
use crate::infrastructure::experiment::AssignmentHasher;

/// Service assigning participants to variants
#[derive(Debug)]
pub struct AssignmentService<S: ExperimentStore, A: AssignmentStore> {
    experiments: Arc<S>,
    assignments: Arc<A>,
    events: Arc<EventChannel>,
}

impl<S: ExperimentStore, A: AssignmentStore> AssignmentService<S, A> {
    /// Create a new assignment service
    pub fn new(experiments: Arc<S>, assignments: Arc<A>, events: Arc<EventChannel>) -> Self {
        Self {
            experiments,
            assignments,
            events,
        }
    }

    /// Assign a participant to a variant.
    ///
    /// Returns the already-stored variant when the participant was assigned
    /// before, whatever the experiment's current status. Otherwise the
    /// participant must pass audience, cultural and accessibility
    /// eligibility on a running experiment; the deterministic hash walk
    /// then picks the arm, and exactly one concurrent call persists it.
    /// `user_assigned` is emitted only by the call that created the record.
    pub async fn assign(
        &self,
        experiment_id: &str,
        user_id: &str,
        context: &ParticipantContext,
    ) -> Result<Option<VariantId>, EngineError> {
        let experiment_id = self.parse_id(experiment_id)?;

        if let Some(existing) = self.assignments.get(&experiment_id, user_id).await? {
            return Ok(Some(existing.variant_id().clone()));
        }

        let Some(experiment) = self.experiments.get(&experiment_id).await? else {
            debug!(experiment_id = %experiment_id, "Unknown experiment, no assignment");
            return Ok(None);
        };

        if !experiment.status().is_running() {
            debug!(
                experiment_id = %experiment_id,
                status = %experiment.status(),
                "Experiment not running, no assignment"
            );
            return Ok(None);
        }

        if !passes_audience_rules(&experiment, context) {
            debug!(
                experiment_id = %experiment_id,
                user_id = %user_id,
                "Participant filtered by audience rules"
            );
            return Ok(None);
        }

        let mut segment_id = None;

        if !experiment.cultural_segments().is_empty() {
            match experiment.matching_segment(context.cultural_background()) {
                Some(segment) => segment_id = Some(segment.id().to_string()),
                None => {
                    debug!(
                        experiment_id = %experiment_id,
                        user_id = %user_id,
                        "Participant matches no cultural segment"
                    );
                    return Ok(None);
                }
            }
        }

        if !experiment.accessibility_matches(&context.accessibility_needs()) {
            debug!(
                experiment_id = %experiment_id,
                user_id = %user_id,
                "Participant's accessibility needs are not covered"
            );
            return Ok(None);
        }

        let Some(variant_id) = pick_variant(&experiment, user_id, context) else {
            return Ok(None);
        };

        let mut assignment = Assignment::new(experiment_id.clone(), user_id, variant_id);

        if let Some(segment_id) = segment_id {
            assignment = assignment.with_cultural_segment(segment_id);
        }

        let (stored, inserted) = self.assignments.insert_if_absent(assignment).await?;

        if inserted {
            debug!(
                experiment_id = %experiment_id,
                user_id = %user_id,
                variant_id = %stored.variant_id(),
                "Participant assigned"
            );

            self.events.publish(ExperimentEvent::UserAssigned {
                experiment_id,
                user_id: user_id.to_string(),
                variant_id: stored.variant_id().clone(),
            });
        }

        Ok(Some(stored.variant_id().clone()))
    }

    /// Get the stored assignment for a participant
    pub async fn get(
        &self,
        experiment_id: &str,
        user_id: &str,
    ) -> Result<Option<Assignment>, EngineError> {
        let experiment_id = self.parse_id(experiment_id)?;
        self.assignments.get(&experiment_id, user_id).await
    }

    fn parse_id(&self, id: &str) -> Result<ExperimentId, EngineError> {
        ExperimentId::new(id).map_err(|violation| EngineError::invalid_id(violation.to_string()))
    }
}

/// Include rules must all match; exclude rules must all miss
fn passes_audience_rules(experiment: &Experiment, context: &ParticipantContext) -> bool {
    let included = experiment
        .include_rules()
        .iter()
        .all(|rule| rule.matches_value(context.get(rule.field())));

    let excluded = experiment
        .exclude_rules()
        .iter()
        .any(|rule| rule.matches_value(context.get(rule.field())));

    included && !excluded
}

/// Hash the participant into the cumulative allocation walk.
///
/// Allocations whose conditions fail still advance the walk; a rounding
/// shortfall at the top end falls back to the first declared variant.
fn pick_variant(
    experiment: &Experiment,
    user_id: &str,
    context: &ParticipantContext,
) -> Option<VariantId> {
    let percent = AssignmentHasher::percent(user_id, experiment.id().as_str());

    experiment
        .allocation_for_percent(percent, |allocation| {
            allocation
                .conditions()
                .iter()
                .all(|rule| rule.matches_value(context.get(rule.field())))
        })
        .cloned()
        .or_else(|| experiment.first_variant().map(|variant| variant.id().clone()))
}
