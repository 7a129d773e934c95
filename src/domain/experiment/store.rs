//! Storage traits for experiments and assignments

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;

use super::assignment::Assignment;
use super::entity::{Experiment, ExperimentId, ExperimentStatus, ExperimentType, VariantId};
use crate::domain::EngineError;

// ============================================================================
// ExperimentQuery
// ============================================================================

/// Query parameters for listing experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    /// Filter by status
    pub status: Option<ExperimentStatus>,
    /// Filter by experiment type
    pub experiment_type: Option<ExperimentType>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
}

impl ExperimentQuery {
    /// Create a new query with no filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by status
    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by experiment type
    pub fn with_experiment_type(mut self, experiment_type: ExperimentType) -> Self {
        self.experiment_type = Some(experiment_type);
        self
    }

    /// Set maximum number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set number of results to skip
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check whether an experiment passes the query filters
    pub fn matches(&self, experiment: &Experiment) -> bool {
        if let Some(status) = self.status {
            if experiment.status() != status {
                return false;
            }
        }

        if let Some(experiment_type) = self.experiment_type {
            if experiment.experiment_type() != experiment_type {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// StatusTransition
// ============================================================================

/// A lifecycle transition applied atomically through the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusTransition {
    /// Draft -> Running
    Start { required_sample_size: u64 },
    /// Running -> Paused
    Pause,
    /// Paused -> Running
    Resume,
    /// Running -> Completed
    Complete,
    /// Running | Paused -> Cancelled
    Cancel,
}

impl StatusTransition {
    /// The status this transition leads to
    pub fn target(&self) -> ExperimentStatus {
        match self {
            Self::Start { .. } => ExperimentStatus::Running,
            Self::Pause => ExperimentStatus::Paused,
            Self::Resume => ExperimentStatus::Running,
            Self::Complete => ExperimentStatus::Completed,
            Self::Cancel => ExperimentStatus::Cancelled,
        }
    }

    /// Apply the transition to an experiment in place
    pub fn apply_to(&self, experiment: &mut Experiment) -> Result<(), EngineError> {
        match self {
            Self::Start {
                required_sample_size,
            } => experiment.start(*required_sample_size)?,
            Self::Pause => experiment.pause()?,
            Self::Resume => experiment.resume()?,
            Self::Complete => experiment.complete()?,
            Self::Cancel => experiment.cancel()?,
        }
        Ok(())
    }
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { .. } => write!(f, "start"),
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Complete => write!(f, "complete"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

// ============================================================================
// ExperimentStore
// ============================================================================

/// Storage trait for experiment definitions
#[async_trait]
pub trait ExperimentStore: Send + Sync + Debug {
    /// Insert a new experiment
    async fn insert(&self, experiment: Experiment) -> Result<Experiment, EngineError>;

    /// Get an experiment by ID
    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, EngineError>;

    /// Replace an existing experiment
    async fn update(&self, experiment: Experiment) -> Result<Experiment, EngineError>;

    /// List experiments with optional filters, newest first
    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, EngineError>;

    /// Apply a lifecycle transition atomically.
    ///
    /// Implementations must load, transition, and persist under a single
    /// critical section so that concurrent transition attempts observe a
    /// consistent status and exactly one of two racing calls wins.
    async fn apply_transition(
        &self,
        id: &ExperimentId,
        transition: StatusTransition,
    ) -> Result<Experiment, EngineError>;

    /// Check if an experiment exists
    async fn exists(&self, id: &ExperimentId) -> Result<bool, EngineError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Count experiments matching the query
    async fn count(&self, query: &ExperimentQuery) -> Result<usize, EngineError> {
        Ok(self.list(query).await?.len())
    }
}

// ============================================================================
// AssignmentStore
// ============================================================================

/// Storage trait for user-to-variant assignments
#[async_trait]
pub trait AssignmentStore: Send + Sync + Debug {
    /// Insert an assignment unless the user already has one.
    ///
    /// Returns the stored assignment and whether this call inserted it.
    /// When the user was already assigned, the existing assignment is
    /// returned unchanged and the flag is false.
    async fn insert_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<(Assignment, bool), EngineError>;

    /// Get the assignment for a user in an experiment
    async fn get(
        &self,
        experiment_id: &ExperimentId,
        user_id: &str,
    ) -> Result<Option<Assignment>, EngineError>;

    /// Count assignments per variant for an experiment
    async fn variant_counts(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<HashMap<VariantId, u64>, EngineError>;

    /// Count assignments per cultural segment for an experiment
    async fn segment_counts(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<HashMap<String, u64>, EngineError>;

    /// Total assignments for an experiment
    async fn count(&self, experiment_id: &ExperimentId) -> Result<u64, EngineError> {
        Ok(self.variant_counts(experiment_id).await?.values().sum())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use crate::domain::experiment::{TrafficAllocation, Variant};

    fn create_test_experiment(id: &str) -> Experiment {
        let exp_id = ExperimentId::new(id).unwrap();
        let control_id = VariantId::new("control").unwrap();
        let treatment_id = VariantId::new("treatment").unwrap();

        Experiment::new(exp_id, format!("Experiment {}", id))
            .with_variant(Variant::new(control_id.clone(), "Control"))
            .with_variant(Variant::new(treatment_id.clone(), "Treatment"))
            .with_traffic_allocation(TrafficAllocation::new(control_id, 50.0))
            .with_traffic_allocation(TrafficAllocation::new(treatment_id, 50.0))
    }

    fn create_assignment(experiment_id: &str, user_id: &str, variant_id: &str) -> Assignment {
        Assignment::new(
            ExperimentId::new(experiment_id).unwrap(),
            user_id,
            VariantId::new(variant_id).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_mock_experiment_store_crud() {
        let store = MockExperimentStore::new();

        let created = store.insert(create_test_experiment("test-1")).await.unwrap();
        assert_eq!(created.id().as_str(), "test-1");

        let exp_id = ExperimentId::new("test-1").unwrap();
        let fetched = store.get(&exp_id).await.unwrap();
        assert!(fetched.is_some());

        assert!(store.exists(&exp_id).await.unwrap());

        let duplicate = store.insert(create_test_experiment("test-1")).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_mock_experiment_store_list() {
        let store = MockExperimentStore::new();

        for i in 1..=5 {
            store
                .insert(create_test_experiment(&format!("exp-{}", i)))
                .await
                .unwrap();
        }

        let all = store.list(&ExperimentQuery::new()).await.unwrap();
        assert_eq!(all.len(), 5);

        let limited = store
            .list(&ExperimentQuery::new().with_limit(3))
            .await
            .unwrap();
        assert_eq!(limited.len(), 3);

        let running = store
            .list(&ExperimentQuery::new().with_status(ExperimentStatus::Running))
            .await
            .unwrap();
        assert!(running.is_empty());
    }

    #[tokio::test]
    async fn test_mock_experiment_store_transition() {
        let store = MockExperimentStore::new();
        store.insert(create_test_experiment("test-1")).await.unwrap();

        let exp_id = ExperimentId::new("test-1").unwrap();
        let started = store
            .apply_transition(
                &exp_id,
                StatusTransition::Start {
                    required_sample_size: 100,
                },
            )
            .await
            .unwrap();
        assert_eq!(started.status(), ExperimentStatus::Running);
        assert_eq!(started.required_sample_size(), Some(100));

        // A second start must fail and leave the status untouched
        let again = store
            .apply_transition(
                &exp_id,
                StatusTransition::Start {
                    required_sample_size: 100,
                },
            )
            .await;
        assert!(matches!(
            again,
            Err(EngineError::InvalidTransition { .. })
        ));

        let current = store.get(&exp_id).await.unwrap().unwrap();
        assert_eq!(current.status(), ExperimentStatus::Running);
    }

    #[tokio::test]
    async fn test_mock_experiment_store_failure() {
        let store = MockExperimentStore::new().with_error();
        let result = store.insert(create_test_experiment("test-1")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_assignment_store_insert_if_absent() {
        let store = MockAssignmentStore::new();

        let (first, inserted) = store
            .insert_if_absent(create_assignment("exp-1", "user-1", "control"))
            .await
            .unwrap();
        assert!(inserted);
        assert_eq!(first.variant_id().as_str(), "control");

        // Second insert for the same user returns the original
        let (second, inserted) = store
            .insert_if_absent(create_assignment("exp-1", "user-1", "treatment"))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(second.variant_id().as_str(), "control");
    }

    #[tokio::test]
    async fn test_mock_assignment_store_counts() {
        let store = MockAssignmentStore::new();

        for i in 0..6 {
            let variant = if i < 4 { "control" } else { "treatment" };
            let assignment = create_assignment("exp-1", &format!("user-{}", i), variant)
                .with_cultural_segment(if i % 2 == 0 { "east-asian" } else { "western" });
            store.insert_if_absent(assignment).await.unwrap();
        }

        let exp_id = ExperimentId::new("exp-1").unwrap();
        let counts = store.variant_counts(&exp_id).await.unwrap();
        assert_eq!(counts[&VariantId::new("control").unwrap()], 4);
        assert_eq!(counts[&VariantId::new("treatment").unwrap()], 2);

        let segments = store.segment_counts(&exp_id).await.unwrap();
        assert_eq!(segments["east-asian"], 3);
        assert_eq!(segments["western"], 3);

        assert_eq!(store.count(&exp_id).await.unwrap(), 6);
    }

    #[test]
    fn test_transition_targets() {
        assert_eq!(
            StatusTransition::Start {
                required_sample_size: 10
            }
            .target(),
            ExperimentStatus::Running
        );
        assert_eq!(StatusTransition::Pause.target(), ExperimentStatus::Paused);
        assert_eq!(StatusTransition::Cancel.target(), ExperimentStatus::Cancelled);
        assert_eq!(StatusTransition::Complete.to_string(), "complete");
    }
}
