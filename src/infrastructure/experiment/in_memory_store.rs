//! In-memory implementation of the experiment store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::experiment::{
    Experiment, ExperimentId, ExperimentQuery, ExperimentStore, StatusTransition,
};
use crate::domain::EngineError;

/// In-memory experiment store implementation
#[derive(Debug)]
pub struct InMemoryExperimentStore {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl InMemoryExperimentStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            experiments: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store with initial experiments
    pub fn with_experiments(experiments: Vec<Experiment>) -> Self {
        let map = experiments
            .into_iter()
            .map(|experiment| (experiment.id().as_str().to_string(), experiment))
            .collect();
        Self {
            experiments: RwLock::new(map),
        }
    }
}

impl Default for InMemoryExperimentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn insert(&self, experiment: Experiment) -> Result<Experiment, EngineError> {
        let id = experiment.id().as_str().to_string();
        let mut experiments = self
            .experiments
            .write()
            .map_err(|e| EngineError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if experiments.contains_key(&id) {
            return Err(EngineError::conflict(format!(
                "Experiment '{}' already exists",
                id
            )));
        }

        experiments.insert(id, experiment.clone());
        Ok(experiment)
    }

    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, EngineError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| EngineError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(experiments.get(id.as_str()).cloned())
    }

    async fn update(&self, experiment: Experiment) -> Result<Experiment, EngineError> {
        let id = experiment.id().as_str().to_string();
        let mut experiments = self
            .experiments
            .write()
            .map_err(|e| EngineError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if !experiments.contains_key(&id) {
            return Err(EngineError::not_found(format!(
                "Experiment '{}' not found",
                id
            )));
        }

        experiments.insert(id, experiment.clone());
        Ok(experiment)
    }

    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, EngineError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| EngineError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut results: Vec<_> = experiments
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        // Sort by created_at descending
        results.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        // Apply pagination
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(results.into_iter().skip(offset).take(limit).collect())
    }

    async fn apply_transition(
        &self,
        id: &ExperimentId,
        transition: StatusTransition,
    ) -> Result<Experiment, EngineError> {
        // Load, transition, and persist under one write lock so racing
        // callers observe a consistent status
        let mut experiments = self
            .experiments
            .write()
            .map_err(|e| EngineError::internal(format!("Failed to acquire write lock: {}", e)))?;

        let experiment = experiments
            .get_mut(id.as_str())
            .ok_or_else(|| EngineError::not_found(format!("Experiment '{}' not found", id)))?;

        transition.apply_to(experiment)?;
        Ok(experiment.clone())
    }

    async fn exists(&self, id: &ExperimentId) -> Result<bool, EngineError> {
        let experiments = self
            .experiments
            .read()
            .map_err(|e| EngineError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(experiments.contains_key(id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{ExperimentStatus, TrafficAllocation, Variant, VariantId};

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

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryExperimentStore::new();

        let created = store.insert(create_test_experiment("test-1")).await.unwrap();
        assert_eq!(created.id().as_str(), "test-1");

        let exp_id = ExperimentId::new("test-1").unwrap();
        let fetched = store.get(&exp_id).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().name(), "Experiment test-1");
    }

    #[tokio::test]
    async fn test_insert_duplicate() {
        let store = InMemoryExperimentStore::new();
        store.insert(create_test_experiment("test-1")).await.unwrap();

        let result = store.insert(create_test_experiment("test-1")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let store = InMemoryExperimentStore::new();

        let result = store.update(create_test_experiment("test-1")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_list_with_pagination() {
        let store = InMemoryExperimentStore::new();

        for i in 1..=10 {
            store
                .insert(create_test_experiment(&format!("exp-{}", i)))
                .await
                .unwrap();
        }

        let page1 = store
            .list(&ExperimentQuery::new().with_limit(3))
            .await
            .unwrap();
        assert_eq!(page1.len(), 3);

        let page2 = store
            .list(&ExperimentQuery::new().with_offset(3).with_limit(3))
            .await
            .unwrap();
        assert_eq!(page2.len(), 3);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = InMemoryExperimentStore::new();

        store.insert(create_test_experiment("draft-1")).await.unwrap();

        let mut running = create_test_experiment("running-1");
        running.start(100).unwrap();
        store.insert(running).await.unwrap();

        let drafts = store
            .list(&ExperimentQuery::new().with_status(ExperimentStatus::Draft))
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id().as_str(), "draft-1");

        let active = store
            .list(&ExperimentQuery::new().with_status(ExperimentStatus::Running))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id().as_str(), "running-1");
    }

    #[tokio::test]
    async fn test_transition_lifecycle() {
        let store = InMemoryExperimentStore::new();
        store.insert(create_test_experiment("test-1")).await.unwrap();

        let exp_id = ExperimentId::new("test-1").unwrap();

        let started = store
            .apply_transition(
                &exp_id,
                StatusTransition::Start {
                    required_sample_size: 200,
                },
            )
            .await
            .unwrap();
        assert_eq!(started.status(), ExperimentStatus::Running);
        assert!(started.started_at().is_some());

        let paused = store
            .apply_transition(&exp_id, StatusTransition::Pause)
            .await
            .unwrap();
        assert_eq!(paused.status(), ExperimentStatus::Paused);

        let resumed = store
            .apply_transition(&exp_id, StatusTransition::Resume)
            .await
            .unwrap();
        assert_eq!(resumed.status(), ExperimentStatus::Running);

        let completed = store
            .apply_transition(&exp_id, StatusTransition::Complete)
            .await
            .unwrap();
        assert_eq!(completed.status(), ExperimentStatus::Completed);
        assert!(completed.completed_at().is_some());
    }

    #[tokio::test]
    async fn test_transition_from_terminal_fails() {
        let store = InMemoryExperimentStore::new();
        store.insert(create_test_experiment("test-1")).await.unwrap();

        let exp_id = ExperimentId::new("test-1").unwrap();
        store
            .apply_transition(
                &exp_id,
                StatusTransition::Start {
                    required_sample_size: 100,
                },
            )
            .await
            .unwrap();
        store
            .apply_transition(&exp_id, StatusTransition::Complete)
            .await
            .unwrap();

        let result = store
            .apply_transition(&exp_id, StatusTransition::Resume)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));

        // Status must be unchanged after the failed transition
        let current = store.get(&exp_id).await.unwrap().unwrap();
        assert_eq!(current.status(), ExperimentStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_transitions_single_winner() {
        let store = std::sync::Arc::new(InMemoryExperimentStore::new());
        store.insert(create_test_experiment("race-1")).await.unwrap();

        let exp_id = ExperimentId::new("race-1").unwrap();
        store
            .apply_transition(
                &exp_id,
                StatusTransition::Start {
                    required_sample_size: 100,
                },
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let exp_id = exp_id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_transition(&exp_id, StatusTransition::Complete)
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_with_experiments() {
        let store = InMemoryExperimentStore::with_experiments(vec![
            create_test_experiment("exp-1"),
            create_test_experiment("exp-2"),
        ]);

        let all = store.list(&ExperimentQuery::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
