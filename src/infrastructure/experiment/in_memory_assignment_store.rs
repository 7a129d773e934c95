//! In-memory implementation of the assignment store
//!
//! Backed by a sharded concurrent map, so assignment lookups during
//! high-volume traffic never contend on a single lock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::domain::experiment::{Assignment, AssignmentStore, ExperimentId, VariantId};
use crate::domain::EngineError;

/// In-memory assignment store implementation
#[derive(Debug, Default)]
pub struct InMemoryAssignmentStore {
    assignments: DashMap<(String, String), Assignment>,
}

impl InMemoryAssignmentStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn key(experiment_id: &ExperimentId, user_id: &str) -> (String, String) {
        (experiment_id.as_str().to_string(), user_id.to_string())
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn insert_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<(Assignment, bool), EngineError> {
        let key = Self::key(assignment.experiment_id(), assignment.user_id());

        // The entry holds its shard lock, so two racing calls for the same
        // user cannot both insert
        match self.assignments.entry(key) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                slot.insert(assignment.clone());
                Ok((assignment, true))
            }
        }
    }

    async fn get(
        &self,
        experiment_id: &ExperimentId,
        user_id: &str,
    ) -> Result<Option<Assignment>, EngineError> {
        let key = Self::key(experiment_id, user_id);
        Ok(self.assignments.get(&key).map(|entry| entry.value().clone()))
    }

    async fn variant_counts(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<HashMap<VariantId, u64>, EngineError> {
        let mut counts: HashMap<VariantId, u64> = HashMap::new();

        for entry in self.assignments.iter() {
            if entry.key().0 == experiment_id.as_str() {
                *counts.entry(entry.value().variant_id().clone()).or_default() += 1;
            }
        }

        Ok(counts)
    }

    async fn segment_counts(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<HashMap<String, u64>, EngineError> {
        let mut counts: HashMap<String, u64> = HashMap::new();

        for entry in self.assignments.iter() {
            if entry.key().0 == experiment_id.as_str() {
                if let Some(segment) = entry.value().cultural_segment() {
                    *counts.entry(segment.to_string()).or_default() += 1;
                }
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_assignment(experiment_id: &str, user_id: &str, variant_id: &str) -> Assignment {
        Assignment::new(
            ExperimentId::new(experiment_id).unwrap(),
            user_id,
            VariantId::new(variant_id).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryAssignmentStore::new();

        let (stored, inserted) = store
            .insert_if_absent(create_assignment("exp-1", "user-1", "control"))
            .await
            .unwrap();
        assert!(inserted);
        assert_eq!(stored.variant_id().as_str(), "control");

        let exp_id = ExperimentId::new("exp-1").unwrap();
        let fetched = store.get(&exp_id, "user-1").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().variant_id().as_str(), "control");

        let missing = store.get(&exp_id, "user-2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first() {
        let store = InMemoryAssignmentStore::new();

        store
            .insert_if_absent(create_assignment("exp-1", "user-1", "control"))
            .await
            .unwrap();

        let (stored, inserted) = store
            .insert_if_absent(create_assignment("exp-1", "user-1", "treatment"))
            .await
            .unwrap();

        assert!(!inserted);
        assert_eq!(stored.variant_id().as_str(), "control");
    }

    #[tokio::test]
    async fn test_same_user_across_experiments() {
        let store = InMemoryAssignmentStore::new();

        store
            .insert_if_absent(create_assignment("exp-1", "user-1", "control"))
            .await
            .unwrap();
        let (_, inserted) = store
            .insert_if_absent(create_assignment("exp-2", "user-1", "treatment"))
            .await
            .unwrap();

        assert!(inserted, "Assignments are scoped per experiment");
    }

    #[tokio::test]
    async fn test_counts() {
        let store = InMemoryAssignmentStore::new();

        for i in 0..10 {
            let variant = if i < 7 { "control" } else { "treatment" };
            let mut assignment = create_assignment("exp-1", &format!("user-{}", i), variant);
            if i < 4 {
                assignment = assignment.with_cultural_segment("east-asian");
            }
            store.insert_if_absent(assignment).await.unwrap();
        }

        // A second experiment must not leak into the counts
        store
            .insert_if_absent(create_assignment("exp-2", "user-1", "control"))
            .await
            .unwrap();

        let exp_id = ExperimentId::new("exp-1").unwrap();

        let variants = store.variant_counts(&exp_id).await.unwrap();
        assert_eq!(variants[&VariantId::new("control").unwrap()], 7);
        assert_eq!(variants[&VariantId::new("treatment").unwrap()], 3);

        let segments = store.segment_counts(&exp_id).await.unwrap();
        assert_eq!(segments["east-asian"], 4);

        assert_eq!(store.count(&exp_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let store = std::sync::Arc::new(InMemoryAssignmentStore::new());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let variant = if i % 2 == 0 { "control" } else { "treatment" };
            let assignment = create_assignment("exp-1", "user-1", variant);
            handles.push(tokio::spawn(async move {
                store.insert_if_absent(assignment).await.unwrap()
            }));
        }

        let mut inserted_count = 0;
        let mut variants = std::collections::HashSet::new();
        for handle in handles {
            let (assignment, inserted) = handle.await.unwrap();
            if inserted {
                inserted_count += 1;
            }
            variants.insert(assignment.variant_id().as_str().to_string());
        }

        // Exactly one insert wins and every caller sees the same variant
        assert_eq!(inserted_count, 1);
        assert_eq!(variants.len(), 1);
    }
}
