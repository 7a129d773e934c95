//! Infrastructure layer for the experimentation engine
//!
//! Deterministic assignment hashing, streaming metric aggregation,
//! statistical analysis, bias detection, and the in-memory store
//! implementations.

mod aggregator;
mod bias;
mod hashing;
mod in_memory_assignment_store;
mod in_memory_store;
pub mod statistics;

pub use aggregator::MetricsAggregator;
pub use bias::{BiasDetector, BiasThresholds};
pub use hashing::AssignmentHasher;
pub use in_memory_assignment_store::InMemoryAssignmentStore;
pub use in_memory_store::InMemoryExperimentStore;
