//! Streaming per-metric statistics

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::{ExperimentId, VariantId};

// ============================================================================
// MetricKey
// ============================================================================

/// Key isolating one metric accumulator: (experiment, variant, metric)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    experiment_id: ExperimentId,
    variant_id: VariantId,
    metric_id: String,
}

impl MetricKey {
    /// Create a new key
    pub fn new(
        experiment_id: ExperimentId,
        variant_id: VariantId,
        metric_id: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id,
            variant_id,
            metric_id: metric_id.into(),
        }
    }

    /// Get the experiment ID
    pub fn experiment_id(&self) -> &ExperimentId {
        &self.experiment_id
    }

    /// Get the variant ID
    pub fn variant_id(&self) -> &VariantId {
        &self.variant_id
    }

    /// Get the metric ID
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }
}

// ============================================================================
// MeasurementChannel
// ============================================================================

/// Namespace for externally supplied measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementChannel {
    Cultural,
    Neuroscience,
    Accessibility,
}

impl fmt::Display for MeasurementChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cultural => write!(f, "cultural"),
            Self::Neuroscience => write!(f, "neuroscience"),
            Self::Accessibility => write!(f, "accessibility"),
        }
    }
}

// ============================================================================
// MetricState
// ============================================================================

/// Running mean and variance for one metric, updated with Welford's online
/// algorithm. Holds no raw history; every update is O(1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricState {
    count: u64,
    mean: f64,
    m2: f64,
}

impl MetricState {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the accumulator
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, 0 when empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance, 0 when empty
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Freeze the accumulator into a named snapshot
    pub fn snapshot(&self, metric_id: impl Into<String>) -> MetricSnapshot {
        MetricSnapshot {
            metric_id: metric_id.into(),
            count: self.count,
            mean: self.mean,
            variance: self.variance(),
        }
    }
}

// ============================================================================
// MetricSnapshot
// ============================================================================

/// Point-in-time view of a [`MetricState`] as exposed in results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    metric_id: String,
    count: u64,
    mean: f64,
    variance: f64,
}

impl MetricSnapshot {
    /// Get the metric ID
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// Get the observation count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the mean
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Get the population variance
    pub fn variance(&self) -> f64 {
        self.variance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state() {
        let state = MetricState::new();
        assert_eq!(state.count(), 0);
        assert_eq!(state.mean(), 0.0);
        assert_eq!(state.variance(), 0.0);
    }

    #[test]
    fn test_single_observation() {
        let mut state = MetricState::new();
        state.update(42.0);
        assert_eq!(state.count(), 1);
        assert_eq!(state.mean(), 42.0);
        assert_eq!(state.variance(), 0.0);
    }

    #[test]
    fn test_identical_observations_have_zero_variance() {
        let mut state = MetricState::new();
        for _ in 0..100 {
            state.update(7.5);
        }
        assert_eq!(state.count(), 100);
        assert_eq!(state.mean(), 7.5);
        assert_eq!(state.variance(), 0.0);
    }

    #[test]
    fn test_known_sequence() {
        // Mean 5, population variance 4
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut state = MetricState::new();
        for v in values {
            state.update(v);
        }
        assert_eq!(state.count(), 8);
        assert!((state.mean() - 5.0).abs() < 1e-12);
        assert!((state.variance() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_numerical_stability_with_large_offset() {
        // Naive sum-of-squares would lose these small deviations next to
        // the 1e9 offset.
        let mut state = MetricState::new();
        for v in [1e9 + 4.0, 1e9 + 7.0, 1e9 + 13.0, 1e9 + 16.0] {
            state.update(v);
        }
        assert!((state.mean() - (1e9 + 10.0)).abs() < 1e-3);
        assert!((state.variance() - 22.5).abs() < 1e-3);
    }

    #[test]
    fn test_snapshot_carries_state() {
        let mut state = MetricState::new();
        state.update(1.0);
        state.update(3.0);

        let snapshot = state.snapshot("engagement");
        assert_eq!(snapshot.metric_id(), "engagement");
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.mean(), 2.0);
        assert_eq!(snapshot.variance(), 1.0);
    }
}
