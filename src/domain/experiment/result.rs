//! Experiment result types for aggregates and statistical analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::ExperimentStatus;
use super::metrics::MetricSnapshot;

// ============================================================================
// VariantResult
// ============================================================================

/// Aggregated outcomes for one arm of an experiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantResult {
    /// Variant ID
    pub variant_id: String,
    /// Variant name
    pub variant_name: String,
    /// Number of participants assigned to this arm
    pub participants: u64,
    /// Primary-metric conversions
    pub conversions: u64,
    /// Conversion rate (0.0 - 1.0)
    pub conversion_rate: f64,
    /// Participants who dropped out before an outcome
    pub dropouts: u64,
    /// Dropout rate (0.0 - 1.0)
    pub dropout_rate: f64,
    /// Snapshots of every tracked metric
    pub metrics: Vec<MetricSnapshot>,
    /// Externally supplied cultural measurements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cultural_metrics: Vec<MetricSnapshot>,
    /// Externally supplied neuroscience measurements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neuroscience_metrics: Vec<MetricSnapshot>,
    /// Externally supplied accessibility measurements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accessibility_metrics: Vec<MetricSnapshot>,
}

impl VariantResult {
    /// Create an empty result for a variant
    pub fn new(variant_id: impl Into<String>, variant_name: impl Into<String>) -> Self {
        Self {
            variant_id: variant_id.into(),
            variant_name: variant_name.into(),
            ..Default::default()
        }
    }

    /// Set participation counts and derive the rates
    pub fn with_participation(mut self, participants: u64, conversions: u64, dropouts: u64) -> Self {
        self.participants = participants;
        self.conversions = conversions;
        self.dropouts = dropouts;
        if participants > 0 {
            self.conversion_rate = conversions as f64 / participants as f64;
            self.dropout_rate = dropouts as f64 / participants as f64;
        }
        self
    }

    /// Add a metric snapshot
    pub fn with_metric(mut self, snapshot: MetricSnapshot) -> Self {
        self.metrics.push(snapshot);
        self
    }

    /// Add an externally supplied cultural measurement
    pub fn with_cultural_metric(mut self, snapshot: MetricSnapshot) -> Self {
        self.cultural_metrics.push(snapshot);
        self
    }

    /// Add an externally supplied neuroscience measurement
    pub fn with_neuroscience_metric(mut self, snapshot: MetricSnapshot) -> Self {
        self.neuroscience_metrics.push(snapshot);
        self
    }

    /// Add an externally supplied accessibility measurement
    pub fn with_accessibility_metric(mut self, snapshot: MetricSnapshot) -> Self {
        self.accessibility_metrics.push(snapshot);
        self
    }

    /// Look up a tracked metric by ID
    pub fn metric(&self, metric_id: &str) -> Option<&MetricSnapshot> {
        self.metrics.iter().find(|m| m.metric_id() == metric_id)
    }

    /// Look up a neuroscience measurement by ID
    pub fn neuroscience_metric(&self, metric_id: &str) -> Option<&MetricSnapshot> {
        self.neuroscience_metrics
            .iter()
            .find(|m| m.metric_id() == metric_id)
    }
}

// ============================================================================
// ConfidenceInterval
// ============================================================================

/// A two-sided confidence interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Create a new interval
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Check whether a value lies inside the interval
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

// ============================================================================
// PairwiseComparison
// ============================================================================

/// Statistical comparison of one treatment arm against the control arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseComparison {
    /// ID of the control variant
    pub control_variant_id: String,
    /// ID of the treatment variant being compared
    pub treatment_variant_id: String,
    /// Conversion rate of the control arm
    pub control_rate: f64,
    /// Conversion rate of the treatment arm
    pub treatment_rate: f64,
    /// Relative lift of the treatment over the control
    pub lift: f64,
    /// Two-sided p-value of the rate difference
    pub p_value: f64,
    /// 95% confidence interval on the rate difference
    pub confidence_interval: ConfidenceInterval,
    /// Post-hoc power of the comparison at the current sample size
    pub observed_power: f64,
    /// Whether the difference is significant at the effective α
    pub is_significant: bool,
}

// ============================================================================
// StatisticalAnalysis
// ============================================================================

/// Full statistical readout of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalAnalysis {
    /// Configured significance level α
    pub significance_level: f64,
    /// α after multiple-testing correction
    pub effective_significance_level: f64,
    /// Sample size required per arm to power the experiment
    pub required_sample_size: u64,
    /// One comparison per non-control arm, in declared order
    pub comparisons: Vec<PairwiseComparison>,
}

impl StatisticalAnalysis {
    /// Check if any comparison is significant
    pub fn has_significant_result(&self) -> bool {
        self.comparisons.iter().any(|c| c.is_significant)
    }

    /// The significant comparison with the largest absolute lift, if any
    pub fn strongest_comparison(&self) -> Option<&PairwiseComparison> {
        self.comparisons
            .iter()
            .filter(|c| c.is_significant)
            .max_by(|a, b| a.lift.abs().total_cmp(&b.lift.abs()))
    }
}

// ============================================================================
// ExperimentResult
// ============================================================================

/// Complete aggregated results for an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// ID of the experiment
    pub experiment_id: String,
    /// Name of the experiment
    pub experiment_name: String,
    /// Current status of the experiment
    pub status: ExperimentStatus,
    /// Total participants across all arms
    pub total_participants: u64,
    /// Per-arm aggregates, in declared variant order
    pub variant_results: Vec<VariantResult>,
    /// When this snapshot was taken
    pub generated_at: DateTime<Utc>,
}

impl ExperimentResult {
    /// Create an empty result snapshot
    pub fn new(
        experiment_id: impl Into<String>,
        experiment_name: impl Into<String>,
        status: ExperimentStatus,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            experiment_name: experiment_name.into(),
            status,
            total_participants: 0,
            variant_results: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Add a per-arm result
    pub fn with_variant_result(mut self, result: VariantResult) -> Self {
        self.total_participants += result.participants;
        self.variant_results.push(result);
        self
    }

    /// Get the result for a specific arm
    pub fn variant_result(&self, variant_id: &str) -> Option<&VariantResult> {
        self.variant_results
            .iter()
            .find(|r| r.variant_id == variant_id)
    }

    /// The control arm, the first declared variant by convention
    pub fn control_result(&self) -> Option<&VariantResult> {
        self.variant_results.first()
    }
}

// ============================================================================
// CulturalAnalysis
// ============================================================================

/// Observed versus expected representation for one cultural segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRepresentation {
    /// Segment ID
    pub segment_id: String,
    /// Segment name
    pub segment_name: String,
    /// Share of the population the segment was expected to hold
    pub expected_share: f64,
    /// Share actually observed among assigned participants
    pub observed_share: f64,
    /// Assigned participants in the segment
    pub participants: u64,
    /// Whether the segment is materially under its expected share
    pub under_represented: bool,
}

/// Cultural readout of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CulturalAnalysis {
    /// Per-segment representation, in declared order
    pub representation: Vec<SegmentRepresentation>,
}

impl CulturalAnalysis {
    /// Segments currently under-represented
    pub fn under_represented(&self) -> impl Iterator<Item = &SegmentRepresentation> {
        self.representation.iter().filter(|s| s.under_represented)
    }
}

// ============================================================================
// NeuroscienceAnalysis
// ============================================================================

/// Outcome of one neuroscience objective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveOutcome {
    /// Objective ID
    pub objective_id: String,
    /// Objective name
    pub objective_name: String,
    /// Metric the objective is measured on
    pub metric_id: String,
    /// Declared validation method
    pub validation_method: String,
    /// Expected relative improvement
    pub expected_improvement: f64,
    /// Best observed relative improvement over the control arm, when
    /// measurements exist on both sides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_improvement: Option<f64>,
    /// Whether the observed improvement reached the expected one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achieved: Option<bool>,
}

/// Neuroscience readout of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuroscienceAnalysis {
    /// Per-objective outcomes, in declared order
    pub objectives: Vec<ObjectiveOutcome>,
}

// ============================================================================
// BiasReport
// ============================================================================

/// A category of systematic bias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasType {
    Selection,
    Cultural,
    Dropout,
}

impl fmt::Display for BiasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selection => write!(f, "selection"),
            Self::Cultural => write!(f, "cultural"),
            Self::Dropout => write!(f, "dropout"),
        }
    }
}

/// Findings of a bias inspection over aggregated results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiasReport {
    /// Whether any bias type was flagged
    pub bias_detected: bool,
    /// The flagged bias types
    pub bias_types: Vec<BiasType>,
    /// Combined severity in [0, 1]
    pub bias_score: f64,
    /// One or more actionable recommendations per flagged type
    pub recommendations: Vec<String>,
}

// ============================================================================
// ExperimentAnalysis
// ============================================================================

/// Everything `analyze` returns: aggregates, statistics, cultural and
/// neuroscience readouts, and merged recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    /// Aggregated per-arm results
    pub results: ExperimentResult,
    /// Statistical readout
    pub analysis: StatisticalAnalysis,
    /// Cultural readout, present when segments are configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cultural_analysis: Option<CulturalAnalysis>,
    /// Neuroscience readout, present when objectives are configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neuroscience_analysis: Option<NeuroscienceAnalysis>,
    /// Merged statistical and bias recommendations
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod variant_result_tests {
        use super::*;

        #[test]
        fn test_new_result() {
            let result = VariantResult::new("control", "Control Group");
            assert_eq!(result.variant_id, "control");
            assert_eq!(result.variant_name, "Control Group");
            assert_eq!(result.participants, 0);
            assert_eq!(result.conversion_rate, 0.0);
        }

        #[test]
        fn test_participation_derives_rates() {
            let result = VariantResult::new("control", "Control")
                .with_participation(200, 50, 10);
            assert_eq!(result.conversion_rate, 0.25);
            assert_eq!(result.dropout_rate, 0.05);
        }

        #[test]
        fn test_zero_participants_leaves_rates_zero() {
            let result = VariantResult::new("control", "Control").with_participation(0, 0, 0);
            assert_eq!(result.conversion_rate, 0.0);
            assert_eq!(result.dropout_rate, 0.0);
        }

        #[test]
        fn test_metric_lookup() {
            let mut state = crate::domain::experiment::metrics::MetricState::new();
            state.update(3.0);

            let result =
                VariantResult::new("control", "Control").with_metric(state.snapshot("engagement"));
            assert!(result.metric("engagement").is_some());
            assert!(result.metric("missing").is_none());
        }
    }

    mod experiment_result_tests {
        use super::*;

        #[test]
        fn test_totals_accumulate() {
            let result = ExperimentResult::new("exp-1", "Test", ExperimentStatus::Running)
                .with_variant_result(
                    VariantResult::new("control", "Control").with_participation(100, 10, 0),
                )
                .with_variant_result(
                    VariantResult::new("treatment", "Treatment").with_participation(110, 20, 0),
                );

            assert_eq!(result.total_participants, 210);
            assert_eq!(result.variant_results.len(), 2);
            assert_eq!(result.control_result().unwrap().variant_id, "control");
            assert!(result.variant_result("treatment").is_some());
        }
    }

    mod confidence_interval_tests {
        use super::*;

        #[test]
        fn test_contains() {
            let interval = ConfidenceInterval::new(-0.02, 0.06);
            assert!(interval.contains(0.0));
            assert!(interval.contains(0.06));
            assert!(!interval.contains(0.07));
        }
    }

    mod bias_report_tests {
        use super::*;

        #[test]
        fn test_default_report_is_clean() {
            let report = BiasReport::default();
            assert!(!report.bias_detected);
            assert!(report.bias_types.is_empty());
            assert_eq!(report.bias_score, 0.0);
        }

        #[test]
        fn test_bias_type_display() {
            assert_eq!(BiasType::Selection.to_string(), "selection");
            assert_eq!(BiasType::Cultural.to_string(), "cultural");
            assert_eq!(BiasType::Dropout.to_string(), "dropout");
        }
    }
}
