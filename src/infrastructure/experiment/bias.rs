//! Bias detection over aggregated experiment results
//!
//! Inspects participant distribution, cultural representation, and
//! per-arm dropout for the systematic skews that invalidate results.

use std::collections::HashMap;

use crate::domain::experiment::{
    BiasReport, BiasType, Experiment, SegmentRepresentation, VariantResult,
};

// ============================================================================
// BiasThresholds
// ============================================================================

/// Detection thresholds and the severity each finding contributes
#[derive(Debug, Clone)]
pub struct BiasThresholds {
    /// Tolerated relative deviation of an arm from the equal-share expectation
    pub selection_deviation: f64,
    /// Severity contributed by selection bias
    pub selection_severity: f64,
    /// Fraction of its expected share a segment may fall short before flagging
    pub under_representation: f64,
    /// Severity contributed by cultural bias
    pub cultural_severity: f64,
    /// Tolerated spread between the highest and lowest per-arm dropout rate
    pub dropout_spread: f64,
    /// Severity contributed by dropout bias
    pub dropout_severity: f64,
}

impl Default for BiasThresholds {
    fn default() -> Self {
        Self {
            selection_deviation: 0.20,
            selection_severity: 0.3,
            under_representation: 0.20,
            cultural_severity: 0.4,
            dropout_spread: 0.15,
            dropout_severity: 0.25,
        }
    }
}

// ============================================================================
// BiasDetector
// ============================================================================

/// Detector for selection, cultural, and dropout bias
#[derive(Debug, Clone, Default)]
pub struct BiasDetector {
    thresholds: BiasThresholds,
}

impl BiasDetector {
    /// Create a detector with the given thresholds
    pub fn new(thresholds: BiasThresholds) -> Self {
        Self { thresholds }
    }

    /// Inspect aggregated results for bias.
    ///
    /// The score sums the severities of the triggered bias types, capped
    /// at 1.0, and every triggered type contributes at least one
    /// recommendation.
    pub fn analyze(
        &self,
        experiment: &Experiment,
        results: &[VariantResult],
        segment_counts: &HashMap<String, u64>,
    ) -> BiasReport {
        let mut report = BiasReport::default();
        let mut score = 0.0;

        if self.check_selection(results, &mut report.recommendations) {
            report.bias_types.push(BiasType::Selection);
            score += self.thresholds.selection_severity;
        }

        if self.check_cultural(experiment, results, segment_counts, &mut report.recommendations) {
            report.bias_types.push(BiasType::Cultural);
            score += self.thresholds.cultural_severity;
        }

        if self.check_dropout(results, &mut report.recommendations) {
            report.bias_types.push(BiasType::Dropout);
            score += self.thresholds.dropout_severity;
        }

        report.bias_detected = !report.bias_types.is_empty();
        report.bias_score = score.min(1.0);
        report
    }

    /// Observed versus expected share for every declared cultural segment.
    ///
    /// With no participants yet there is no evidence either way, so no
    /// segment is marked under-represented.
    pub fn segment_representation(
        &self,
        experiment: &Experiment,
        segment_counts: &HashMap<String, u64>,
        total_participants: u64,
    ) -> Vec<SegmentRepresentation> {
        experiment
            .cultural_segments()
            .iter()
            .map(|segment| {
                let participants = segment_counts.get(segment.id()).copied().unwrap_or(0);
                let observed_share = if total_participants == 0 {
                    0.0
                } else {
                    participants as f64 / total_participants as f64
                };

                let floor = segment.expected_share() * (1.0 - self.thresholds.under_representation);
                let under_represented = total_participants > 0 && observed_share < floor;

                SegmentRepresentation {
                    segment_id: segment.id().to_string(),
                    segment_name: segment.name().to_string(),
                    expected_share: segment.expected_share(),
                    observed_share,
                    participants,
                    under_represented,
                }
            })
            .collect()
    }

    fn check_selection(&self, results: &[VariantResult], recommendations: &mut Vec<String>) -> bool {
        let total: u64 = results.iter().map(|r| r.participants).sum();

        if total == 0 || results.len() < 2 {
            return false;
        }

        let expected = total as f64 / results.len() as f64;
        let mut worst: Option<&VariantResult> = None;
        let mut worst_deviation = self.thresholds.selection_deviation;

        for result in results {
            let deviation = (result.participants as f64 - expected).abs() / expected;
            if deviation > worst_deviation {
                worst_deviation = deviation;
                worst = Some(result);
            }
        }

        match worst {
            Some(result) => {
                recommendations.push(format!(
                    "Variant '{}' holds {} of {} participants against an equal-share \
                     expectation of {:.0}. Review audience rules and traffic allocation \
                     before trusting comparisons",
                    result.variant_id, result.participants, total, expected
                ));
                true
            }
            None => false,
        }
    }

    fn check_cultural(
        &self,
        experiment: &Experiment,
        results: &[VariantResult],
        segment_counts: &HashMap<String, u64>,
        recommendations: &mut Vec<String>,
    ) -> bool {
        if experiment.cultural_segments().is_empty() {
            return false;
        }

        let total: u64 = results.iter().map(|r| r.participants).sum();
        let representation = self.segment_representation(experiment, segment_counts, total);
        let mut triggered = false;

        for segment in representation.iter().filter(|s| s.under_represented) {
            triggered = true;
            recommendations.push(format!(
                "Cultural segment '{}' holds {:.1}% of participants but {:.1}% was \
                 expected. Extend recruitment for this segment or rebalance targeting",
                segment.segment_name,
                segment.observed_share * 100.0,
                segment.expected_share * 100.0
            ));
        }

        triggered
    }

    fn check_dropout(&self, results: &[VariantResult], recommendations: &mut Vec<String>) -> bool {
        let rates: Vec<(&str, f64)> = results
            .iter()
            .filter(|r| r.participants > 0)
            .map(|r| (r.variant_id.as_str(), r.dropout_rate))
            .collect();

        if rates.len() < 2 {
            return false;
        }

        let (high_id, high) = rates
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or(rates[0]);
        let (low_id, low) = rates
            .iter()
            .copied()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or(rates[0]);

        if high - low <= self.thresholds.dropout_spread {
            return false;
        }

        recommendations.push(format!(
            "Dropout rate differs by {:.0} percentage points between '{}' ({:.0}%) and \
             '{}' ({:.0}%). Investigate the participant experience in the high-dropout arm",
            (high - low) * 100.0,
            high_id,
            high * 100.0,
            low_id,
            low * 100.0
        ));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        CulturalSegment, ExperimentId, TrafficAllocation, Variant, VariantId,
    };

    fn experiment_with_segments(segments: Vec<CulturalSegment>) -> Experiment {
        let control_id = VariantId::new("control").unwrap();
        let treatment_id = VariantId::new("treatment").unwrap();

        let mut experiment = Experiment::new(ExperimentId::new("bias-test").unwrap(), "Bias test")
            .with_variant(Variant::new(control_id.clone(), "Control"))
            .with_variant(Variant::new(treatment_id.clone(), "Treatment"))
            .with_traffic_allocation(TrafficAllocation::new(control_id, 50.0))
            .with_traffic_allocation(TrafficAllocation::new(treatment_id, 50.0));

        for segment in segments {
            experiment = experiment.with_cultural_segment(segment);
        }

        experiment
    }

    fn arm(variant_id: &str, participants: u64, dropouts: u64) -> VariantResult {
        VariantResult::new(variant_id, variant_id).with_participation(participants, 0, dropouts)
    }

    #[test]
    fn test_balanced_experiment_is_clean() {
        let experiment = experiment_with_segments(vec![]);
        let results = vec![arm("control", 500, 25), arm("treatment", 510, 30)];

        let report =
            BiasDetector::default().analyze(&experiment, &results, &HashMap::new());

        assert!(!report.bias_detected);
        assert!(report.bias_types.is_empty());
        assert_eq!(report.bias_score, 0.0);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_selection_bias_detected() {
        let experiment = experiment_with_segments(vec![]);
        // 700 vs 300 deviates 40% from the equal share of 500
        let results = vec![arm("control", 700, 0), arm("treatment", 300, 0)];

        let report =
            BiasDetector::default().analyze(&experiment, &results, &HashMap::new());

        assert!(report.bias_detected);
        assert_eq!(report.bias_types, vec![BiasType::Selection]);
        assert!((report.bias_score - 0.3).abs() < 1e-12);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("control"));
    }

    #[test]
    fn test_selection_bias_tolerates_small_deviation() {
        let experiment = experiment_with_segments(vec![]);
        // 550 vs 450 deviates only 10%
        let results = vec![arm("control", 550, 0), arm("treatment", 450, 0)];

        let report =
            BiasDetector::default().analyze(&experiment, &results, &HashMap::new());
        assert!(!report.bias_detected);
    }

    #[test]
    fn test_cultural_bias_detected() {
        let experiment = experiment_with_segments(vec![
            CulturalSegment::new("east-asian", "East Asian", 0.4),
            CulturalSegment::new("western", "Western", 0.6),
        ]);
        let results = vec![arm("control", 500, 0), arm("treatment", 500, 0)];

        // 10% observed against 40% expected
        let segment_counts =
            HashMap::from([("east-asian".to_string(), 100), ("western".to_string(), 900)]);

        let report = BiasDetector::default().analyze(&experiment, &results, &segment_counts);

        assert!(report.bias_detected);
        assert_eq!(report.bias_types, vec![BiasType::Cultural]);
        assert!((report.bias_score - 0.4).abs() < 1e-12);
        assert!(report.recommendations[0].contains("East Asian"));
    }

    #[test]
    fn test_cultural_bias_skipped_without_segments() {
        let experiment = experiment_with_segments(vec![]);
        let results = vec![arm("control", 500, 0), arm("treatment", 500, 0)];

        // Stray counts without declared segments must not trigger anything
        let segment_counts = HashMap::from([("east-asian".to_string(), 10)]);

        let report = BiasDetector::default().analyze(&experiment, &results, &segment_counts);
        assert!(!report.bias_detected);
    }

    #[test]
    fn test_cultural_representation_with_no_participants() {
        let experiment = experiment_with_segments(vec![CulturalSegment::new(
            "east-asian",
            "East Asian",
            0.4,
        )]);

        let representation =
            BiasDetector::default().segment_representation(&experiment, &HashMap::new(), 0);

        assert_eq!(representation.len(), 1);
        assert_eq!(representation[0].observed_share, 0.0);
        assert!(!representation[0].under_represented);
    }

    #[test]
    fn test_dropout_bias_detected() {
        let experiment = experiment_with_segments(vec![]);
        // 40% vs 5% dropout is a 35-point spread
        let results = vec![arm("control", 500, 25), arm("treatment", 500, 200)];

        let report =
            BiasDetector::default().analyze(&experiment, &results, &HashMap::new());

        assert!(report.bias_detected);
        assert_eq!(report.bias_types, vec![BiasType::Dropout]);
        assert!((report.bias_score - 0.25).abs() < 1e-12);
        assert!(report.recommendations[0].contains("treatment"));
    }

    #[test]
    fn test_all_bias_types_sum_and_cap() {
        let experiment = experiment_with_segments(vec![CulturalSegment::new(
            "east-asian",
            "East Asian",
            0.5,
        )]);
        // Skewed arms, missing segment, and a wide dropout spread at once
        let results = vec![arm("control", 800, 400), arm("treatment", 200, 2)];
        let segment_counts = HashMap::from([("east-asian".to_string(), 50)]);

        let report = BiasDetector::default().analyze(&experiment, &results, &segment_counts);

        assert_eq!(
            report.bias_types,
            vec![BiasType::Selection, BiasType::Cultural, BiasType::Dropout]
        );
        assert!((report.bias_score - 0.95).abs() < 1e-12);
        assert!(report.bias_score <= 1.0);
        assert!(report.recommendations.len() >= 3);
    }

    #[test]
    fn test_empty_results_are_clean() {
        let experiment = experiment_with_segments(vec![]);
        let report = BiasDetector::default().analyze(&experiment, &[], &HashMap::new());

        assert!(!report.bias_detected);
        assert_eq!(report.bias_score, 0.0);
    }
}
