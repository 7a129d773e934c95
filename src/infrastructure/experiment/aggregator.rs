//! Concurrent metric aggregation
//!
//! Holds the running Welford state for every tracked metric. Updates
//! serialize per key through the map's shards, so two events for the
//! same metric never interleave while unrelated metrics proceed in
//! parallel.

use dashmap::DashMap;

use crate::domain::experiment::{
    ExperimentId, MeasurementChannel, MetricKey, MetricSnapshot, MetricState, VariantId,
};

/// Aggregated metric state for all experiments
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: DashMap<MetricKey, MetricState>,
    channel_metrics: DashMap<(MeasurementChannel, MetricKey), MetricState>,
    dropouts: DashMap<(ExperimentId, VariantId), u64>,
}

impl MetricsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome observation into the metric's running state
    pub fn record_value(&self, key: MetricKey, value: f64) {
        self.metrics.entry(key).or_default().update(value);
    }

    /// Fold one externally supplied measurement into a channel's state
    pub fn record_measurement(&self, channel: MeasurementChannel, key: MetricKey, value: f64) {
        self.channel_metrics
            .entry((channel, key))
            .or_default()
            .update(value);
    }

    /// Count a participant who left the experiment before an outcome
    pub fn record_dropout(&self, experiment_id: &ExperimentId, variant_id: &VariantId) {
        *self
            .dropouts
            .entry((experiment_id.clone(), variant_id.clone()))
            .or_insert(0) += 1;
    }

    /// Snapshot of a single metric, if any events arrived for it
    pub fn metric(&self, key: &MetricKey) -> Option<MetricSnapshot> {
        self.metrics
            .get(key)
            .map(|state| state.snapshot(key.metric_id()))
    }

    /// Number of events recorded for a metric
    pub fn event_count(&self, key: &MetricKey) -> u64 {
        self.metrics.get(key).map(|state| state.count()).unwrap_or(0)
    }

    /// Snapshots of every metric tracked for a variant, ordered by metric id
    pub fn metric_snapshots(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
    ) -> Vec<MetricSnapshot> {
        let mut snapshots: Vec<MetricSnapshot> = self
            .metrics
            .iter()
            .filter(|entry| {
                entry.key().experiment_id() == experiment_id
                    && entry.key().variant_id() == variant_id
            })
            .map(|entry| entry.value().snapshot(entry.key().metric_id()))
            .collect();

        snapshots.sort_by(|a, b| a.metric_id().cmp(b.metric_id()));
        snapshots
    }

    /// Snapshots of a variant's measurements on one channel, ordered by name
    pub fn channel_snapshots(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
        channel: MeasurementChannel,
    ) -> Vec<MetricSnapshot> {
        let mut snapshots: Vec<MetricSnapshot> = self
            .channel_metrics
            .iter()
            .filter(|entry| {
                entry.key().0 == channel
                    && entry.key().1.experiment_id() == experiment_id
                    && entry.key().1.variant_id() == variant_id
            })
            .map(|entry| entry.value().snapshot(entry.key().1.metric_id()))
            .collect();

        snapshots.sort_by(|a, b| a.metric_id().cmp(b.metric_id()));
        snapshots
    }

    /// Dropouts recorded for a variant
    pub fn dropout_count(&self, experiment_id: &ExperimentId, variant_id: &VariantId) -> u64 {
        self.dropouts
            .get(&(experiment_id.clone(), variant_id.clone()))
            .map(|count| *count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(metric_id: &str) -> MetricKey {
        MetricKey::new(
            ExperimentId::new("exp-1").unwrap(),
            VariantId::new("control").unwrap(),
            metric_id,
        )
    }

    #[test]
    fn test_record_value_accumulates() {
        let aggregator = MetricsAggregator::new();

        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            aggregator.record_value(key("conversion"), value);
        }

        let snapshot = aggregator.metric(&key("conversion")).unwrap();
        assert_eq!(snapshot.count(), 8);
        assert!((snapshot.mean() - 5.0).abs() < 1e-9);
        assert!((snapshot.variance() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_metric_is_none() {
        let aggregator = MetricsAggregator::new();
        assert!(aggregator.metric(&key("conversion")).is_none());
        assert_eq!(aggregator.event_count(&key("conversion")), 0);
    }

    #[test]
    fn test_metric_snapshots_are_scoped_and_ordered() {
        let aggregator = MetricsAggregator::new();
        aggregator.record_value(key("engagement"), 10.0);
        aggregator.record_value(key("conversion"), 1.0);

        // A different variant's metric must not appear
        let other = MetricKey::new(
            ExperimentId::new("exp-1").unwrap(),
            VariantId::new("treatment").unwrap(),
            "conversion",
        );
        aggregator.record_value(other, 1.0);

        let snapshots = aggregator.metric_snapshots(
            &ExperimentId::new("exp-1").unwrap(),
            &VariantId::new("control").unwrap(),
        );

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].metric_id(), "conversion");
        assert_eq!(snapshots[1].metric_id(), "engagement");
    }

    #[test]
    fn test_channel_metrics_are_namespaced() {
        let aggregator = MetricsAggregator::new();

        aggregator.record_measurement(MeasurementChannel::Cultural, key("resonance"), 0.8);
        aggregator.record_measurement(MeasurementChannel::Neuroscience, key("attention"), 0.6);
        // Same name on the plain channel must stay separate
        aggregator.record_value(key("resonance"), 100.0);

        let exp_id = ExperimentId::new("exp-1").unwrap();
        let variant_id = VariantId::new("control").unwrap();

        let cultural =
            aggregator.channel_snapshots(&exp_id, &variant_id, MeasurementChannel::Cultural);
        assert_eq!(cultural.len(), 1);
        assert_eq!(cultural[0].metric_id(), "resonance");
        assert!((cultural[0].mean() - 0.8).abs() < 1e-9);

        let neuroscience =
            aggregator.channel_snapshots(&exp_id, &variant_id, MeasurementChannel::Neuroscience);
        assert_eq!(neuroscience.len(), 1);

        let accessibility =
            aggregator.channel_snapshots(&exp_id, &variant_id, MeasurementChannel::Accessibility);
        assert!(accessibility.is_empty());
    }

    #[test]
    fn test_dropout_counts() {
        let aggregator = MetricsAggregator::new();
        let exp_id = ExperimentId::new("exp-1").unwrap();
        let control = VariantId::new("control").unwrap();
        let treatment = VariantId::new("treatment").unwrap();

        aggregator.record_dropout(&exp_id, &control);
        aggregator.record_dropout(&exp_id, &control);
        aggregator.record_dropout(&exp_id, &treatment);

        assert_eq!(aggregator.dropout_count(&exp_id, &control), 2);
        assert_eq!(aggregator.dropout_count(&exp_id, &treatment), 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_lossless() {
        let aggregator = std::sync::Arc::new(MetricsAggregator::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    aggregator.record_value(key("conversion"), 1.0);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = aggregator.metric(&key("conversion")).unwrap();
        assert_eq!(snapshot.count(), 2000);
        assert!((snapshot.mean() - 1.0).abs() < 1e-9);
        assert!(snapshot.variance().abs() < 1e-9);
    }
}
