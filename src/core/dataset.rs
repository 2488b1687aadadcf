//! Joining labels and features into training records.

use crate::core::features::FeatureVector;
use crate::core::labels::LabeledReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One row of the training table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub machine_id: u32,
    pub timestamp: DateTime<Utc>,
    /// Values in [`FeatureSchema`](crate::core::FeatureSchema) order
    pub features: Vec<f64>,
    pub label: bool,
}

/// Rows dropped while assembling one machine, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusions {
    /// At least one window reached before the start of the reading's segment
    pub insufficient_history: usize,
    /// The label horizon ran into a gap
    pub undefined_label: usize,
    /// A row for the same `(machine_id, timestamp)` was already emitted
    #[serde(default)]
    pub duplicate_key: usize,
}

impl Exclusions {
    pub fn total(&self) -> usize {
        self.insufficient_history + self.undefined_label + self.duplicate_key
    }

    pub fn add(&mut self, other: &Exclusions) {
        self.insufficient_history += other.insufficient_history;
        self.undefined_label += other.undefined_label;
        self.duplicate_key += other.duplicate_key;
    }
}

/// Assembled rows of a single machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineAssembly {
    pub records: Vec<TrainingRecord>,
    pub exclusions: Exclusions,
}

/// Inner-join labels and features of one machine on `(machine_id, timestamp)`.
///
/// Both inputs are ordered by timestamp. The first pair at a key decides
/// that key; later pairs with the same key are counted as duplicates. Rows
/// with any invalid window or an undefined label are counted and dropped.
pub fn assemble_machine(
    labels: &[LabeledReading<'_>],
    features: &[FeatureVector],
) -> MachineAssembly {
    let mut assembly = MachineAssembly::default();
    let mut l = 0;
    let mut f = 0;
    let mut last_key = None;

    while l < labels.len() && f < features.len() {
        let label = &labels[l];
        let vector = &features[f];
        let left = (label.reading.machine_id, label.reading.timestamp);
        let right = (vector.machine_id, vector.timestamp);

        match left.cmp(&right) {
            Ordering::Less => l += 1,
            Ordering::Greater => f += 1,
            Ordering::Equal => {
                l += 1;
                f += 1;

                if last_key == Some(left) {
                    assembly.exclusions.duplicate_key += 1;
                    continue;
                }
                last_key = Some(left);

                let Some(values) = vector.values() else {
                    assembly.exclusions.insufficient_history += 1;
                    continue;
                };
                let Some(flag) = label.fail_within_horizon else {
                    assembly.exclusions.undefined_label += 1;
                    continue;
                };

                assembly.records.push(TrainingRecord {
                    machine_id: vector.machine_id,
                    timestamp: vector.timestamp,
                    features: values,
                    label: flag,
                });
            }
        }
    }

    assembly
}

/// Count positive records.
pub fn count_positives(records: &[TrainingRecord]) -> usize {
    records.iter().filter(|r| r.label).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::core::events::detect_events;
    use crate::core::features::{extract_features, FeatureSchema};
    use crate::core::labels::label_readings;
    use crate::core::series::Segments;
    use crate::core::test_support::{interval, series_at, series_with_health};
    use std::time::Duration as StdDuration;

    fn short_config() -> PipelineConfig {
        PipelineConfig {
            windows: vec![StdDuration::from_secs(1800), StdDuration::from_secs(3600)],
            horizon: StdDuration::from_secs(3600),
            health_threshold: 0.5,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_drops_rows_without_full_history() {
        let config = short_config();
        let health: Vec<f64> = (0..30).map(|i| if i < 20 { 0.9 } else { 0.2 }).collect();
        let series = series_with_health(&health);
        let segments = Segments::split(&series.readings, interval());
        let events = detect_events(&series.readings, &segments, config.health_threshold);
        let labels = label_readings(&series.readings, &segments, &events, config.horizon());
        let features = extract_features(&series.readings, &segments, &config);

        let assembly = assemble_machine(&labels, &features);

        assert_eq!(assembly.exclusions.insufficient_history, 6);
        assert_eq!(assembly.records.len(), 24);
        assert_eq!(assembly.records[0].timestamp, series.readings[6].timestamp);
        let schema = FeatureSchema::from_config(&config);
        assert!(assembly.records.iter().all(|r| r.features.len() == schema.len()));
        // Event at index 20, horizon 6 steps: indices 14..=20 are positive.
        assert_eq!(count_positives(&assembly.records), 7);
    }

    #[test]
    fn test_undefined_labels_are_dropped() {
        let config = short_config();
        let mut minutes: Vec<i64> = (0..20).map(|i| i * 10).collect();
        minutes.extend((0..20).map(|i| 600 + i * 10));
        let series = series_at(&minutes);
        let segments = Segments::split(&series.readings, interval());
        let labels = label_readings(&series.readings, &segments, &[], config.horizon());
        let features = extract_features(&series.readings, &segments, &config);

        let assembly = assemble_machine(&labels, &features);

        // Each segment loses 6 rows to history; the first also loses 6 to the gap.
        assert_eq!(assembly.exclusions.insufficient_history, 12);
        assert_eq!(assembly.exclusions.undefined_label, 6);
        assert_eq!(assembly.records.len(), 22);
    }

    #[test]
    fn test_keys_are_unique() {
        let config = PipelineConfig {
            windows: vec![StdDuration::from_secs(600)],
            ..short_config()
        };
        let series = series_at(&[0, 10, 20, 20, 30, 40]);
        let segments = Segments::split(&series.readings, interval());
        let labels = label_readings(&series.readings, &segments, &[], config.horizon());
        let features = extract_features(&series.readings, &segments, &config);

        let assembly = assemble_machine(&labels, &features);
        let mut keys: Vec<_> = assembly.records.iter().map(|r| r.timestamp).collect();
        let before = keys.len();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_duplicate_keys_are_counted() {
        let config = PipelineConfig {
            windows: vec![StdDuration::from_secs(600)],
            horizon: StdDuration::from_secs(600),
            ..short_config()
        };
        let series = series_at(&[0, 10, 20, 20, 30, 40]);
        let segments = Segments::split(&series.readings, interval());
        let labels = label_readings(&series.readings, &segments, &[], config.horizon());
        let features = extract_features(&series.readings, &segments, &config);

        let assembly = assemble_machine(&labels, &features);

        let minutes: Vec<i64> = assembly
            .records
            .iter()
            .map(|r| (r.timestamp - series.readings[0].timestamp).num_minutes())
            .collect();
        assert_eq!(minutes, vec![10, 30, 40]);
        assert_eq!(assembly.exclusions.insufficient_history, 1);
        assert_eq!(assembly.exclusions.undefined_label, 1);
        assert_eq!(assembly.exclusions.duplicate_key, 1);
        assert_eq!(
            assembly.exclusions.total() + assembly.records.len(),
            series.readings.len()
        );
    }
}
