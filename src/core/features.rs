//! Rolling-window feature vectors for every reading.
//!
//! Columns are produced window by window, channel by channel, in the order
//! given by [`FeatureSchema`]. The same schema drives the training table,
//! the classifier input and the scoring service.

use crate::config::{window_label, PipelineConfig};
use crate::core::series::Segments;
use crate::core::windowing::{rolling_stats, WindowStats};
use crate::source::{Channel, SensorReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered feature column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Build the column layout for a configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut names = Vec::new();
        for window in &config.windows {
            let suffix = window_label(*window);
            for channel in Channel::ALL {
                for stat in ["mean", "std", "max", "delta"] {
                    names.push(format!("{channel}_{stat}_{suffix}"));
                }
                if let Some(high) = config.high_threshold(channel) {
                    names.push(format!("{channel}_high_{}_count_{suffix}", high.metric));
                }
            }
        }
        Self { names }
    }

    /// Schema with explicit column names, e.g. read back from a table header.
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Features of one reading, one block per configured window.
///
/// A block is `None` when that window would reach past the start of the
/// reading's contiguous segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub machine_id: u32,
    pub timestamp: DateTime<Utc>,
    pub windows: Vec<Option<Vec<f64>>>,
}

impl FeatureVector {
    /// Whether every window has full history.
    pub fn is_complete(&self) -> bool {
        self.windows.iter().all(Option::is_some)
    }

    /// Concatenate all window blocks, if every window is valid.
    pub fn values(&self) -> Option<Vec<f64>> {
        let mut values = Vec::new();
        for block in &self.windows {
            values.extend_from_slice(block.as_ref()?);
        }
        Some(values)
    }
}

/// Compute feature vectors for every reading of one machine.
///
/// Windows never cross a segment boundary, so a gap invalidates every window
/// that would need readings from before it.
pub fn extract_features(
    readings: &[SensorReading],
    segments: &Segments,
    config: &PipelineConfig,
) -> Vec<FeatureVector> {
    let mut vectors: Vec<FeatureVector> = readings
        .iter()
        .map(|r| FeatureVector {
            machine_id: r.machine_id,
            timestamp: r.timestamp,
            windows: Vec::with_capacity(config.windows.len()),
        })
        .collect();

    for range in &segments.ranges {
        let segment = &readings[range.clone()];

        for window in &config.windows {
            let steps = config.window_steps(*window);
            let per_channel: Vec<Vec<Option<WindowStats>>> = Channel::ALL
                .iter()
                .map(|&channel| {
                    let values: Vec<f64> = segment.iter().map(|r| r.value(channel)).collect();
                    let high = config.high_threshold(channel).map(|h| h.value);
                    rolling_stats(&values, steps, high)
                })
                .collect();

            for (offset, vector) in vectors[range.clone()].iter_mut().enumerate() {
                vector.windows.push(window_block(&per_channel, offset));
            }
        }
    }

    vectors
}

/// Flatten the stats of all channels at one position into a column block.
fn window_block(per_channel: &[Vec<Option<WindowStats>>], offset: usize) -> Option<Vec<f64>> {
    let mut block = Vec::with_capacity(per_channel.len() * 5);
    for stats in per_channel {
        let s = stats[offset]?;
        block.extend_from_slice(&[s.mean, s.std, s.max, s.delta]);
        if let Some(count) = s.high_count {
            block.push(f64::from(count));
        }
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{interval, series_at};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            windows: vec![
                std::time::Duration::from_secs(20 * 60),
                std::time::Duration::from_secs(3600),
            ],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_schema_layout() {
        let schema = FeatureSchema::from_config(&PipelineConfig::default());
        // 5 channels x 4 stats + 3 high counts, for each of 2 windows.
        assert_eq!(schema.len(), 46);
        assert_eq!(schema.names()[0], "temp_c_mean_6h");
        assert_eq!(schema.names()[4], "temp_c_high_temp_count_6h");
        assert!(schema.position("vibration_ms2_high_vib_count_24h").is_some());
        assert!(schema.position("rpm_delta_24h").is_some());
        assert!(schema.position("health_score_mean_6h").is_none());
    }

    #[test]
    fn test_vector_width_matches_schema() {
        let config = small_config();
        let schema = FeatureSchema::from_config(&config);
        let minutes: Vec<i64> = (0..20).map(|i| i * 10).collect();
        let series = series_at(&minutes);
        let segments = Segments::split(&series.readings, interval());

        let vectors = extract_features(&series.readings, &segments, &config);
        let complete = vectors.iter().find_map(|v| v.values()).unwrap();
        assert_eq!(complete.len(), schema.len());
    }

    #[test]
    fn test_validity_per_window() {
        let config = small_config();
        let minutes: Vec<i64> = (0..10).map(|i| i * 10).collect();
        let series = series_at(&minutes);
        let segments = Segments::split(&series.readings, interval());
        let vectors = extract_features(&series.readings, &segments, &config);

        // 20 minutes needs 2 prior steps, 1 hour needs 6.
        assert!(vectors[1].windows[0].is_none());
        assert!(vectors[2].windows[0].is_some());
        assert!(vectors[5].windows[1].is_none());
        assert!(!vectors[5].is_complete());
        assert!(vectors[6].is_complete());
    }

    #[test]
    fn test_gap_resets_history() {
        let config = small_config();
        let mut minutes: Vec<i64> = (0..10).map(|i| i * 10).collect();
        minutes.extend((0..10).map(|i| 200 + i * 10));
        let series = series_at(&minutes);
        let segments = Segments::split(&series.readings, interval());
        let vectors = extract_features(&series.readings, &segments, &config);

        assert!(vectors[9].is_complete());
        assert!(vectors[10..16].iter().all(|v| !v.is_complete()));
        assert!(vectors[16].is_complete());
    }
}
