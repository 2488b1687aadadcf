//! Configuration for the failure-horizon pipeline.
//!
//! A single immutable [`PipelineConfig`] is passed by reference into every
//! stage; nothing reads thresholds or window lengths from global state.

use crate::source::Channel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest accepted interval, window or horizon.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 86_400);

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Expected spacing between consecutive readings of a machine
    #[serde(with = "duration_serde")]
    pub sampling_interval: Duration,

    /// How far ahead a failure event sets the label
    #[serde(with = "duration_serde")]
    pub horizon: Duration,

    /// Rolling window lengths, in output column order
    #[serde(with = "duration_vec_serde")]
    pub windows: Vec<Duration>,

    /// Health score below which a machine is considered failed
    pub health_threshold: f64,

    /// Channels that additionally get a high-value count feature
    pub high_thresholds: Vec<HighThreshold>,

    /// Maximum negatives kept per positive by the sampler
    pub negative_ratio: f64,

    /// Seed for the sampler's random source
    pub seed: u64,

    /// Worker threads for per-machine processing (0 = available parallelism)
    pub worker_threads: usize,
}

/// High-value threshold for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighThreshold {
    pub channel: Channel,
    /// Short metric name used in the feature column, e.g. `temp`
    pub metric: String,
    /// Samples strictly above this value are counted
    pub value: f64,
}

impl HighThreshold {
    pub fn new(channel: Channel, metric: impl Into<String>, value: f64) -> Self {
        Self {
            channel,
            metric: metric.into(),
            value,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(10 * 60),
            horizon: Duration::from_secs(24 * 3600),
            windows: vec![
                Duration::from_secs(6 * 3600),
                Duration::from_secs(24 * 3600),
            ],
            health_threshold: 0.3,
            high_thresholds: vec![
                HighThreshold::new(Channel::TempC, "temp", 65.0),
                HighThreshold::new(Channel::VibrationMs2, "vib", 1.8),
                HighThreshold::new(Channel::LoadPct, "load", 80.0),
            ],
            negative_ratio: 5.0,
            seed: 42,
            worker_threads: 0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default location, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from an explicit JSON file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("failure-horizon")
            .join("config.json")
    }

    /// Check the invariants every stage relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let too_long = [("sampling_interval", self.sampling_interval), ("horizon", self.horizon)]
            .into_iter()
            .chain(self.windows.iter().map(|w| ("window", *w)))
            .find(|(_, d)| *d > MAX_DURATION);
        if let Some((name, d)) = too_long {
            return Err(ConfigError::Invalid(format!(
                "{name} of {}s exceeds the {}s limit",
                d.as_secs(),
                MAX_DURATION.as_secs()
            )));
        }

        let interval = self.sampling_interval.as_secs();
        if interval == 0 || self.sampling_interval.subsec_nanos() != 0 {
            return Err(ConfigError::Invalid(
                "sampling_interval must be a positive whole number of seconds".to_string(),
            ));
        }
        if self.windows.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one rolling window is required".to_string(),
            ));
        }
        for window in &self.windows {
            if window.as_secs() == 0 || window.as_secs() % interval != 0 {
                return Err(ConfigError::Invalid(format!(
                    "window of {}s is not a positive multiple of the {}s sampling interval",
                    window.as_secs(),
                    interval
                )));
            }
        }
        let mut labels: Vec<String> = self.windows.iter().map(|w| window_label(*w)).collect();
        labels.sort();
        labels.dedup();
        if labels.len() != self.windows.len() {
            return Err(ConfigError::Invalid("window lengths must be distinct".to_string()));
        }
        if self.horizon.as_secs() == 0 {
            return Err(ConfigError::Invalid("horizon must be positive".to_string()));
        }
        if !self.health_threshold.is_finite() {
            return Err(ConfigError::Invalid("health_threshold must be finite".to_string()));
        }
        if !self.negative_ratio.is_finite() || self.negative_ratio < 0.0 {
            return Err(ConfigError::Invalid(
                "negative_ratio must be a finite, non-negative number".to_string(),
            ));
        }
        if let Some(bad) = self.high_thresholds.iter().find(|h| !h.value.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "high threshold for {} must be finite",
                bad.channel
            )));
        }
        Ok(())
    }

    /// Sampling interval as a chrono duration.
    pub fn interval(&self) -> chrono::Duration {
        to_chrono(self.sampling_interval)
    }

    /// Prediction horizon as a chrono duration.
    pub fn horizon(&self) -> chrono::Duration {
        to_chrono(self.horizon)
    }

    /// Number of sampling steps a window reaches back from the current reading.
    pub fn window_steps(&self, window: Duration) -> usize {
        (window.as_secs() / self.sampling_interval.as_secs()) as usize
    }

    /// High-value threshold configured for a channel, if any.
    pub fn high_threshold(&self, channel: Channel) -> Option<&HighThreshold> {
        self.high_thresholds.iter().find(|h| h.channel == channel)
    }

    /// Effective worker count.
    pub fn workers(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Whole seconds of `d` as a chrono duration, saturating for unvalidated input.
fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(Duration::from_secs(d.as_secs())).unwrap_or(chrono::Duration::MAX)
}

/// Column suffix for a window length: `6h`, `24h`, or `90m`.
pub fn window_label(window: Duration) -> String {
    let secs = window.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}m", secs / 60)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for a list of Durations, as seconds.
mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs: Vec<u64> = durations.iter().map(|d| d.as_secs()).collect();
        secs.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Vec::<u64>::deserialize(deserializer)?;
        Ok(secs.into_iter().map(Duration::from_secs).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.sampling_interval, Duration::from_secs(600));
        assert_eq!(config.horizon, Duration::from_secs(86_400));
        assert_eq!(config.window_steps(config.windows[0]), 36);
        assert_eq!(config.window_steps(config.windows[1]), 144);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_labels() {
        assert_eq!(window_label(Duration::from_secs(6 * 3600)), "6h");
        assert_eq!(window_label(Duration::from_secs(24 * 3600)), "24h");
        assert_eq!(window_label(Duration::from_secs(90 * 60)), "90m");
    }

    #[test]
    fn test_rejects_window_off_interval() {
        let config = PipelineConfig {
            windows: vec![Duration::from_secs(25 * 60)],
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_overlong_durations() {
        let horizon = PipelineConfig {
            horizon: Duration::from_secs(10_u64.pow(13)),
            ..PipelineConfig::default()
        };
        assert!(matches!(horizon.validate(), Err(ConfigError::Invalid(_))));

        let window = PipelineConfig {
            windows: vec![Duration::from_secs(6 * 3600), Duration::from_secs(400 * 86_400)],
            ..PipelineConfig::default()
        };
        assert!(matches!(window.validate(), Err(ConfigError::Invalid(_))));

        let at_limit = PipelineConfig {
            horizon: MAX_DURATION,
            ..PipelineConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_huge_horizon_saturates() {
        let config = PipelineConfig {
            horizon: Duration::from_secs(u64::MAX),
            ..PipelineConfig::default()
        };
        assert_eq!(config.horizon(), chrono::Duration::MAX);
    }

    #[test]
    fn test_rejects_negative_ratio() {
        let config = PipelineConfig {
            negative_ratio: -1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_uses_seconds() {
        let config = PipelineConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["horizon"], 86_400);
        assert_eq!(json["windows"], serde_json::json!([21_600, 86_400]));
        assert_eq!(json["high_thresholds"][0]["channel"], "temp_c");

        let parsed: PipelineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PipelineConfig {
            negative_ratio: 3.0,
            seed: 7,
            ..PipelineConfig::default()
        };
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.negative_ratio, 3.0);
    }
}
