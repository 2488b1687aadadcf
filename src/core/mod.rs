//! Core pipeline stages.
//!
//! This module contains:
//! - Series validation into contiguous segments
//! - Failure event detection and horizon labelling
//! - Rolling-window feature extraction
//! - Dataset assembly and negative undersampling

pub mod dataset;
pub mod events;
pub mod features;
pub mod labels;
pub mod sampler;
pub mod series;
pub mod windowing;

// Re-export commonly used types
pub use dataset::{assemble_machine, count_positives, Exclusions, MachineAssembly, TrainingRecord};
pub use events::{count_flag_mismatches, detect_events, FailureEvent};
pub use features::{extract_features, FeatureSchema, FeatureVector};
pub use labels::{label_readings, LabeledReading};
pub use sampler::{seeded_rng, undersample, SampledDataset, SamplingSummary};
pub use series::{Segments, SeriesIssue};
pub use windowing::{rolling_stats, WindowStats};
