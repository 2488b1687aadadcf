//! Sensor series sources.
//!
//! Series come either from a CSV input table or from the synthetic
//! generator. Both produce fully materialised, per-machine ordered series.

pub mod generator;
pub mod tables;
pub mod types;

// Re-export commonly used types
pub use generator::{generate, simulate_machine, GeneratorConfig, GeneratorError};
pub use tables::{
    read_series, read_training_table, write_series, write_training_table, SourceError,
    TrainingTable,
};
pub use types::{Channel, MachineSeries, SensorReading};
