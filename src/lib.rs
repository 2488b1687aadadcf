//! Failure Horizon - predictive-maintenance training tables from sensor streams.
//!
//! This library turns regularly sampled per-machine sensor series into a
//! supervised table that predicts failure within a fixed horizon (24 h by
//! default), and serves a classifier trained on it.
//!
//! # Guarantees
//!
//! - **No leakage**: features at `t` only use readings at or before `t`
//! - **No silent drops**: gaps, short machines and excluded rows are reported
//! - **Deterministic**: the same input and seed give a byte-identical table
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Failure Horizon                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//! │  │  Source  │──▶│  Events  │──▶│  Labels  │──▶│              │   │
//! │  │ (CSV/gen)│   │ (health) │   │  (24 h)  │   │   Dataset    │   │
//! │  └──────────┘   └──────────┘   └──────────┘   │   assembly   │   │
//! │        │                                      │              │   │
//! │        └─────────────────────▶┌──────────┐──▶│              │   │
//! │                               │ Features │   └──────────────┘   │
//! │                               │ (6h/24h) │          │           │
//! │                               └──────────┘          ▼           │
//! │  ┌──────────┐   ┌──────────┐               ┌──────────────┐     │
//! │  │  Server  │◀──│  Model   │◀──────────────│   Sampler    │     │
//! │  └──────────┘   └──────────┘               └──────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use failure_horizon::{pipeline, source, PipelineConfig};
//!
//! let series = source::generate(&source::GeneratorConfig::default())
//!     .expect("Failed to generate series");
//! let output = pipeline::run(&series, &PipelineConfig::default())
//!     .expect("Pipeline failed");
//!
//! println!("{}", output.report.summary());
//! ```

pub mod config;
pub mod core;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod source;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{ConfigError, HighThreshold, PipelineConfig};
pub use core::{FeatureSchema, TrainingRecord};
pub use model::{score, FailureClassifier, LogisticRegression, Prediction, RiskTier};
pub use pipeline::{PipelineError, PipelineOutput};
pub use report::PipelineReport;
pub use source::{Channel, MachineSeries, SensorReading};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
