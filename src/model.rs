//! Failure classifier interface and scoring.
//!
//! The service only depends on [`FailureClassifier`]; any model that maps an
//! ordered feature vector to a probability can sit behind it. A small
//! logistic regression is provided so a training table can be served
//! directly.

use crate::core::{FeatureSchema, TrainingRecord};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Probability at or above which a reading is treated as at risk.
///
/// Lower than 0.5 to favour recall over precision.
pub const DECISION_THRESHOLD: f64 = 0.20;

/// Probability at or above which risk is high.
pub const HIGH_RISK_THRESHOLD: f64 = 0.70;

/// Binary classifier over a fixed, ordered feature set.
pub trait FailureClassifier: Send + Sync {
    /// Feature names in the order `predict_proba` expects them.
    fn feature_names(&self) -> &[String];

    /// Probability of failure within the horizon, in [0, 1].
    fn predict_proba(&self, features: &[f64]) -> f64;
}

/// Model fitting errors.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training table has no rows")]
    EmptyTrainingSet,
    #[error("training table has a single class; need both failures and non-failures")]
    SingleClass,
    #[error("row {row} has {found} features, expected {expected}")]
    WidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("non-finite value in row {row}")]
    NonFinite { row: usize },
}

/// Scoring errors.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("missing required features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),
    #[error("feature '{0}' is not a finite number")]
    NonFinite(String),
}

/// Gradient descent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on the weights (not the bias)
    pub l2: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 200,
            l2: 1e-4,
        }
    }
}

/// Logistic regression on standardised features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    feature_names: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticRegression {
    /// Fit with full-batch gradient descent.
    pub fn fit(
        schema: &FeatureSchema,
        records: &[TrainingRecord],
        options: &TrainOptions,
    ) -> Result<Self, ModelError> {
        if records.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let positives = records.iter().filter(|r| r.label).count();
        if positives == 0 || positives == records.len() {
            return Err(ModelError::SingleClass);
        }

        let width = schema.len();
        for (row, record) in records.iter().enumerate() {
            if record.features.len() != width {
                return Err(ModelError::WidthMismatch {
                    row,
                    expected: width,
                    found: record.features.len(),
                });
            }
            if record.features.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite { row });
            }
        }

        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for j in 0..width {
            let column: Vec<f64> = records.iter().map(|r| r.features[j]).collect();
            let mean = column.iter().mean();
            let std = column.iter().population_std_dev();
            means.push(mean);
            scales.push(if std > 1e-12 { std } else { 1.0 });
        }

        let inputs: Vec<Vec<f64>> = records
            .iter()
            .map(|r| standardise(&r.features, &means, &scales))
            .collect();
        let targets: Vec<f64> = records
            .iter()
            .map(|r| if r.label { 1.0 } else { 0.0 })
            .collect();

        let n = records.len() as f64;
        let mut weights = vec![0.0; width];
        // Start from the base rate so early epochs are not spent on the bias.
        let base_rate = positives as f64 / n;
        let mut bias = (base_rate / (1.0 - base_rate)).ln();
        let mut gradient = vec![0.0; width];

        for epoch in 0..options.epochs {
            gradient.iter_mut().for_each(|g| *g = 0.0);
            let mut bias_gradient = 0.0;
            let mut loss = 0.0;

            for (x, &y) in inputs.iter().zip(&targets) {
                let z = bias + dot(&weights, x);
                let p = sigmoid(z);
                let err = p - y;
                for (g, xi) in gradient.iter_mut().zip(x) {
                    *g += err * xi;
                }
                bias_gradient += err;
                loss -= y * p.max(1e-15).ln() + (1.0 - y) * (1.0 - p).max(1e-15).ln();
            }

            for (w, g) in weights.iter_mut().zip(&gradient) {
                *w -= options.learning_rate * (g / n + options.l2 * *w);
            }
            bias -= options.learning_rate * bias_gradient / n;

            if epoch % 50 == 0 {
                debug!(epoch, loss = loss / n, "Training");
            }
        }

        info!(
            rows = records.len(),
            positives,
            features = width,
            "Logistic regression fitted"
        );

        Ok(Self {
            feature_names: schema.names().to_vec(),
            means,
            scales,
            weights,
            bias,
        })
    }
}

fn standardise(values: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(means.iter().zip(scales))
        .map(|(v, (m, s))| (v - m) / s)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl FailureClassifier for LogisticRegression {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        let x = standardise(features, &self.means, &self.scales);
        let p = sigmoid(self.bias + dot(&self.weights, &x));
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }
}

/// Risk band for a failure probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability < DECISION_THRESHOLD {
            RiskTier::Low
        } else if probability < HIGH_RISK_THRESHOLD {
            RiskTier::Moderate
        } else {
            RiskTier::High
        }
    }

    /// Operator-facing recommendation for this tier.
    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low risk: continue normal operation, routine monitoring.",
            RiskTier::Moderate => {
                "Moderate risk: schedule inspection in the next maintenance window."
            }
            RiskTier::High => {
                "High risk: schedule maintenance as soon as possible to avoid unplanned downtime."
            }
        }
    }
}

/// Scored request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Rounded to 3 decimals
    pub failure_probability_24h: f64,
    pub recommendation: String,
}

/// Score a named feature mapping.
///
/// Every feature the model expects must be present; extra keys are ignored.
/// Missing keys are reported together, in model order.
pub fn score(
    model: &dyn FailureClassifier,
    features: &HashMap<String, f64>,
) -> Result<Prediction, ScoringError> {
    let names = model.feature_names();
    let missing: Vec<String> = names
        .iter()
        .filter(|name| !features.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ScoringError::MissingFeatures(missing));
    }

    let mut values = Vec::with_capacity(names.len());
    for name in names {
        let value = features[name.as_str()];
        if !value.is_finite() {
            return Err(ScoringError::NonFinite(name.clone()));
        }
        values.push(value);
    }

    let probability = (model.predict_proba(&values) * 1000.0).round() / 1000.0;
    Ok(Prediction {
        failure_probability_24h: probability,
        recommendation: RiskTier::from_probability(probability)
            .recommendation()
            .to_string(),
    })
}
