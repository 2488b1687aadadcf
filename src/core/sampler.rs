//! Negative undersampling of the assembled training table.

use crate::core::dataset::TrainingRecord;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Outcome counts of one sampling pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSummary {
    pub requested_ratio: f64,
    pub positives: usize,
    pub negatives_available: usize,
    pub negatives_retained: usize,
    /// Negatives retained per positive
    pub achieved_ratio: f64,
    /// Set when fewer negatives existed than the ratio asked for
    pub ratio_unachievable: bool,
    /// Set when there was nothing to balance against; the sampled view is empty
    #[serde(default)]
    pub no_positives: bool,
}

/// Undersampled view of the training records.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledDataset {
    /// Retained records in their original order
    pub records: Vec<TrainingRecord>,
    pub summary: SamplingSummary,
}

/// Keep every positive and at most `ratio × positives` negatives.
///
/// Negatives are chosen uniformly without replacement by `rng`; the chosen
/// records keep their input order, so the same seed always yields the same
/// table. Without positives the sampled view is empty and flagged in the
/// summary.
pub fn undersample<R: Rng + ?Sized>(
    records: &[TrainingRecord],
    ratio: f64,
    rng: &mut R,
) -> SampledDataset {
    let negatives: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.label)
        .map(|(i, _)| i)
        .collect();
    let positives = records.len() - negatives.len();

    let wanted = (ratio * positives as f64).floor() as usize;
    let ratio_unachievable = wanted > negatives.len();
    let amount = wanted.min(negatives.len());

    let mut keep: Vec<bool> = records.iter().map(|r| r.label).collect();
    for pick in index::sample(rng, negatives.len(), amount) {
        keep[negatives[pick]] = true;
    }

    let retained: Vec<TrainingRecord> = records
        .iter()
        .zip(&keep)
        .filter(|(_, keep)| **keep)
        .map(|(r, _)| r.clone())
        .collect();

    let summary = SamplingSummary {
        requested_ratio: ratio,
        positives,
        negatives_available: negatives.len(),
        negatives_retained: amount,
        achieved_ratio: if positives == 0 {
            0.0
        } else {
            amount as f64 / positives as f64
        },
        ratio_unachievable,
        no_positives: positives == 0,
    };

    if summary.no_positives {
        tracing::warn!(
            negatives = negatives.len(),
            "No positive records; the sampled table is empty"
        );
    } else if ratio_unachievable {
        tracing::warn!(
            requested = ratio,
            achieved = summary.achieved_ratio,
            "Not enough negatives for the requested ratio; keeping all of them"
        );
    }

    SampledDataset {
        records: retained,
        summary,
    }
}

/// Sampler random source for a configured seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
