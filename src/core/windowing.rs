//! Trailing-window statistics over evenly sampled values.
//!
//! A window of `steps` steps at index `i` covers the closed interval
//! `[i - steps, i]`, i.e. `steps + 1` samples ending at the current one.
//! Windows that would start before the first value are invalid (`None`).
//! Nothing after index `i` is ever read when computing the window at `i`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Aggregates over one trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub max: f64,
    /// Current value minus the value at the start of the window
    pub delta: f64,
    /// Samples strictly above the high threshold, when one is configured
    pub high_count: Option<u32>,
}

/// Compute trailing-window statistics for every index of a contiguous segment.
///
/// Sums are accumulated relative to the first value so the variance of
/// large-magnitude channels (e.g. rpm) does not lose precision.
pub fn rolling_stats(values: &[f64], steps: usize, high: Option<f64>) -> Vec<Option<WindowStats>> {
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }

    let offset = values[0];
    let mut sum = Vec::with_capacity(n + 1);
    let mut sum_sq = Vec::with_capacity(n + 1);
    let mut above = Vec::with_capacity(n + 1);
    sum.push(0.0);
    sum_sq.push(0.0);
    above.push(0u32);

    // Indices with strictly decreasing values; the front is the window max.
    let mut max_queue: VecDeque<usize> = VecDeque::new();

    for (i, &value) in values.iter().enumerate() {
        let centered = value - offset;
        sum.push(sum[i] + centered);
        sum_sq.push(sum_sq[i] + centered * centered);
        let is_high = high.is_some_and(|h| value > h);
        above.push(above[i] + u32::from(is_high));

        while max_queue.back().is_some_and(|&j| values[j] <= value) {
            max_queue.pop_back();
        }
        max_queue.push_back(i);

        if i < steps {
            out.push(None);
            continue;
        }

        let start = i - steps;
        while max_queue.front().is_some_and(|&j| j < start) {
            max_queue.pop_front();
        }

        let count = (steps + 1) as f64;
        let mean_centered = (sum[i + 1] - sum[start]) / count;
        let variance = (sum_sq[i + 1] - sum_sq[start]) / count - mean_centered * mean_centered;
        let max = max_queue.front().map_or(value, |&j| values[j]);

        out.push(Some(WindowStats {
            mean: mean_centered + offset,
            std: variance.max(0.0).sqrt(),
            max,
            delta: value - values[start],
            high_count: high.map(|_| above[i + 1] - above[start]),
        }));
    }

    out
}
