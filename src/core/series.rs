//! Splitting a machine's series into contiguous, evenly sampled segments.
//!
//! Every downstream stage works segment by segment. Nothing is interpolated:
//! a gap or an off-grid reading simply starts a new segment and is reported.

use crate::source::SensorReading;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Problem found while validating a machine's sampling grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeriesIssue {
    /// Spacing larger than the sampling interval
    Gap {
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    },
    /// Spacing smaller than the sampling interval (duplicate or off-grid reading)
    Irregular {
        previous: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

/// Contiguous segments of one machine's readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Segments {
    /// Index ranges into the reading slice; consecutive, non-empty, covering it
    pub ranges: Vec<Range<usize>>,
    pub issues: Vec<SeriesIssue>,
}

impl Segments {
    /// Split readings wherever the spacing differs from `interval`.
    pub fn split(readings: &[SensorReading], interval: Duration) -> Self {
        let mut ranges = Vec::new();
        let mut issues = Vec::new();
        let mut start = 0;

        for i in 1..readings.len() {
            let previous = readings[i - 1].timestamp;
            let at = readings[i].timestamp;
            let step = at - previous;
            if step == interval {
                continue;
            }

            if step > interval {
                issues.push(SeriesIssue::Gap {
                    after: previous,
                    before: at,
                });
            } else {
                issues.push(SeriesIssue::Irregular { previous, at });
            }
            ranges.push(start..i);
            start = i;
        }

        if !readings.is_empty() {
            ranges.push(start..readings.len());
        }

        Self { ranges, issues }
    }

    /// Position of the segment holding reading `index`.
    pub fn segment_of(&self, index: usize) -> Option<usize> {
        let pos = self.ranges.partition_point(|r| r.end <= index);
        self.ranges
            .get(pos)
            .filter(|r| r.contains(&index))
            .map(|_| pos)
    }

    /// Whether the series is a single unbroken segment.
    pub fn is_contiguous(&self) -> bool {
        self.ranges.len() <= 1
    }
}
