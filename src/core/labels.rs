//! Forward-looking failure labels.
//!
//! Labels deliberately look into the future (the next failure event), while
//! features never do. The two are computed independently.

use crate::core::events::FailureEvent;
use crate::core::series::Segments;
use crate::source::SensorReading;
use chrono::Duration;

/// A reading paired with its forward-looking label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledReading<'a> {
    pub reading: &'a SensorReading,
    /// `None` when the label is undefined because the horizon runs into a gap
    pub fail_within_horizon: Option<bool>,
}

/// Label every reading with whether a failure event follows within `horizon`.
///
/// The next event for a reading at `t` is the earliest event `e >= t`; the
/// label is `Some(true)` when `e - t <= horizon`. A single pointer into the
/// ordered event list advances with the readings, so the sweep is
/// O(readings + events).
///
/// When no event falls inside the horizon, the label is `Some(false)` if the
/// whole horizon was observed (or runs past the end of the series) and `None`
/// if it reaches into a gap after the reading's segment.
pub fn label_readings<'a>(
    readings: &'a [SensorReading],
    segments: &Segments,
    events: &[FailureEvent],
    horizon: Duration,
) -> Vec<LabeledReading<'a>> {
    let mut labels = Vec::with_capacity(readings.len());
    let mut next = 0;
    let last_segment = segments.ranges.len().saturating_sub(1);

    for (seg_idx, range) in segments.ranges.iter().enumerate() {
        let segment_end = readings[range.end - 1].timestamp;

        for reading in &readings[range.clone()] {
            let t = reading.timestamp;
            while next < events.len() && events[next].timestamp < t {
                next += 1;
            }

            let within = events
                .get(next)
                .is_some_and(|e| e.timestamp - t <= horizon);

            let label = if within {
                Some(true)
            } else if seg_idx == last_segment
                || t.checked_add_signed(horizon)
                    .is_some_and(|end| end <= segment_end)
            {
                Some(false)
            } else {
                None
            };
            labels.push(LabeledReading {
                reading,
                fail_within_horizon: label,
            });
        }
    }

    labels
}
