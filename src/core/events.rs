//! Failure event detection from health-score threshold crossings.

use crate::core::series::Segments;
use crate::source::SensorReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The instant a machine's health score dropped below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureEvent {
    pub machine_id: u32,
    pub timestamp: DateTime<Utc>,
}

/// Detect downward crossings of `threshold` in one machine's readings.
///
/// A reading is an event when it is strictly below the threshold and the
/// immediately preceding reading of the same segment is at or above it.
/// The first reading of a segment has no predecessor and is never an event,
/// even if it already starts below the threshold.
///
/// The returned events are strictly increasing in time.
pub fn detect_events(
    readings: &[SensorReading],
    segments: &Segments,
    threshold: f64,
) -> Vec<FailureEvent> {
    let mut events = Vec::new();

    for range in &segments.ranges {
        let segment = &readings[range.clone()];
        for pair in segment.windows(2) {
            if pair[0].health_score >= threshold && pair[1].health_score < threshold {
                events.push(FailureEvent {
                    machine_id: pair[1].machine_id,
                    timestamp: pair[1].timestamp,
                });
            }
        }
    }

    events
}

/// Count readings whose upstream `failed` flag disagrees with detection.
///
/// Readings without a flag are not compared. Both inputs are time ordered.
pub fn count_flag_mismatches(readings: &[SensorReading], events: &[FailureEvent]) -> usize {
    let mut next_event = events.iter().peekable();
    let mut mismatches = 0;

    for reading in readings {
        while next_event
            .peek()
            .is_some_and(|e| e.timestamp < reading.timestamp)
        {
            next_event.next();
        }
        let detected = next_event
            .peek()
            .is_some_and(|e| e.timestamp == reading.timestamp);

        if let Some(flag) = reading.failed {
            if flag != detected {
                mismatches += 1;
            }
        }
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{interval, series_with_health};

    fn detect(health: &[f64], threshold: f64) -> Vec<FailureEvent> {
        let series = series_with_health(health);
        let segments = Segments::split(&series.readings, interval());
        detect_events(&series.readings, &segments, threshold)
    }

    #[test]
    fn test_single_crossing() {
        let series = series_with_health(&[0.9, 0.9, 0.4, 0.4, 0.9]);
        let segments = Segments::split(&series.readings, interval());
        let events = detect_events(&series.readings, &segments, 0.5);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, series.readings[2].timestamp);
    }

    #[test]
    fn test_recovery_is_not_an_event() {
        let events = detect(&[0.9, 0.4, 0.9, 0.4, 0.4, 0.9], 0.5);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_starting_below_threshold_has_no_event() {
        assert!(detect(&[0.2, 0.2, 0.2], 0.5).is_empty());
        assert_eq!(detect(&[0.2, 0.6, 0.2], 0.5).len(), 1);
    }

    #[test]
    fn test_exactly_at_threshold_is_not_below() {
        assert!(detect(&[0.9, 0.5, 0.5], 0.5).is_empty());
        assert_eq!(detect(&[0.5, 0.49], 0.5).len(), 1);
    }

    #[test]
    fn test_matches_reference_scan() {
        let health: Vec<f64> = (0..500)
            .map(|i| 0.5 + 0.45 * ((i as f64) * 0.37).sin())
            .collect();
        let threshold = 0.3;
        let reference = health
            .windows(2)
            .filter(|p| p[0] >= threshold && p[1] < threshold)
            .count();

        let events = detect(&health, threshold);
        assert_eq!(events.len(), reference);
        assert!(events.windows(2).all(|p| p[0].timestamp < p[1].timestamp));
    }

    #[test]
    fn test_flag_mismatches() {
        let mut series = series_with_health(&[0.9, 0.4, 0.4]);
        let segments = Segments::split(&series.readings, interval());
        let events = detect_events(&series.readings, &segments, 0.5);

        series.readings[0].failed = Some(false);
        series.readings[1].failed = Some(true);
        assert_eq!(count_flag_mismatches(&series.readings, &events), 0);

        series.readings[2].failed = Some(true);
        assert_eq!(count_flag_mismatches(&series.readings, &events), 1);
    }
}
