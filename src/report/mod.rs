//! Run report for batch pipeline runs.
//!
//! Lists what was excluded and why, so a run never drops machines or rows
//! silently.

use crate::core::{Exclusions, SamplingSummary, SeriesIssue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Per-machine problem surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MachineIssue {
    /// Readings missing between two timestamps; windows and labels do not span it
    Gap {
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    },
    /// Duplicate or off-grid reading
    Irregular {
        previous: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Upstream `failed` flags disagree with detected events
    FailedFlagMismatch { count: usize },
    /// The machine contributed no training rows
    NoValidRows,
}

impl From<SeriesIssue> for MachineIssue {
    fn from(issue: SeriesIssue) -> Self {
        match issue {
            SeriesIssue::Gap { after, before } => MachineIssue::Gap { after, before },
            SeriesIssue::Irregular { previous, at } => MachineIssue::Irregular { previous, at },
        }
    }
}

impl std::fmt::Display for MachineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineIssue::Gap { after, before } => {
                write!(f, "gap between {after} and {before}")
            }
            MachineIssue::Irregular { previous, at } => {
                write!(f, "irregular spacing: {at} follows {previous}")
            }
            MachineIssue::FailedFlagMismatch { count } => {
                write!(f, "{count} reading(s) with a failed flag that disagrees with detection")
            }
            MachineIssue::NoValidRows => write!(f, "no valid training rows"),
        }
    }
}

/// An issue attributed to a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineIssueEntry {
    pub machine_id: u32,
    #[serde(flatten)]
    pub issue: MachineIssue,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub machines_total: usize,
    pub machines_with_rows: usize,
    pub readings_total: usize,
    pub events_detected: usize,
    pub rows_assembled: usize,
    pub positives: usize,
    pub exclusions: Exclusions,
    pub issues: Vec<MachineIssueEntry>,
    /// Machines that contributed zero training rows
    pub empty_machines: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingSummary>,
}

impl PipelineReport {
    /// Start an empty report with a fresh run id.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            machines_total: 0,
            machines_with_rows: 0,
            readings_total: 0,
            events_detected: 0,
            rows_assembled: 0,
            positives: 0,
            exclusions: Exclusions::default(),
            issues: Vec::new(),
            empty_machines: Vec::new(),
            sampling: None,
        }
    }

    /// Record an issue for a machine.
    pub fn record_issue(&mut self, machine_id: u32, issue: MachineIssue) {
        self.issues.push(MachineIssueEntry { machine_id, issue });
    }

    /// Issues reported for one machine.
    pub fn issues_for(&self, machine_id: u32) -> impl Iterator<Item = &MachineIssue> {
        self.issues
            .iter()
            .filter(move |e| e.machine_id == machine_id)
            .map(|e| &e.issue)
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Run {}:\n\
             - Machines: {} ({} with training rows)\n\
             - Readings: {}\n\
             - Failure events detected: {}\n\
             - Rows assembled: {} ({} positive)\n\
             - Rows excluded: {} ({} insufficient history, {} undefined label, {} duplicate key)",
            self.run_id,
            self.machines_total,
            self.machines_with_rows,
            self.readings_total,
            self.events_detected,
            self.rows_assembled,
            self.positives,
            self.exclusions.total(),
            self.exclusions.insufficient_history,
            self.exclusions.undefined_label,
            self.exclusions.duplicate_key,
        );

        if let Some(ref sampling) = self.sampling {
            out.push_str(&format!(
                "\n- Sampled: {} positives, {} of {} negatives (ratio {:.2}, requested {:.2})",
                sampling.positives,
                sampling.negatives_retained,
                sampling.negatives_available,
                sampling.achieved_ratio,
                sampling.requested_ratio,
            ));
            if sampling.no_positives {
                out.push_str("\n  Warning: no positive rows, sampled table is empty");
            }
            if sampling.ratio_unachievable {
                out.push_str("\n  Warning: requested ratio not reachable, all negatives kept");
            }
        }

        if !self.empty_machines.is_empty() {
            let ids: Vec<String> = self.empty_machines.iter().map(|m| m.to_string()).collect();
            out.push_str(&format!(
                "\n- Warning: machines without training rows: {}",
                ids.join(", ")
            ));
        }

        if !self.issues.is_empty() {
            out.push_str(&format!("\n- Machine issues ({}):", self.issues.len()));
            for entry in &self.issues {
                out.push_str(&format!("\n  machine {}: {}", entry.machine_id, entry.issue));
            }
        }

        out
    }

    /// Save the report as JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for PipelineReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_lists_empty_machines() {
        let mut report = PipelineReport::new();
        report.machines_total = 3;
        report.empty_machines = vec![7, 9];
        report.record_issue(7, MachineIssue::NoValidRows);

        let summary = report.summary();
        assert!(summary.contains("Machines: 3"));
        assert!(summary.contains("machines without training rows: 7, 9"));
        assert!(summary.contains("machine 7: no valid training rows"));
    }

    #[test]
    fn test_issue_serialization_is_flat() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = MachineIssueEntry {
            machine_id: 4,
            issue: MachineIssue::Gap {
                after: at,
                before: at + chrono::Duration::hours(1),
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["machine_id"], 4);
        assert_eq!(json["kind"], "gap");
    }

    #[test]
    fn test_save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let report = PipelineReport::new();
        report.save(&path).unwrap();

        let loaded: PipelineReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
    }
}
