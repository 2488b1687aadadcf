//! Per-machine orchestration of the pipeline stages.
//!
//! ```text
//!  series ──▶ job queue ──▶ worker 1 ─┐
//!                       ├──▶ worker 2 ─┼──▶ result queue ──▶ merge (by machine id) ──▶ sampler
//!                       └──▶ worker N ─┘
//! ```
//!
//! Each worker runs segmentation, event detection, labelling, feature
//! extraction and assembly for one machine at a time. Workers share nothing
//! but the read-only configuration; the merge is the single writer.

use crate::config::{window_label, ConfigError, PipelineConfig};
use crate::core::{
    assemble_machine, count_flag_mismatches, count_positives, detect_events, extract_features,
    label_readings, seeded_rng, undersample, FailureEvent, FeatureSchema, MachineAssembly,
    SampledDataset, Segments, TrainingRecord,
};
use crate::report::{MachineIssue, PipelineReport};
use crate::source::MachineSeries;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal pipeline errors. Per-machine problems are reported, not raised.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no machine series to process")]
    NoMachines,
    #[error("machine {0} appears in more than one series")]
    DuplicateMachine(u32),
    #[error("series for machine {series} holds a reading of machine {reading}")]
    ForeignReading { series: u32, reading: u32 },
    #[error("no machine produced a valid training row; check window and threshold settings")]
    NoValidRows,
}

/// Everything one machine contributed.
#[derive(Debug, Clone)]
pub struct MachineOutcome {
    pub machine_id: u32,
    pub readings: usize,
    pub events: Vec<FailureEvent>,
    pub assembly: MachineAssembly,
    pub issues: Vec<MachineIssue>,
}

/// Assembled table before sampling.
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    pub schema: FeatureSchema,
    pub label_column: String,
    /// Ordered by machine id, then timestamp
    pub records: Vec<TrainingRecord>,
    pub report: PipelineReport,
}

/// Assembled and sampled tables plus the run report.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub schema: FeatureSchema,
    pub label_column: String,
    pub records: Vec<TrainingRecord>,
    pub sampled: SampledDataset,
    pub report: PipelineReport,
}

/// Name of the label column, e.g. `fail_within_24h`.
pub fn label_column(config: &PipelineConfig) -> String {
    format!("fail_within_{}", window_label(config.horizon))
}

/// Run every per-machine stage for a single machine.
pub fn process_machine(series: &MachineSeries, config: &PipelineConfig) -> MachineOutcome {
    let readings = &series.readings;
    let segments = Segments::split(readings, config.interval());
    let events = detect_events(readings, &segments, config.health_threshold);
    let labels = label_readings(readings, &segments, &events, config.horizon());
    let features = extract_features(readings, &segments, config);
    let assembly = assemble_machine(&labels, &features);

    let mut issues: Vec<MachineIssue> = segments.issues.into_iter().map(Into::into).collect();
    let mismatches = count_flag_mismatches(readings, &events);
    if mismatches > 0 {
        issues.push(MachineIssue::FailedFlagMismatch { count: mismatches });
    }
    if assembly.records.is_empty() {
        issues.push(MachineIssue::NoValidRows);
    }

    debug!(
        machine_id = series.machine_id,
        readings = readings.len(),
        events = events.len(),
        rows = assembly.records.len(),
        "Machine processed"
    );

    MachineOutcome {
        machine_id: series.machine_id,
        readings: readings.len(),
        events,
        assembly,
        issues,
    }
}

/// Process all machines on worker threads and return outcomes in machine order.
pub fn process_machines(series: &[MachineSeries], config: &PipelineConfig) -> Vec<MachineOutcome> {
    let workers = config.workers().clamp(1, series.len().max(1));
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &MachineSeries)>();
    for job in series.iter().enumerate() {
        // The receiver is alive until the scope below ends.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let mut outcomes: Vec<(usize, MachineOutcome)> = std::thread::scope(|scope| {
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            scope.spawn(move || {
                for (index, machine) in job_rx.iter() {
                    if out_tx.send((index, process_machine(machine, config))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(out_tx);
        out_rx.iter().collect()
    });

    outcomes.sort_by_key(|(index, outcome)| (outcome.machine_id, *index));
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Each machine must come in exactly one series, holding only its own readings.
fn check_machine_ids(series: &[MachineSeries]) -> Result<(), PipelineError> {
    let mut seen = BTreeSet::new();
    for machine in series {
        if !seen.insert(machine.machine_id) {
            return Err(PipelineError::DuplicateMachine(machine.machine_id));
        }
        if let Some(foreign) = machine
            .readings
            .iter()
            .find(|r| r.machine_id != machine.machine_id)
        {
            return Err(PipelineError::ForeignReading {
                series: machine.machine_id,
                reading: foreign.machine_id,
            });
        }
    }
    Ok(())
}

/// Run detection, labelling, features and assembly for every machine.
pub fn assemble_dataset(
    series: &[MachineSeries],
    config: &PipelineConfig,
) -> Result<AssembledDataset, PipelineError> {
    config.validate()?;
    if series.is_empty() {
        return Err(PipelineError::NoMachines);
    }
    check_machine_ids(series)?;

    info!(
        machines = series.len(),
        workers = config.workers(),
        "Assembling training table"
    );

    let mut report = PipelineReport::new();
    let mut records = Vec::new();

    for outcome in process_machines(series, config) {
        report.machines_total += 1;
        report.readings_total += outcome.readings;
        report.events_detected += outcome.events.len();
        report.exclusions.add(&outcome.assembly.exclusions);

        for issue in outcome.issues {
            warn!(machine_id = outcome.machine_id, %issue, "Machine issue");
            report.record_issue(outcome.machine_id, issue);
        }

        if outcome.assembly.records.is_empty() {
            report.empty_machines.push(outcome.machine_id);
        } else {
            report.machines_with_rows += 1;
            records.extend(outcome.assembly.records);
        }
    }

    if records.is_empty() {
        return Err(PipelineError::NoValidRows);
    }

    report.rows_assembled = records.len();
    report.positives = count_positives(&records);

    info!(
        rows = report.rows_assembled,
        positives = report.positives,
        events = report.events_detected,
        "Training table assembled"
    );

    Ok(AssembledDataset {
        schema: FeatureSchema::from_config(config),
        label_column: label_column(config),
        records,
        report,
    })
}

/// Run the full pipeline: assembly followed by negative undersampling.
pub fn run(series: &[MachineSeries], config: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    let AssembledDataset {
        schema,
        label_column,
        records,
        mut report,
    } = assemble_dataset(series, config)?;

    let mut rng = seeded_rng(config.seed);
    let sampled = undersample(&records, config.negative_ratio, &mut rng);
    info!(
        kept = sampled.records.len(),
        achieved_ratio = sampled.summary.achieved_ratio,
        "Negatives undersampled"
    );
    report.sampling = Some(sampled.summary.clone());

    Ok(PipelineOutput {
        schema,
        label_column,
        records,
        sampled,
        report,
    })
}
