//! CSV input and training tables.
//!
//! Columns are located by header name rather than position, so extra or
//! reordered columns in the input do not matter.

use crate::core::{FeatureSchema, TrainingRecord};
use crate::source::types::{MachineSeries, SensorReading};
use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// Timestamp layout used when writing tables.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns every input table must carry.
const INPUT_COLUMNS: [&str; 8] = [
    "machine_id",
    "timestamp",
    "temp_c",
    "vibration_ms2",
    "pressure_psi",
    "load_pct",
    "rpm",
    "health_score",
];

/// Errors reading or writing tables.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing column '{0}'")]
    MissingColumn(String),
    #[error("Row {row}, column '{column}': {message}")]
    Parse {
        row: usize,
        column: String,
        message: String,
    },
}

/// Training table read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub schema: FeatureSchema,
    pub label_column: String,
    pub records: Vec<TrainingRecord>,
}

/// Parse a timestamp in RFC 3339 or `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Optional `failed` flag: empty is unknown, anything unrecognised is an error.
fn flag_field(record: &StringRecord, index: usize, row: usize) -> Result<Option<bool>, SourceError> {
    let raw = record.get(index).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_flag(raw).map(Some).ok_or_else(|| SourceError::Parse {
        row,
        column: "failed".to_string(),
        message: format!("'{raw}' is not a flag (expected 0, 1, true or false)"),
    })
}

/// Header lookup shared by the readers.
struct Columns {
    headers: StringRecord,
}

impl Columns {
    fn index(&self, name: &str) -> Result<usize, SourceError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn field<T: std::str::FromStr>(
    record: &StringRecord,
    index: usize,
    row: usize,
    column: &str,
) -> Result<T, SourceError>
where
    T::Err: std::fmt::Display,
{
    let raw = record.get(index).unwrap_or("").trim();
    raw.parse::<T>().map_err(|e| SourceError::Parse {
        row,
        column: column.to_string(),
        message: format!("'{raw}': {e}"),
    })
}

fn timestamp_field(record: &StringRecord, index: usize, row: usize) -> Result<DateTime<Utc>, SourceError> {
    let raw = record.get(index).unwrap_or("");
    parse_timestamp(raw).ok_or_else(|| SourceError::Parse {
        row,
        column: "timestamp".to_string(),
        message: format!("'{raw}' is not a recognised timestamp"),
    })
}

/// Read an input table from a file, grouped per machine.
pub fn read_series(path: &Path) -> Result<Vec<MachineSeries>, SourceError> {
    read_series_from(File::open(path)?)
}

/// Read an input table, grouped per machine and ordered by machine id.
pub fn read_series_from<R: Read>(reader: R) -> Result<Vec<MachineSeries>, SourceError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let columns = Columns {
        headers: rdr.headers()?.clone(),
    };

    let idx: Vec<usize> = INPUT_COLUMNS
        .iter()
        .map(|name| columns.index(name))
        .collect::<Result<_, _>>()?;
    let i_failed = columns.optional("failed");

    let mut machines: BTreeMap<u32, Vec<SensorReading>> = BTreeMap::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let reading = SensorReading {
            machine_id: field(&record, idx[0], row, INPUT_COLUMNS[0])?,
            timestamp: timestamp_field(&record, idx[1], row)?,
            temp_c: field(&record, idx[2], row, INPUT_COLUMNS[2])?,
            vibration_ms2: field(&record, idx[3], row, INPUT_COLUMNS[3])?,
            pressure_psi: field(&record, idx[4], row, INPUT_COLUMNS[4])?,
            load_pct: field(&record, idx[5], row, INPUT_COLUMNS[5])?,
            rpm: field(&record, idx[6], row, INPUT_COLUMNS[6])?,
            health_score: field(&record, idx[7], row, INPUT_COLUMNS[7])?,
            failed: match i_failed {
                Some(i) => flag_field(&record, i, row)?,
                None => None,
            },
        };
        machines.entry(reading.machine_id).or_default().push(reading);
    }

    Ok(machines
        .into_iter()
        .map(|(machine_id, readings)| MachineSeries::new(machine_id, readings))
        .collect())
}

/// Write machine series as an input table.
pub fn write_series(path: &Path, series: &[MachineSeries]) -> Result<(), SourceError> {
    write_series_to(File::create(path)?, series)
}

pub fn write_series_to<W: Write>(writer: W, series: &[MachineSeries]) -> Result<(), SourceError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header: Vec<&str> = INPUT_COLUMNS.to_vec();
    header.push("failed");
    wtr.write_record(&header)?;

    for reading in series.iter().flat_map(|s| &s.readings) {
        wtr.write_record([
            reading.machine_id.to_string(),
            format_timestamp(&reading.timestamp),
            reading.temp_c.to_string(),
            reading.vibration_ms2.to_string(),
            reading.pressure_psi.to_string(),
            reading.load_pct.to_string(),
            reading.rpm.to_string(),
            reading.health_score.to_string(),
            match reading.failed {
                Some(true) => "1".to_string(),
                Some(false) => "0".to_string(),
                None => String::new(),
            },
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write training records to a file.
pub fn write_training_table(
    path: &Path,
    schema: &FeatureSchema,
    label_column: &str,
    records: &[TrainingRecord],
) -> Result<(), SourceError> {
    write_training_table_to(File::create(path)?, schema, label_column, records)
}

/// Write training records: `machine_id, timestamp, <features>, <label_column>`.
///
/// Floats use Rust's shortest round-trip formatting, so identical records
/// always produce identical bytes.
pub fn write_training_table_to<W: Write>(
    writer: W,
    schema: &FeatureSchema,
    label_column: &str,
    records: &[TrainingRecord],
) -> Result<(), SourceError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["machine_id".to_string(), "timestamp".to_string()];
    header.extend(schema.names().iter().cloned());
    header.push(label_column.to_string());
    wtr.write_record(&header)?;

    let mut row = Vec::with_capacity(header.len());
    for record in records {
        row.clear();
        row.push(record.machine_id.to_string());
        row.push(format_timestamp(&record.timestamp));
        row.extend(record.features.iter().map(|v| v.to_string()));
        row.push(if record.label { "1" } else { "0" }.to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Read a training table written by [`write_training_table`].
///
/// The last column is the label; everything between `timestamp` and the
/// label is a feature column.
pub fn read_training_table(path: &Path) -> Result<TrainingTable, SourceError> {
    read_training_table_from(File::open(path)?)
}

pub fn read_training_table_from<R: Read>(reader: R) -> Result<TrainingTable, SourceError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = Columns {
        headers: headers.clone(),
    };
    let i_machine = columns.index("machine_id")?;
    let i_timestamp = columns.index("timestamp")?;

    if headers.len() < 4 {
        return Err(SourceError::MissingColumn("feature columns".to_string()));
    }
    let i_label = headers.len() - 1;
    let label_column = headers[i_label].to_string();
    let feature_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != i_machine && *i != i_timestamp && *i != i_label)
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let features = feature_columns
            .iter()
            .map(|(i, name)| field::<f64>(&record, *i, row, name))
            .collect::<Result<Vec<_>, _>>()?;
        let label: u8 = field(&record, i_label, row, &label_column)?;

        records.push(TrainingRecord {
            machine_id: field(&record, i_machine, row, "machine_id")?,
            timestamp: timestamp_field(&record, i_timestamp, row)?,
            features,
            label: label != 0,
        });
    }

    Ok(TrainingTable {
        schema: FeatureSchema::from_names(feature_columns.into_iter().map(|(_, n)| n).collect()),
        label_column,
        records,
    })
}
