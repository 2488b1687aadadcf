//! Reading and series types shared by every pipeline stage.
//!
//! Readings are immutable once produced; stages only ever borrow them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw sensor sample for a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub machine_id: u32,
    pub timestamp: DateTime<Utc>,
    /// Temperature in °C
    pub temp_c: f64,
    /// Vibration in m/s²
    pub vibration_ms2: f64,
    /// Pressure in psi
    pub pressure_psi: f64,
    /// Load in percent of rated capacity
    pub load_pct: f64,
    pub rpm: f64,
    /// Health in [0, 1]; only used to derive failure events, never as a feature
    pub health_score: f64,
    /// Optional upstream failure flag, used as a cross-check only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,
}

impl SensorReading {
    /// Value of a raw channel.
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::TempC => self.temp_c,
            Channel::VibrationMs2 => self.vibration_ms2,
            Channel::PressurePsi => self.pressure_psi,
            Channel::LoadPct => self.load_pct,
            Channel::Rpm => self.rpm,
        }
    }
}

/// Raw sensor channels that feed the rolling features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    TempC,
    VibrationMs2,
    PressurePsi,
    LoadPct,
    Rpm,
}

impl Channel {
    /// All channels in column order.
    pub const ALL: [Channel; 5] = [
        Channel::TempC,
        Channel::VibrationMs2,
        Channel::PressurePsi,
        Channel::LoadPct,
        Channel::Rpm,
    ];

    /// Column name in the input and training tables.
    pub fn column(&self) -> &'static str {
        match self {
            Channel::TempC => "temp_c",
            Channel::VibrationMs2 => "vibration_ms2",
            Channel::PressurePsi => "pressure_psi",
            Channel::LoadPct => "load_pct",
            Channel::Rpm => "rpm",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Chronologically ordered readings of a single machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSeries {
    pub machine_id: u32,
    pub readings: Vec<SensorReading>,
}

impl MachineSeries {
    /// Build a series, sorting readings by timestamp.
    ///
    /// The sort is stable so duplicate timestamps keep their input order and
    /// are later reported as irregular spacing.
    pub fn new(machine_id: u32, mut readings: Vec<SensorReading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        Self {
            machine_id,
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Timestamps of the readings, in order.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.readings.iter().map(|r| r.timestamp).collect()
    }
}
