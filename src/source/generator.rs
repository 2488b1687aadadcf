//! Synthetic sensor series with wear-driven health degradation.
//!
//! Each machine gets its own random source derived from `(seed, machine_id)`,
//! so a machine's series is reproducible regardless of how many machines are
//! generated or in what order.

use crate::core::{detect_events, Segments};
use crate::source::types::{MachineSeries, SensorReading};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Duration;
use thiserror::Error;

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub machines: u32,
    pub days: u32,
    /// Spacing between readings, in seconds
    pub sampling_interval_secs: u64,
    pub seed: u64,
    pub start: DateTime<Utc>,
    /// Threshold used to fill the `failed` cross-check column
    pub health_threshold: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            machines: 50,
            days: 60,
            sampling_interval_secs: 600,
            seed: 42,
            // 2024-01-01T00:00:00Z
            start: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
            health_threshold: 0.3,
        }
    }
}

impl GeneratorConfig {
    /// Readings per machine; both ends of the time range are included.
    pub fn steps(&self) -> usize {
        let span = u64::from(self.days) * 86_400;
        (span / self.sampling_interval_secs.max(1)) as usize + 1
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }
}

/// Generator errors.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid noise distribution: {0}")]
    Distribution(String),
    #[error("sampling interval must be positive")]
    ZeroInterval,
}

/// Per-machine baselines and wear parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineProfile {
    pub base_temp: f64,
    pub base_vibration: f64,
    pub base_pressure: f64,
    pub base_load: f64,
    pub base_rpm: f64,
    /// Temperature drift reached at the end of the run
    pub temp_drift: f64,
    pub vibration_drift: f64,
    /// Health lost every step regardless of stress
    pub base_wear: f64,
}

impl MachineProfile {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            base_temp: rng.gen_range(45.0..55.0),
            base_vibration: rng.gen_range(0.8..1.2),
            base_pressure: rng.gen_range(260.0..320.0),
            base_load: rng.gen_range(50.0..70.0),
            base_rpm: rng.gen_range(1500.0..1900.0),
            temp_drift: rng.gen_range(8.0..18.0),
            vibration_drift: rng.gen_range(0.3..0.7),
            base_wear: rng.gen_range(0.000_15..0.000_3),
        }
    }
}

/// Gaussian noise sources for each channel.
struct Noise {
    temp: Normal,
    vibration: Normal,
    pressure: Normal,
    load: Normal,
    rpm: Normal,
}

impl Noise {
    fn new() -> Result<Self, GeneratorError> {
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| GeneratorError::Distribution(e.to_string()))
        };
        Ok(Self {
            temp: normal(1.5)?,
            vibration: normal(0.2)?,
            pressure: normal(5.0)?,
            load: normal(5.0)?,
            rpm: normal(40.0)?,
        })
    }
}

/// Health lost in one step given the current sensor values.
pub fn wear(profile: &MachineProfile, temp: f64, vibration: f64, load: f64) -> f64 {
    let mut stress = 0.0;

    if temp > 65.0 {
        stress += 0.005;
    }
    if temp > 75.0 {
        stress += 0.010;
    }
    if temp > 85.0 {
        stress += 0.015;
    }

    if vibration > 1.8 {
        stress += 0.007;
    }
    if vibration > 2.2 {
        stress += 0.012;
    }
    if vibration > 2.6 {
        stress += 0.018;
    }

    if load > 80.0 {
        stress += 0.005;
    }
    if load > 90.0 {
        stress += 0.010;
    }

    profile.base_wear + stress
}

/// Random source for one machine.
pub fn machine_rng(seed: u64, machine_id: u32) -> StdRng {
    StdRng::seed_from_u64(seed ^ u64::from(machine_id).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Simulate one machine's full series.
pub fn simulate_machine(
    machine_id: u32,
    config: &GeneratorConfig,
) -> Result<MachineSeries, GeneratorError> {
    if config.sampling_interval_secs == 0 {
        return Err(GeneratorError::ZeroInterval);
    }

    let mut rng = machine_rng(config.seed, machine_id);
    let profile = MachineProfile::draw(&mut rng);
    let noise = Noise::new()?;
    let steps = config.steps();
    let interval = chrono::Duration::seconds(config.sampling_interval_secs as i64);
    let last = (steps.saturating_sub(1)).max(1) as f64;

    let mut readings = Vec::with_capacity(steps);
    let mut health = 1.0_f64;

    for step in 0..steps {
        let progress = step as f64 / last;
        let temp = profile.base_temp + profile.temp_drift * progress + rng.sample(&noise.temp);
        let vibration = profile.base_vibration
            + profile.vibration_drift * progress
            + rng.sample(&noise.vibration);
        let pressure = profile.base_pressure + rng.sample(&noise.pressure);
        let load = (profile.base_load + rng.sample(&noise.load)).clamp(10.0, 110.0);
        let rpm = (profile.base_rpm + rng.sample(&noise.rpm)).clamp(800.0, 2200.0);

        if step > 0 {
            health = (health - wear(&profile, temp, vibration, load)).max(0.0);
        }

        readings.push(SensorReading {
            machine_id,
            timestamp: config.start + interval * step as i32,
            temp_c: temp,
            vibration_ms2: vibration,
            pressure_psi: pressure,
            load_pct: load,
            rpm,
            health_score: health,
            failed: None,
        });
    }

    let segments = Segments::split(&readings, interval);
    let events = detect_events(&readings, &segments, config.health_threshold);
    let mut next = events.iter().peekable();
    for reading in &mut readings {
        let is_event = next.peek().is_some_and(|e| e.timestamp == reading.timestamp);
        if is_event {
            next.next();
        }
        reading.failed = Some(is_event);
    }

    Ok(MachineSeries::new(machine_id, readings))
}

/// Simulate every configured machine, ordered by machine id.
pub fn generate(config: &GeneratorConfig) -> Result<Vec<MachineSeries>, GeneratorError> {
    (0..config.machines)
        .map(|machine_id| simulate_machine(machine_id, config))
        .collect()
}
