//! Feature Extractor: raw telemetry snapshot → normalized feature vector.
//!
//! Pure function of the snapshot and the offline normalization table.
//! A snapshot that is missing a required sensor, or carries a reading
//! outside its plausible bounds, cannot be assessed.

use autosense_core::config::FeatureConfig;
use autosense_core::types::{FeatureVector, TelemetrySnapshot, FEATURE_COUNT, FEATURE_NAMES};
use autosense_core::{Agent, AgentName};

use crate::error::{PredictError, Result};

/// Sensors copied straight into the feature layout, in layout order.
const DIRECT_SENSORS: [&str; 8] = [
    "engine_temp",
    "oil_pressure",
    "battery_voltage",
    "rpm",
    "speed",
    "vibration_level",
    "brake_wear",
    "coolant_temp",
];

/// Wheel sensors averaged into `tire_pressure_avg`.
const TIRE_SENSORS: [&str; 4] = [
    "tire_pressure_fl",
    "tire_pressure_fr",
    "tire_pressure_rl",
    "tire_pressure_rr",
];

/// Converts snapshots into feature vectors using one normalization table.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor<'c> {
    config: &'c FeatureConfig,
}

impl<'c> FeatureExtractor<'c> {
    pub fn new(config: &'c FeatureConfig) -> Self {
        Self { config }
    }

    /// Extract the normalized feature vector for `snapshot`.
    pub fn extract(&self, snapshot: &TelemetrySnapshot) -> Result<FeatureVector> {
        let raw = self.raw_features(snapshot)?;

        let mut values = [0.0; FEATURE_COUNT];
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            let scale = self.config.normalization.get(*name).ok_or_else(|| {
                PredictError::Config(format!("normalization table is missing {name}"))
            })?;
            values[i] = (raw[i] - scale.mean) / scale.scale;
        }

        Ok(FeatureVector {
            snapshot_id: snapshot.id,
            vehicle_id: snapshot.vehicle_id.clone(),
            values,
        })
    }

    /// Validated, un-normalized values in layout order.
    pub fn raw_features(&self, snapshot: &TelemetrySnapshot) -> Result<[f64; FEATURE_COUNT]> {
        let mut raw = [0.0; FEATURE_COUNT];

        for (i, sensor) in DIRECT_SENSORS.iter().enumerate() {
            raw[i] = self.checked_reading(snapshot, sensor)?;
        }

        let mut tire_sum = 0.0;
        for sensor in TIRE_SENSORS {
            tire_sum += self.checked_reading(snapshot, sensor)?;
        }
        raw[8] = tire_sum / TIRE_SENSORS.len() as f64;

        raw[9] = self.checked_value(snapshot, "odometer_km", snapshot.meta.odometer_km)?;
        raw[10] = self.checked_value(snapshot, "vehicle_age_days", snapshot.meta.age_days)?;

        Ok(raw)
    }

    fn checked_reading(&self, snapshot: &TelemetrySnapshot, sensor: &str) -> Result<f64> {
        let value = snapshot
            .reading(sensor)
            .ok_or_else(|| invalid(snapshot, format!("missing required sensor {sensor}")))?;
        self.checked_value(snapshot, sensor, value)
    }

    fn checked_value(&self, snapshot: &TelemetrySnapshot, name: &str, value: f64) -> Result<f64> {
        if !value.is_finite() {
            return Err(invalid(snapshot, format!("{name} is not a finite number")));
        }
        if let Some(bounds) = self.config.bounds.get(name) {
            if !bounds.contains(value) {
                return Err(invalid(
                    snapshot,
                    format!(
                        "{name} = {value} outside plausible range [{}, {}]",
                        bounds.min, bounds.max
                    ),
                ));
            }
        }
        Ok(value)
    }
}

fn invalid(snapshot: &TelemetrySnapshot, reason: String) -> PredictError {
    PredictError::InvalidSnapshot {
        vehicle_id: snapshot.vehicle_id.to_string(),
        reason,
    }
}

impl Agent for FeatureExtractor<'_> {
    type Input<'a> = &'a TelemetrySnapshot;
    type Output = FeatureVector;
    type Error = PredictError;

    fn name(&self) -> AgentName {
        AgentName::FeatureExtractor
    }

    fn invoke(&self, snapshot: &TelemetrySnapshot) -> Result<FeatureVector> {
        self.extract(snapshot)
    }
}
