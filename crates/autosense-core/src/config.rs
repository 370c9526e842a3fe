//! Configuration for the AutoSense pipeline.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (AUTOSENSE__ prefix, `__` separator)
//! 2. Config file (autosense.toml)
//! 3. Defaults
//!
//! The loaded configuration is immutable. Operators retune the pipeline by
//! building a new bundle and swapping it into a [`Reloadable`] handle; runs
//! already in flight keep the bundle they started with.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::AutosenseError;
use crate::types::{RiskClass, Subsystem, UrgencyTier, FEATURE_NAMES};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub diagnosis: DiagnosisConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub customer: CustomerConfig,
    #[serde(default)]
    pub rca: RcaConfig,
}

impl PipelineConfig {
    /// Reject configurations that would break scoring or scheduling invariants.
    pub fn validate(&self) -> Result<(), AutosenseError> {
        let p = &self.prediction;
        if !(0.0..=1.0).contains(&p.anomaly_threshold) {
            return Err(AutosenseError::Config(format!(
                "prediction.anomaly_threshold must be within [0, 1], got {}",
                p.anomaly_threshold
            )));
        }
        if !(0.0..=1.0).contains(&p.fusion_weight) {
            return Err(AutosenseError::Config(format!(
                "prediction.fusion_weight must be within [0, 1], got {}",
                p.fusion_weight
            )));
        }
        p.cut_points.validate()?;
        if p.top_k == 0 {
            return Err(AutosenseError::Config(
                "prediction.top_k must be at least 1".to_string(),
            ));
        }

        for name in FEATURE_NAMES {
            match self.features.normalization.get(name) {
                Some(scale) if scale.scale > 0.0 && scale.scale.is_finite() => {}
                Some(_) => {
                    return Err(AutosenseError::Config(format!(
                        "features.normalization.{name}.scale must be positive"
                    )))
                }
                None => {
                    return Err(AutosenseError::Config(format!(
                        "features.normalization is missing {name}"
                    )))
                }
            }
        }
        for (sensor, bounds) in &self.features.bounds {
            if bounds.min > bounds.max {
                return Err(AutosenseError::Config(format!(
                    "features.bounds.{sensor}: min {} exceeds max {}",
                    bounds.min, bounds.max
                )));
            }
        }

        for (feature, weights) in &self.diagnosis.subsystem_map {
            if weights.iter().any(|w| w.weight < 0.0 || !w.weight.is_finite()) {
                return Err(AutosenseError::Config(format!(
                    "diagnosis.subsystem_map.{feature} has a negative or non-finite weight"
                )));
            }
        }

        for tier in [
            UrgencyTier::Routine,
            UrgencyTier::Soon,
            UrgencyTier::Urgent,
            UrgencyTier::Immediate,
        ] {
            let limits = self.scheduling.urgency.limits(tier);
            if limits.max_radius_km <= 0.0 || limits.max_delay_hours == 0 {
                return Err(AutosenseError::Config(format!(
                    "scheduling.urgency.{} needs a positive radius and delay",
                    tier.as_str()
                )));
            }
        }
        if self.scheduling.retry_radius_factor < 1.0 {
            return Err(AutosenseError::Config(
                "scheduling.retry_radius_factor must be >= 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

// ── Prediction ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Fused risk score at or above which an assessment is anomalous.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Risk-class cut points on the fused score.
    #[serde(default)]
    pub cut_points: CutPoints,

    /// Weight of the normalized anomaly score in the fused risk score.
    /// The classifier's `{high, critical}` mass gets `1 - fusion_weight`.
    #[serde(default = "default_fusion_weight")]
    pub fusion_weight: f64,

    /// Number of contributing features retained on an assessment.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Path to JSON estimator parameters.
    #[serde(default)]
    pub model_path: Option<String>,

    /// Fall back to the built-in reference estimators when no model path is set.
    #[serde(default = "default_true")]
    pub reference_model: bool,
}

/// Lower bounds (inclusive) of the medium, high, and critical classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CutPoints {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for CutPoints {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.6,
            critical: 0.85,
        }
    }
}

impl CutPoints {
    pub fn validate(&self) -> Result<(), AutosenseError> {
        let ordered = 0.0 < self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical < 1.0;
        if !ordered {
            return Err(AutosenseError::Config(format!(
                "prediction.cut_points must satisfy 0 < medium < high < critical < 1, got {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Non-decreasing step function of the score.
    pub fn classify(&self, score: f64) -> RiskClass {
        if score >= self.critical {
            RiskClass::Critical
        } else if score >= self.high {
            RiskClass::High
        } else if score >= self.medium {
            RiskClass::Medium
        } else {
            RiskClass::Low
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: default_anomaly_threshold(),
            cut_points: CutPoints::default(),
            fusion_weight: default_fusion_weight(),
            top_k: default_top_k(),
            model_path: None,
            reference_model: true,
        }
    }
}

fn default_anomaly_threshold() -> f64 {
    0.6
}

fn default_fusion_weight() -> f64 {
    0.5
}

fn default_top_k() -> usize {
    5
}

fn default_true() -> bool {
    true
}

// ── Features ──────────────────────────────────────────────────────

/// Offline-computed normalization for one feature: `(x - mean) / scale`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureScale {
    pub mean: f64,
    pub scale: f64,
}

/// Physically plausible range of a raw sensor reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Keyed by feature name; must cover the full feature layout.
    #[serde(default = "default_normalization")]
    pub normalization: BTreeMap<String, FeatureScale>,

    /// Keyed by raw sensor or metadata name.
    #[serde(default = "default_bounds")]
    pub bounds: BTreeMap<String, Bounds>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            normalization: default_normalization(),
            bounds: default_bounds(),
        }
    }
}

fn default_normalization() -> BTreeMap<String, FeatureScale> {
    [
        ("engine_temp", 95.0, 5.0),
        ("oil_pressure", 45.0, 10.0),
        ("battery_voltage", 13.5, 0.5),
        ("rpm", 3000.0, 1000.0),
        ("speed", 60.0, 20.0),
        ("vibration_level", 1.0, 0.3),
        ("brake_wear", 20.0, 10.0),
        ("coolant_temp", 90.0, 5.0),
        ("tire_pressure_avg", 32.0, 1.0),
        ("odometer_km", 60_000.0, 40_000.0),
        ("vehicle_age_days", 1095.0, 730.0),
    ]
    .into_iter()
    .map(|(name, mean, scale)| (name.to_string(), FeatureScale { mean, scale }))
    .collect()
}

fn default_bounds() -> BTreeMap<String, Bounds> {
    [
        ("engine_temp", -40.0, 200.0),
        ("oil_pressure", 0.0, 150.0),
        ("battery_voltage", 0.0, 30.0),
        ("rpm", 0.0, 12_000.0),
        ("speed", 0.0, 300.0),
        ("vibration_level", 0.0, 20.0),
        ("brake_wear", 0.0, 100.0),
        ("coolant_temp", -40.0, 200.0),
        ("tire_pressure_fl", 0.0, 80.0),
        ("tire_pressure_fr", 0.0, 80.0),
        ("tire_pressure_rl", 0.0, 80.0),
        ("tire_pressure_rr", 0.0, 80.0),
        ("odometer_km", 0.0, 2_000_000.0),
        ("vehicle_age_days", 0.0, 20_000.0),
    ]
    .into_iter()
    .map(|(name, min, max)| (name.to_string(), Bounds { min, max }))
    .collect()
}

// ── Diagnosis ─────────────────────────────────────────────────────

/// How strongly a feature implicates a subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SubsystemWeight {
    pub subsystem: Subsystem,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisConfig {
    /// Feature name → implicated subsystems. Many-to-one and one-to-many.
    #[serde(default = "default_subsystem_map")]
    pub subsystem_map: BTreeMap<String, Vec<SubsystemWeight>>,

    /// Prior failure base rate per subsystem label (failures per vehicle-year),
    /// used when the fleet has no history for a vehicle model.
    #[serde(default = "default_base_rates")]
    pub base_rates: BTreeMap<String, f64>,

    /// Implicated weights closer than this are treated as tied.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            subsystem_map: default_subsystem_map(),
            base_rates: default_base_rates(),
            tie_epsilon: default_tie_epsilon(),
        }
    }
}

impl DiagnosisConfig {
    pub fn prior_base_rate(&self, subsystem: Subsystem) -> f64 {
        self.base_rates
            .get(subsystem.label())
            .copied()
            .unwrap_or(0.0)
    }
}

fn default_subsystem_map() -> BTreeMap<String, Vec<SubsystemWeight>> {
    use Subsystem::*;
    let entries: [(&str, &[(Subsystem, f64)]); 9] = [
        ("engine_temp", &[(Engine, 0.6), (CoolingSystem, 0.4)]),
        ("oil_pressure", &[(Engine, 1.0)]),
        ("battery_voltage", &[(Battery, 1.0)]),
        ("rpm", &[(Engine, 0.5), (Transmission, 0.5)]),
        ("speed", &[(Transmission, 1.0)]),
        (
            "vibration_level",
            &[(Engine, 0.4), (Brakes, 0.3), (Transmission, 0.3)],
        ),
        ("brake_wear", &[(Brakes, 1.0)]),
        ("coolant_temp", &[(CoolingSystem, 1.0)]),
        ("tire_pressure_avg", &[(Tires, 1.0)]),
    ];
    entries
        .into_iter()
        .map(|(feature, weights)| {
            let weights = weights
                .iter()
                .map(|&(subsystem, weight)| SubsystemWeight { subsystem, weight })
                .collect();
            (feature.to_string(), weights)
        })
        .collect()
}

/// Derived from mean time between failures: 365 / mtbf_days.
fn default_base_rates() -> BTreeMap<String, f64> {
    [
        (Subsystem::Engine, 365.0 / 365.0),
        (Subsystem::Battery, 365.0 / 730.0),
        (Subsystem::Brakes, 365.0 / 180.0),
        (Subsystem::CoolingSystem, 365.0 / 545.0),
        (Subsystem::Tires, 365.0 / 365.0),
        (Subsystem::Transmission, 365.0 / 730.0),
        (Subsystem::Other, 0.1),
    ]
    .into_iter()
    .map(|(s, rate)| (s.label().to_string(), rate))
    .collect()
}

fn default_tie_epsilon() -> f64 {
    1e-9
}

// ── Scheduling ────────────────────────────────────────────────────

/// Search constraints for one urgency tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UrgencyLimits {
    /// Maximum acceptable travel distance.
    pub max_radius_km: f64,
    /// Latest acceptable slot, in hours from now.
    pub max_delay_hours: u32,
    /// Only centers specialised in the diagnosed subsystem qualify.
    pub require_specialty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrgencyTable {
    pub routine: UrgencyLimits,
    pub soon: UrgencyLimits,
    pub urgent: UrgencyLimits,
    pub immediate: UrgencyLimits,
}

impl UrgencyTable {
    pub fn limits(&self, tier: UrgencyTier) -> UrgencyLimits {
        match tier {
            UrgencyTier::Routine => self.routine,
            UrgencyTier::Soon => self.soon,
            UrgencyTier::Urgent => self.urgent,
            UrgencyTier::Immediate => self.immediate,
        }
    }
}

impl Default for UrgencyTable {
    fn default() -> Self {
        Self {
            routine: UrgencyLimits {
                max_radius_km: 25.0,
                max_delay_hours: 14 * 24,
                require_specialty: false,
            },
            soon: UrgencyLimits {
                max_radius_km: 50.0,
                max_delay_hours: 7 * 24,
                require_specialty: false,
            },
            urgent: UrgencyLimits {
                max_radius_km: 100.0,
                max_delay_hours: 72,
                require_specialty: true,
            },
            immediate: UrgencyLimits {
                max_radius_km: 200.0,
                max_delay_hours: 48,
                require_specialty: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default)]
    pub urgency: UrgencyTable,

    /// Radius multiplier applied on the single retry after `NoCapacityAvailable`.
    #[serde(default = "default_retry_radius_factor")]
    pub retry_radius_factor: f64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            urgency: UrgencyTable::default(),
            retry_radius_factor: default_retry_radius_factor(),
        }
    }
}

fn default_retry_radius_factor() -> f64 {
    1.5
}

// ── Customer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerConfig {
    /// How long to wait for an owner response before the booking expires.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for CustomerConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_response_timeout_ms() -> u64 {
    15 * 60 * 1000
}

// ── RCA ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaConfig {
    /// Number of recurring subsystems reported.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Length of the current (and prior) aggregation window.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Period of scheduled recomputation.
    #[serde(default = "default_rca_interval")]
    pub interval_secs: u64,

    /// Distinct affected vehicles above which manufacturing must act.
    #[serde(default = "default_oem_threshold")]
    pub oem_action_min_vehicles: usize,
}

impl Default for RcaConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            window_hours: default_window_hours(),
            interval_secs: default_rca_interval(),
            oem_action_min_vehicles: default_oem_threshold(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

fn default_window_hours() -> u64 {
    7 * 24
}

fn default_rca_interval() -> u64 {
    3600
}

fn default_oem_threshold() -> usize {
    3
}

// ── Reload ────────────────────────────────────────────────────────

/// An immutable value that can be replaced wholesale.
///
/// Readers get an `Arc` snapshot; a swap never mutates a snapshot that is
/// already handed out.
#[derive(Debug)]
pub struct Reloadable<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> Reloadable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(Arc::new(value)),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<T> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Atomically replace the value, returning the previous snapshot.
    pub fn reload(&self, value: T) -> Arc<T> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::mem::replace(&mut *guard, Arc::new(value));
        tracing::info!("Configuration bundle swapped");
        previous
    }
}
