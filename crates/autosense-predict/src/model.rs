//! Estimator contracts and the immutable model bundle.
//!
//! The Prediction Agent composes two independent estimators over the
//! normalized feature vector:
//! - an [`AnomalyDetector`] measuring distance from normal operation, and
//! - a [`RiskClassifier`] producing a distribution over risk classes.
//!
//! How the estimators are trained is outside this crate. The reference
//! implementations here are parameterized from the fleet's normal and
//! failing operating distributions and load from JSON, so a trained model
//! can replace them without code changes.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use autosense_core::config::PipelineConfig;
use autosense_core::types::FEATURE_COUNT;
use autosense_core::Reloadable;
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};

/// Unsupervised anomaly estimator.
pub trait AnomalyDetector: Send + Sync {
    /// Distance-like score; higher means further from normal operation.
    fn raw_score(&self, features: &[f64]) -> f64;

    /// Monotone map of a raw score into `[0, 1]`.
    fn normalize(&self, raw: f64) -> f64;

    /// The value a feature takes under normal operation. Used when a
    /// feature is ablated to measure its contribution.
    fn reference_value(&self, index: usize) -> f64;
}

/// Supervised failure-risk estimator.
pub trait RiskClassifier: Send + Sync {
    fn predict_proba(&self, features: &[f64]) -> ClassProbabilities;
}

/// Probability distribution over risk classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassProbabilities {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl ClassProbabilities {
    /// Probability mass on `{high, critical}`.
    pub fn failure_mass(&self) -> f64 {
        self.high + self.critical
    }

    /// Finite, non-negative, and summing to one.
    pub fn is_well_formed(&self) -> bool {
        let parts = [self.low, self.medium, self.high, self.critical];
        let sum: f64 = parts.iter().sum();
        parts.iter().all(|p| p.is_finite() && *p >= 0.0) && (sum - 1.0).abs() < 1e-6
    }
}

// ── Reference estimators ─────────────────────────────────────────

/// Parameters of [`BaselineDistanceDetector`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorParams {
    /// Centre of normal operation in normalized feature space.
    pub center: Vec<f64>,
    /// Raw score mapped to 0.5.
    pub midpoint: f64,
    /// Logistic slope at the midpoint.
    pub steepness: f64,
}

/// RMS distance from the normal centre, squashed with a logistic.
#[derive(Debug, Clone)]
pub struct BaselineDistanceDetector {
    params: DetectorParams,
}

impl BaselineDistanceDetector {
    pub fn new(params: DetectorParams) -> Result<Self> {
        check_len("detector.center", &params.center)?;
        if !(params.steepness > 0.0 && params.steepness.is_finite() && params.midpoint.is_finite()) {
            return Err(PredictError::ModelUnavailable {
                reason: "detector needs a finite midpoint and positive steepness".to_string(),
            });
        }
        Ok(Self { params })
    }
}

impl AnomalyDetector for BaselineDistanceDetector {
    fn raw_score(&self, features: &[f64]) -> f64 {
        let n = features.len().min(self.params.center.len());
        if n == 0 {
            return 0.0;
        }
        let sq: f64 = features
            .iter()
            .zip(&self.params.center)
            .map(|(x, c)| (x - c).powi(2))
            .sum();
        (sq / n as f64).sqrt()
    }

    fn normalize(&self, raw: f64) -> f64 {
        1.0 / (1.0 + (-self.params.steepness * (raw - self.params.midpoint)).exp())
    }

    fn reference_value(&self, index: usize) -> f64 {
        self.params.center.get(index).copied().unwrap_or(0.0)
    }
}

/// Parameters of [`CentroidRiskClassifier`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierParams {
    pub low: Vec<f64>,
    pub medium: Vec<f64>,
    pub high: Vec<f64>,
    pub critical: Vec<f64>,
    /// Softmax temperature over negative squared distance.
    pub temperature: f64,
}

/// Nearest-centroid classifier with a softmax over squared distances.
#[derive(Debug, Clone)]
pub struct CentroidRiskClassifier {
    params: ClassifierParams,
}

impl CentroidRiskClassifier {
    pub fn new(params: ClassifierParams) -> Result<Self> {
        check_len("classifier.low", &params.low)?;
        check_len("classifier.medium", &params.medium)?;
        check_len("classifier.high", &params.high)?;
        check_len("classifier.critical", &params.critical)?;
        if !(params.temperature > 0.0 && params.temperature.is_finite()) {
            return Err(PredictError::ModelUnavailable {
                reason: "classifier temperature must be positive".to_string(),
            });
        }
        Ok(Self { params })
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

impl RiskClassifier for CentroidRiskClassifier {
    fn predict_proba(&self, features: &[f64]) -> ClassProbabilities {
        let p = &self.params;
        let logits = [&p.low, &p.medium, &p.high, &p.critical]
            .map(|centroid| -squared_distance(features, centroid) / p.temperature);
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp = logits.map(|l| (l - max).exp());
        let sum: f64 = exp.iter().sum();
        ClassProbabilities {
            low: exp[0] / sum,
            medium: exp[1] / sum,
            high: exp[2] / sum,
            critical: exp[3] / sum,
        }
    }
}

fn check_len(field: &str, values: &[f64]) -> Result<()> {
    if values.len() != FEATURE_COUNT {
        return Err(PredictError::ModelUnavailable {
            reason: format!(
                "{field} has {} values, feature layout has {FEATURE_COUNT}",
                values.len()
            ),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PredictError::ModelUnavailable {
            reason: format!("{field} contains a non-finite value"),
        });
    }
    Ok(())
}

/// Serialized estimator parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParams {
    pub detector: DetectorParams,
    pub classifier: ClassifierParams,
}

impl ModelParams {
    /// Parameters derived from the fleet's normal and failing operating
    /// profiles, in units of the default normalization table.
    pub fn reference() -> Self {
        // Failing-vehicle profile: 115 °C engine, 20 psi oil, 11.0 V battery,
        // 5500 rpm, 40 km/h, 3.5 vibration, 65% brake wear, 115 °C coolant,
        // 28 psi tyres, on older, higher-mileage vehicles.
        let failing = [4.0, -2.5, -5.0, 2.5, -1.0, 8.33, 4.5, 5.0, -4.0, 0.5, 0.5];
        let scaled = |k: f64| failing.iter().map(|v| v * k).collect::<Vec<_>>();
        Self {
            detector: DetectorParams {
                center: vec![0.0; FEATURE_COUNT],
                midpoint: 2.0,
                steepness: 2.5,
            },
            classifier: ClassifierParams {
                low: scaled(0.0),
                medium: scaled(0.35),
                high: scaled(0.7),
                critical: scaled(1.0),
                temperature: 8.0,
            },
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ── Bundle ───────────────────────────────────────────────────────

/// Configuration plus loaded estimators, swapped as one unit.
#[derive(Clone)]
pub struct ModelBundle {
    pub config: PipelineConfig,
    pub detector: Option<Arc<dyn AnomalyDetector>>,
    pub classifier: Option<Arc<dyn RiskClassifier>>,
}

/// Reload handle for the active bundle. Each run captures one snapshot.
pub type ConfigHandle = Reloadable<ModelBundle>;

impl ModelBundle {
    /// Validate `config` and load the estimators it points to.
    ///
    /// With no `model_path` and `reference_model = false` the bundle is
    /// built without estimators; every assessment then fails with
    /// `ModelUnavailable`.
    pub fn load(config: PipelineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PredictError::Config(e.to_string()))?;

        let params = match (&config.prediction.model_path, config.prediction.reference_model) {
            (Some(path), _) => Some(ModelParams::from_file(path).map_err(|e| {
                PredictError::ModelUnavailable {
                    reason: format!("failed to load {path}: {e}"),
                }
            })?),
            (None, true) => Some(ModelParams::reference()),
            (None, false) => None,
        };

        match params {
            Some(params) => Self::from_params(config, params),
            None => {
                tracing::warn!("No estimator configured; assessments will fail");
                Ok(Self {
                    config,
                    detector: None,
                    classifier: None,
                })
            }
        }
    }

    /// Like `load`, but estimators that cannot be loaded leave the bundle
    /// unloaded and the reason is handed back for a platform alert. Config
    /// errors still fail.
    pub fn load_or_degrade(config: PipelineConfig) -> Result<(Self, Option<String>)> {
        match Self::load(config.clone()) {
            Ok(bundle) => Ok((bundle, None)),
            Err(PredictError::ModelUnavailable { reason }) => {
                tracing::error!(reason = %reason, "Estimators not loaded; assessments will fail");
                Ok((Self::unloaded(config), Some(reason)))
            }
            Err(e) => Err(e),
        }
    }

    pub fn from_params(config: PipelineConfig, params: ModelParams) -> Result<Self> {
        let detector = BaselineDistanceDetector::new(params.detector)?;
        let classifier = CentroidRiskClassifier::new(params.classifier)?;
        Ok(Self::with_estimators(
            config,
            Arc::new(detector),
            Arc::new(classifier),
        ))
    }

    pub fn with_estimators(
        config: PipelineConfig,
        detector: Arc<dyn AnomalyDetector>,
        classifier: Arc<dyn RiskClassifier>,
    ) -> Self {
        Self {
            config,
            detector: Some(detector),
            classifier: Some(classifier),
        }
    }

    /// A bundle with no estimators loaded.
    pub fn unloaded(config: PipelineConfig) -> Self {
        Self {
            config,
            detector: None,
            classifier: None,
        }
    }
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("config", &self.config)
            .field("detector", &self.detector.is_some())
            .field("classifier", &self.classifier.is_some())
            .finish()
    }
}
