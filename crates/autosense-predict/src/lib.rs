//! autosense-predict: Feature extraction and risk assessment.
//!
//! Turns a raw telemetry snapshot into a normalized feature vector, scores
//! it with an anomaly detector and a risk classifier, fuses the two into a
//! risk score and class, and attributes the verdict to individual features.

pub mod agent;
pub mod error;
pub mod features;
pub mod model;
pub mod scoring;

pub use agent::PredictionAgent;
pub use error::PredictError;
pub use features::FeatureExtractor;
pub use model::{
    AnomalyDetector, ClassProbabilities, ConfigHandle, ModelBundle, ModelParams, RiskClassifier,
};
