//! Prediction Agent: feature vector → assessment.

use autosense_core::types::{Assessment, AssessmentId, FeatureVector};
use autosense_core::{Agent, AgentName};
use chrono::Utc;

use crate::error::{PredictError, Result};
use crate::model::ModelBundle;
use crate::scoring;

/// Scores feature vectors against one model bundle snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PredictionAgent<'b> {
    bundle: &'b ModelBundle,
}

impl<'b> PredictionAgent<'b> {
    pub fn new(bundle: &'b ModelBundle) -> Self {
        Self { bundle }
    }

    /// Produce an assessment. Fails with `ModelUnavailable` when either
    /// estimator is missing or returns a non-finite or malformed score;
    /// never falls back to a benign verdict.
    pub fn assess(&self, vector: &FeatureVector) -> Result<Assessment> {
        let detector = self
            .bundle
            .detector
            .as_deref()
            .ok_or_else(|| unavailable("no anomaly detector loaded"))?;
        let classifier = self
            .bundle
            .classifier
            .as_deref()
            .ok_or_else(|| unavailable("no risk classifier loaded"))?;
        let config = &self.bundle.config.prediction;

        let raw = detector.raw_score(vector.as_slice());
        let anomaly_score = detector.normalize(raw);
        if !raw.is_finite() || !anomaly_score.is_finite() || !(0.0..=1.0).contains(&anomaly_score) {
            return Err(unavailable(&format!(
                "anomaly detector returned an invalid score (raw {raw}, normalized {anomaly_score})"
            )));
        }

        let probabilities = classifier.predict_proba(vector.as_slice());
        if !probabilities.is_well_formed() {
            return Err(unavailable(&format!(
                "risk classifier returned a malformed distribution {probabilities:?}"
            )));
        }
        let failure_mass = probabilities.failure_mass().clamp(0.0, 1.0);

        let risk_score = scoring::fuse(anomaly_score, failure_mass, config.fusion_weight);
        let risk_class = config.cut_points.classify(risk_score);
        let is_anomalous = risk_score >= config.anomaly_threshold;
        let contributions = scoring::contributions(detector, vector.as_slice(), config.top_k);

        tracing::debug!(
            vehicle_id = %vector.vehicle_id,
            risk_score,
            anomaly_score,
            failure_mass,
            risk_class = risk_class.as_str(),
            is_anomalous,
            "Assessment produced"
        );

        Ok(Assessment {
            id: AssessmentId::new(),
            vehicle_id: vector.vehicle_id.clone(),
            snapshot_id: vector.snapshot_id,
            is_anomalous,
            risk_score,
            risk_class,
            anomaly_score,
            failure_mass,
            contributions,
            assessed_at: Utc::now(),
        })
    }
}

fn unavailable(reason: &str) -> PredictError {
    PredictError::ModelUnavailable {
        reason: reason.to_string(),
    }
}

impl Agent for PredictionAgent<'_> {
    type Input<'a> = &'a FeatureVector;
    type Output = Assessment;
    type Error = PredictError;

    fn name(&self) -> AgentName {
        AgentName::Prediction
    }

    fn invoke(&self, vector: &FeatureVector) -> Result<Assessment> {
        self.assess(vector)
    }
}
