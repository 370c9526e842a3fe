//! Risk fusion and feature contribution scoring.
//!
//! Formula: `risk = w × anomaly + (1 − w) × P(high ∪ critical)`, clamped to `[0, 1]`.
//! Contribution of feature `i` = drop in the raw anomaly score when `i` is
//! reset to its normal-operation value.

use autosense_core::types::{Contribution, FEATURE_NAMES};

use crate::model::AnomalyDetector;

/// Fuse the normalized anomaly score with the classifier's failure mass.
pub fn fuse(anomaly_score: f64, failure_mass: f64, fusion_weight: f64) -> f64 {
    let w = fusion_weight.clamp(0.0, 1.0);
    (w * anomaly_score + (1.0 - w) * failure_mass).clamp(0.0, 1.0)
}

/// Per-feature marginal effect on the anomaly score.
///
/// Only features with a positive effect are kept. Sorted by descending
/// weight; equal weights keep layout order. At most `top_k` are returned.
pub fn contributions(
    detector: &dyn AnomalyDetector,
    values: &[f64],
    top_k: usize,
) -> Vec<Contribution> {
    let base = detector.raw_score(values);
    let mut ablated = values.to_vec();

    let mut scored: Vec<(usize, f64)> = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let original = ablated[i];
        ablated[i] = detector.reference_value(i);
        let delta = base - detector.raw_score(&ablated);
        ablated[i] = original;

        if delta.is_finite() && delta > 0.0 {
            scored.push((i, delta));
        }
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(top_k);

    scored
        .into_iter()
        .filter_map(|(i, weight)| {
            FEATURE_NAMES.get(i).map(|name| Contribution {
                feature: name.to_string(),
                weight,
            })
        })
        .collect()
}
