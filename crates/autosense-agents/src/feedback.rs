//! Append-only fleet feedback log.
//!
//! Every diagnosis lands here as a `FeedbackRecord`. Pipeline runs append
//! concurrently; the RCA Feedback Agent and the Diagnosis tie-break read
//! snapshots by vehicle model or time window.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use autosense_core::types::{FeedbackRecord, Subsystem, VehicleId};
use chrono::{DateTime, Duration, Utc};

/// Historical failure frequency, as seen by the Diagnosis Agent.
pub trait FailureHistory: Send + Sync {
    /// Share of recorded failures for `model` per subsystem. Subsystems
    /// with no failures are absent. `None` when the fleet has no history
    /// for the model at all.
    fn subsystem_shares(&self, model: &str) -> Option<BTreeMap<Subsystem, f64>>;

    /// Share of recorded failures for `model` attributed to `subsystem`.
    fn subsystem_frequency(&self, model: &str, subsystem: Subsystem) -> Option<f64> {
        self.subsystem_shares(model)
            .map(|shares| shares.get(&subsystem).copied().unwrap_or(0.0))
    }
}

/// No fleet history; the Diagnosis Agent falls back to configured priors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl FailureHistory for NoHistory {
    fn subsystem_shares(&self, _model: &str) -> Option<BTreeMap<Subsystem, f64>> {
        None
    }
}

/// Two adjacent time windows of feedback records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackWindow {
    pub current: Vec<FeedbackRecord>,
    pub prior: Vec<FeedbackRecord>,
}

#[derive(Debug, Default)]
pub struct FeedbackLog {
    state: RwLock<LogState>,
}

#[derive(Debug, Default)]
struct LogState {
    records: Vec<FeedbackRecord>,
    /// Failure counts per vehicle model, kept current on append.
    by_model: HashMap<String, BTreeMap<Subsystem, usize>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: FeedbackRecord) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!(
            diagnosis_id = %record.diagnosis_id,
            vehicle_id = %record.vehicle_id,
            subsystem = %record.subsystem,
            "Feedback recorded"
        );
        *state
            .by_model
            .entry(record.cohort.model.clone())
            .or_default()
            .entry(record.subsystem)
            .or_default() += 1;
        state.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.read(|records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record, in append order.
    pub fn snapshot(&self) -> Vec<FeedbackRecord> {
        self.read(|records| records.to_vec())
    }

    pub fn for_vehicle(&self, vehicle_id: &VehicleId) -> Vec<FeedbackRecord> {
        self.read(|records| {
            records
                .iter()
                .filter(|r| &r.vehicle_id == vehicle_id)
                .cloned()
                .collect()
        })
    }

    /// Records in `(end - length, end]` and the equally long window before it.
    pub fn window(&self, end: DateTime<Utc>, length: Duration) -> FeedbackWindow {
        let current_start = end - length;
        let prior_start = current_start - length;
        self.read(|records| {
            let mut window = FeedbackWindow::default();
            for r in records {
                if r.recorded_at > current_start && r.recorded_at <= end {
                    window.current.push(r.clone());
                } else if r.recorded_at > prior_start && r.recorded_at <= current_start {
                    window.prior.push(r.clone());
                }
            }
            window
        })
    }

    fn read<T>(&self, f: impl FnOnce(&[FeedbackRecord]) -> T) -> T {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&state.records)
    }
}

impl FailureHistory for FeedbackLog {
    fn subsystem_shares(&self, model: &str) -> Option<BTreeMap<Subsystem, f64>> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counts = state.by_model.get(model)?;
        let total: usize = counts.values().sum();
        if total == 0 {
            return None;
        }
        Some(
            counts
                .iter()
                .map(|(subsystem, count)| (*subsystem, *count as f64 / total as f64))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosense_core::types::{CohortTags, DiagnosisId};

    fn record(vehicle: &str, model: &str, subsystem: Subsystem, hours_ago: i64) -> FeedbackRecord {
        FeedbackRecord {
            diagnosis_id: DiagnosisId::new(),
            vehicle_id: VehicleId::new(vehicle),
            subsystem,
            confidence: 0.8,
            cohort: CohortTags {
                model: model.to_string(),
                production_batch: "B1".to_string(),
            },
            recorded_at: Utc::now() - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn frequency_is_per_model() {
        let log = FeedbackLog::new();
        log.append(record("V1", "XUV700", Subsystem::Brakes, 1));
        log.append(record("V2", "XUV700", Subsystem::Brakes, 1));
        log.append(record("V3", "XUV700", Subsystem::Engine, 1));
        log.append(record("V4", "Splendor", Subsystem::Battery, 1));

        let brakes = log.subsystem_frequency("XUV700", Subsystem::Brakes).unwrap();
        assert!((brakes - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(log.subsystem_frequency("XUV700", Subsystem::Tires), Some(0.0));
        assert_eq!(log.subsystem_frequency("Thar", Subsystem::Engine), None);

        let shares = log.subsystem_shares("Splendor").unwrap();
        assert_eq!(shares.get(&Subsystem::Battery), Some(&1.0));
        assert_eq!(shares.len(), 1);
    }

    #[test]
    fn window_splits_current_and_prior() {
        let log = FeedbackLog::new();
        log.append(record("V1", "XUV700", Subsystem::Brakes, 1));
        log.append(record("V2", "XUV700", Subsystem::Brakes, 30));
        log.append(record("V3", "XUV700", Subsystem::Brakes, 60));

        let window = log.window(Utc::now(), Duration::hours(24));
        assert_eq!(window.current.len(), 1);
        assert_eq!(window.prior.len(), 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn for_vehicle_keeps_append_order() {
        let log = FeedbackLog::new();
        log.append(record("V1", "XUV700", Subsystem::Brakes, 2));
        log.append(record("V2", "XUV700", Subsystem::Engine, 2));
        log.append(record("V1", "XUV700", Subsystem::Tires, 1));

        let history = log.for_vehicle(&VehicleId::new("V1"));
        let subsystems: Vec<Subsystem> = history.iter().map(|r| r.subsystem).collect();
        assert_eq!(subsystems, vec![Subsystem::Brakes, Subsystem::Tires]);
    }
}
