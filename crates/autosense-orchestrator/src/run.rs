//! Terminal summaries of pipeline runs, queryable per vehicle.

use std::collections::HashMap;
use std::sync::RwLock;

use autosense_core::types::{
    AssessmentId, BookingId, BookingStatus, DiagnosisId, FailureKind, RiskClass, RunId, RunState,
    VehicleId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How one run ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub vehicle_id: VehicleId,
    pub state: RunState,
    /// Set for `failed` runs and for runs closed without an owner answer.
    pub failure: Option<FailureKind>,
    pub assessment_id: Option<AssessmentId>,
    pub diagnosis_id: Option<DiagnosisId>,
    pub booking_id: Option<BookingId>,
    pub booking_status: Option<BookingStatus>,
    pub risk_score: Option<f64>,
    pub risk_class: Option<RiskClass>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub event_count: u32,
}

impl RunSummary {
    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }
}

/// Every terminal run, grouped by vehicle in completion order.
///
/// Runs for one vehicle are serialized by the orchestrator, so completion
/// order equals submission order within a vehicle.
#[derive(Debug, Default)]
pub struct RunLedger {
    runs: RwLock<HashMap<VehicleId, Vec<RunSummary>>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, summary: RunSummary) {
        let mut runs = self
            .runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        runs.entry(summary.vehicle_id.clone())
            .or_default()
            .push(summary);
    }

    pub fn for_vehicle(&self, vehicle_id: &VehicleId) -> Vec<RunSummary> {
        self.runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(vehicle_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, run_id: RunId) -> Option<RunSummary> {
        self.runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .flatten()
            .find(|s| s.run_id == run_id)
            .cloned()
    }

    /// All runs, ordered by vehicle id then completion order.
    pub fn all(&self) -> Vec<RunSummary> {
        let runs = self
            .runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut vehicles: Vec<&VehicleId> = runs.keys().collect();
        vehicles.sort();
        vehicles
            .into_iter()
            .flat_map(|v| runs[v].iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
