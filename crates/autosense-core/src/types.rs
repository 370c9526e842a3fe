//! Core domain types for the AutoSense predictive maintenance pipeline.
//!
//! Every entity is produced by exactly one agent and is immutable once
//! produced, except `Booking::status`. Entities reference each other by
//! identifier so that re-diagnoses and re-bookings never rewrite history.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AutosenseError;

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one telemetry snapshot.
    SnapshotId
);
uuid_id!(
    /// Identifier of a Prediction Agent assessment.
    AssessmentId
);
uuid_id!(
    /// Identifier of a Diagnosis Agent diagnosis.
    DiagnosisId
);
uuid_id!(
    /// Identifier of a service booking.
    BookingId
);
uuid_id!(
    /// Identifier of one end-to-end pipeline run.
    RunId
);

/// Fleet vehicle identifier (VIN or fleet asset tag).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service center identifier as issued by the external registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CenterId(pub String);

impl CenterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CenterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Telemetry ─────────────────────────────────────────────────────

/// Vehicle metadata attached to every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleMeta {
    pub model: String,
    pub production_batch: String,
    pub odometer_km: f64,
    pub age_days: f64,
}

impl VehicleMeta {
    pub fn cohort(&self) -> CohortTags {
        CohortTags {
            model: self.model.clone(),
            production_batch: self.production_batch.clone(),
        }
    }
}

/// One raw telemetry reading set for a vehicle. Produced externally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySnapshot {
    #[serde(default)]
    pub id: SnapshotId,
    pub vehicle_id: VehicleId,
    pub timestamp: DateTime<Utc>,
    /// Named sensor readings, ordered by sensor name.
    pub readings: BTreeMap<String, f64>,
    pub meta: VehicleMeta,
}

impl TelemetrySnapshot {
    pub fn new(
        vehicle_id: VehicleId,
        timestamp: DateTime<Utc>,
        readings: BTreeMap<String, f64>,
        meta: VehicleMeta,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            vehicle_id,
            timestamp,
            readings,
            meta,
        }
    }

    pub fn reading(&self, sensor: &str) -> Option<f64> {
        self.readings.get(sensor).copied()
    }
}

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle (haversine) distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Owner-facing vehicle context used by scheduling and customer messaging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleContext {
    pub vehicle_id: VehicleId,
    pub owner_name: String,
    pub make: String,
    pub model: String,
    pub vin: String,
    pub location: GeoPoint,
}

// ── Features ──────────────────────────────────────────────────────

/// Number of features in the fixed layout.
pub const FEATURE_COUNT: usize = 11;

/// Feature names in layout order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "engine_temp",
    "oil_pressure",
    "battery_voltage",
    "rpm",
    "speed",
    "vibration_level",
    "brake_wear",
    "coolant_temp",
    "tire_pressure_avg",
    "odometer_km",
    "vehicle_age_days",
];

/// Index of a feature in the layout.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Normalized numeric features derived from exactly one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub snapshot_id: SnapshotId,
    pub vehicle_id: VehicleId,
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    /// `(name, value)` pairs in layout order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

// ── Assessment ────────────────────────────────────────────────────

/// Discrete risk class, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskClass {
    pub const ALL: [RiskClass; 4] = [
        RiskClass::Low,
        RiskClass::Medium,
        RiskClass::High,
        RiskClass::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskClass::Low => "low",
            RiskClass::Medium => "medium",
            RiskClass::High => "high",
            RiskClass::Critical => "critical",
        }
    }
}

/// One feature's share of an anomaly verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contribution {
    pub feature: String,
    pub weight: f64,
}

/// The Prediction Agent's verdict on one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub id: AssessmentId,
    pub vehicle_id: VehicleId,
    pub snapshot_id: SnapshotId,
    pub is_anomalous: bool,
    /// Fused score in `[0, 1]`.
    pub risk_score: f64,
    pub risk_class: RiskClass,
    /// Normalized unsupervised anomaly score in `[0, 1]`.
    pub anomaly_score: f64,
    /// Classifier probability mass on `{high, critical}`.
    pub failure_mass: f64,
    /// Sorted by descending weight, top-k only.
    pub contributions: Vec<Contribution>,
    pub assessed_at: DateTime<Utc>,
}

// ── Diagnosis ─────────────────────────────────────────────────────

/// Vehicle subsystem a diagnosis can implicate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Engine,
    Brakes,
    Battery,
    Transmission,
    CoolingSystem,
    Tires,
    Other,
}

impl Subsystem {
    pub const ALL: [Subsystem; 7] = [
        Subsystem::Engine,
        Subsystem::Brakes,
        Subsystem::Battery,
        Subsystem::Transmission,
        Subsystem::CoolingSystem,
        Subsystem::Tires,
        Subsystem::Other,
    ];

    /// Stable label; also the lexicographic tie-break key.
    pub fn label(&self) -> &'static str {
        match self {
            Subsystem::Engine => "engine",
            Subsystem::Brakes => "brakes",
            Subsystem::Battery => "battery",
            Subsystem::Transmission => "transmission",
            Subsystem::CoolingSystem => "cooling_system",
            Subsystem::Tires => "tires",
            Subsystem::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.label() == label)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Subsystem-level root-cause hypothesis for an anomalous assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    pub id: DiagnosisId,
    pub assessment_id: AssessmentId,
    pub vehicle_id: VehicleId,
    pub subsystem: Subsystem,
    pub confidence: f64,
    pub hypothesis: String,
    /// Copied from the assessment's contributions, same order.
    pub evidence: Vec<Contribution>,
    pub recommended_actions: Vec<String>,
    pub estimated_repair_minutes: u32,
    pub risk_class: RiskClass,
    pub diagnosed_at: DateTime<Utc>,
}

// ── Booking ───────────────────────────────────────────────────────

/// Scheduling priority derived from the risk class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyTier {
    Routine,
    Soon,
    Urgent,
    Immediate,
}

impl From<RiskClass> for UrgencyTier {
    fn from(class: RiskClass) -> Self {
        match class {
            RiskClass::Low => UrgencyTier::Routine,
            RiskClass::Medium => UrgencyTier::Soon,
            RiskClass::High => UrgencyTier::Urgent,
            RiskClass::Critical => UrgencyTier::Immediate,
        }
    }
}

impl UrgencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyTier::Routine => "routine",
            UrgencyTier::Soon => "soon",
            UrgencyTier::Urgent => "urgent",
            UrgencyTier::Immediate => "immediate",
        }
    }
}

/// Kind of service visit, keyed off the diagnosed subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    MajorService,
    SafetyService,
    ElectricalService,
    TireService,
    DiagnosticService,
}

impl From<Subsystem> for ServiceType {
    fn from(subsystem: Subsystem) -> Self {
        match subsystem {
            Subsystem::Engine | Subsystem::Transmission => ServiceType::MajorService,
            Subsystem::Brakes | Subsystem::CoolingSystem => ServiceType::SafetyService,
            Subsystem::Battery => ServiceType::ElectricalService,
            Subsystem::Tires => ServiceType::TireService,
            Subsystem::Other => ServiceType::DiagnosticService,
        }
    }
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::MajorService => "Major Service",
            ServiceType::SafetyService => "Safety Service",
            ServiceType::ElectricalService => "Electrical Service",
            ServiceType::TireService => "Tire Service",
            ServiceType::DiagnosticService => "Diagnostic Service",
        }
    }
}

/// A proposed appointment window at a service center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Proposed,
    Confirmed,
    Rejected,
    Expired,
}

impl BookingStatus {
    /// Only `proposed` bookings move; every other status is final.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Proposed, BookingStatus::Confirmed)
                | (BookingStatus::Proposed, BookingStatus::Rejected)
                | (BookingStatus::Proposed, BookingStatus::Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Proposed => "proposed",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Expired => "expired",
        }
    }
}

/// A service appointment proposal tied to a diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub diagnosis_id: DiagnosisId,
    pub vehicle_id: VehicleId,
    pub center_id: CenterId,
    pub center_name: String,
    pub slot: TimeSlot,
    pub urgency: UrgencyTier,
    pub service_type: ServiceType,
    pub distance_km: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Move the booking to `next`, rejecting transitions out of a final status.
    pub fn transition(&mut self, next: BookingStatus) -> Result<(), AutosenseError> {
        if !self.status.can_transition_to(next) {
            return Err(AutosenseError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ── Customer ──────────────────────────────────────────────────────

/// The owner's answer to a booking decision request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OwnerResponse {
    Confirm,
    Reschedule,
    Decline,
}

// ── Feedback ──────────────────────────────────────────────────────

/// Manufacturing cohort a vehicle belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CohortTags {
    pub model: String,
    pub production_batch: String,
}

/// One diagnosis fed back to manufacturing analytics. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub diagnosis_id: DiagnosisId,
    pub vehicle_id: VehicleId,
    pub subsystem: Subsystem,
    pub confidence: f64,
    pub cohort: CohortTags,
    pub recorded_at: DateTime<Utc>,
}

// ── Pipeline run ──────────────────────────────────────────────────

/// State of one pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Ingested,
    Assessed,
    BenignTerminal,
    Diagnosed,
    Scheduled,
    Notified,
    Closed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::BenignTerminal | RunState::Closed | RunState::Failed
        )
    }

    /// Allowed edges of the run state machine. Any non-terminal state may fail.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Ingested, Assessed)
            | (Assessed, BenignTerminal)
            | (Assessed, Diagnosed)
            | (Diagnosed, Scheduled)
            | (Scheduled, Notified)
            | (Notified, Closed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Ingested => "ingested",
            RunState::Assessed => "assessed",
            RunState::BenignTerminal => "benign_terminal",
            RunState::Diagnosed => "diagnosed",
            RunState::Scheduled => "scheduled",
            RunState::Notified => "notified",
            RunState::Closed => "closed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped short of its happy path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    InvalidSnapshot { reason: String },
    ModelUnavailable { reason: String },
    NoCapacityAvailable { radius_km: f64 },
    NotificationTimeout { timeout_ms: u64 },
    /// The decision request never reached the owner.
    NotificationUndelivered { reason: String },
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidSnapshot { .. } => "invalid_snapshot",
            FailureKind::ModelUnavailable { .. } => "model_unavailable",
            FailureKind::NoCapacityAvailable { .. } => "no_capacity_available",
            FailureKind::NotificationTimeout { .. } => "notification_timeout",
            FailureKind::NotificationUndelivered { .. } => "notification_undelivered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> Booking {
        Booking {
            id: BookingId::new(),
            diagnosis_id: DiagnosisId::new(),
            vehicle_id: VehicleId::new("VIN001"),
            center_id: CenterId::new("hub-central"),
            center_name: "Central Hub".to_string(),
            slot: TimeSlot {
                start: Utc::now(),
                duration_minutes: 60,
            },
            urgency: UrgencyTier::Urgent,
            service_type: ServiceType::MajorService,
            distance_km: 4.2,
            status: BookingStatus::Proposed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn risk_class_orders_by_severity() {
        assert!(RiskClass::Low < RiskClass::Medium);
        assert!(RiskClass::High < RiskClass::Critical);
        assert_eq!(
            serde_json::to_string(&RiskClass::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn urgency_follows_risk_class() {
        assert_eq!(UrgencyTier::from(RiskClass::Low), UrgencyTier::Routine);
        assert_eq!(UrgencyTier::from(RiskClass::Critical), UrgencyTier::Immediate);
    }

    #[test]
    fn subsystem_labels_round_trip() {
        for s in Subsystem::ALL {
            assert_eq!(Subsystem::from_label(s.label()), Some(s));
        }
        assert_eq!(
            serde_json::to_string(&Subsystem::CoolingSystem).unwrap(),
            "\"cooling_system\""
        );
    }

    #[test]
    fn booking_status_only_leaves_proposed() {
        let mut b = booking();
        b.transition(BookingStatus::Confirmed).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert!(b.transition(BookingStatus::Expired).is_err());
    }

    #[test]
    fn run_state_machine_edges() {
        assert!(RunState::Ingested.can_transition_to(RunState::Assessed));
        assert!(RunState::Assessed.can_transition_to(RunState::BenignTerminal));
        assert!(RunState::Scheduled.can_transition_to(RunState::Failed));
        assert!(!RunState::Ingested.can_transition_to(RunState::Diagnosed));
        assert!(!RunState::Closed.can_transition_to(RunState::Failed));
        assert!(!RunState::BenignTerminal.can_transition_to(RunState::Diagnosed));
    }

    #[test]
    fn haversine_distance() {
        let mumbai = GeoPoint::new(19.0760, 72.8777);
        let thane = GeoPoint::new(19.2183, 72.9781);
        let d = mumbai.distance_km(&thane);
        assert!((d - 18.9).abs() < 1.0, "got {d}");
        assert!(mumbai.distance_km(&mumbai).abs() < 1e-9);
    }

    #[test]
    fn feature_layout_lookup() {
        assert_eq!(feature_index("engine_temp"), Some(0));
        assert_eq!(feature_index("vehicle_age_days"), Some(FEATURE_COUNT - 1));
        assert_eq!(feature_index("fuel_level"), None);
    }
}
