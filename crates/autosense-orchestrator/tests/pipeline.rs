//! End-to-end pipeline scenarios against in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use autosense_agents::transport::MessageKind;
use autosense_agents::{InMemoryRegistry, InMemoryTransport, ResponsePolicy, ServiceCenter};
use autosense_audit::{AuditStore, EventQuery, FileAuditStore};
use autosense_core::types::{
    BookingStatus, CenterId, FailureKind, GeoPoint, OwnerResponse, RiskClass, RunState,
    Subsystem, TelemetrySnapshot, VehicleContext, VehicleId, VehicleMeta,
};
use autosense_core::{AgentName, PipelineConfig};
use autosense_orchestrator::{Orchestrator, PipelineEvent, RunSummary};
use autosense_predict::{AnomalyDetector, ClassProbabilities, ModelBundle, RiskClassifier};
use chrono::Utc;

const MUMBAI: GeoPoint = GeoPoint {
    lat: 19.0760,
    lon: 72.8777,
};
const DELHI: GeoPoint = GeoPoint {
    lat: 28.6139,
    lon: 77.2090,
};

// ── Fixtures ──────────────────────────────────────────────────────

/// Normalized score pinned; raw score is the squared norm so contributions
/// still follow the feature values.
struct PinnedDetector(f64);

impl AnomalyDetector for PinnedDetector {
    fn raw_score(&self, features: &[f64]) -> f64 {
        features.iter().map(|x| x * x).sum()
    }
    fn normalize(&self, _raw: f64) -> f64 {
        self.0
    }
    fn reference_value(&self, _index: usize) -> f64 {
        0.0
    }
}

struct PinnedClassifier(f64);

impl RiskClassifier for PinnedClassifier {
    fn predict_proba(&self, _features: &[f64]) -> ClassProbabilities {
        ClassProbabilities {
            low: 1.0 - self.0,
            medium: 0.0,
            high: 0.0,
            critical: self.0,
        }
    }
}

fn pinned_bundle(score: f64, config: PipelineConfig) -> ModelBundle {
    ModelBundle::with_estimators(
        config,
        Arc::new(PinnedDetector(score)),
        Arc::new(PinnedClassifier(score)),
    )
}

fn reference_bundle() -> ModelBundle {
    ModelBundle::load(PipelineConfig::default()).unwrap()
}

fn fast_timeout() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.customer.response_timeout_ms = 20;
    config
}

fn snapshot(vehicle: &str, overrides: &[(&str, f64)]) -> TelemetrySnapshot {
    let mut readings: BTreeMap<String, f64> = [
        ("engine_temp", 95.0),
        ("oil_pressure", 45.0),
        ("battery_voltage", 13.5),
        ("rpm", 3000.0),
        ("speed", 60.0),
        ("vibration_level", 1.0),
        ("brake_wear", 20.0),
        ("coolant_temp", 90.0),
        ("tire_pressure_fl", 32.0),
        ("tire_pressure_fr", 32.0),
        ("tire_pressure_rl", 32.0),
        ("tire_pressure_rr", 32.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in overrides {
        readings.insert(k.to_string(), *v);
    }
    TelemetrySnapshot::new(
        VehicleId::new(vehicle),
        Utc::now(),
        readings,
        VehicleMeta {
            model: "Splendor Plus".to_string(),
            production_batch: "B2023-07".to_string(),
            odometer_km: 60_000.0,
            age_days: 1095.0,
        },
    )
}

fn event_at(vehicle: &str, overrides: &[(&str, f64)], location: GeoPoint) -> PipelineEvent {
    PipelineEvent {
        snapshot: snapshot(vehicle, overrides),
        vehicle: VehicleContext {
            vehicle_id: VehicleId::new(vehicle),
            owner_name: "Rajesh Kumar".to_string(),
            make: "Hero".to_string(),
            model: "Splendor Plus".to_string(),
            vin: format!("VIN-{vehicle}"),
            location,
        },
    }
}

/// Worn brakes: the brake_wear feature dominates the contributions.
fn worn_brakes(vehicle: &str) -> PipelineEvent {
    event_at(vehicle, &[("brake_wear", 65.0)], MUMBAI)
}

fn single_center(capacity: u32) -> ServiceCenter {
    ServiceCenter {
        id: CenterId::new("multibrand-navi-mumbai"),
        name: "Multi-brand Service Center".to_string(),
        location: GeoPoint::new(19.0330, 73.0297),
        specialties: vec!["all".to_string()],
        capacity,
        current_load: 0,
        next_slot_offset_hours: 24,
        rating: 4.0,
    }
}

fn transitions(orchestrator: &Orchestrator, summary: &RunSummary) -> Vec<(RunState, RunState)> {
    orchestrator
        .audit_store()
        .list(&EventQuery::for_run(summary.run_id))
        .unwrap()
        .into_iter()
        .filter_map(|e| e.transition.map(|t| (t.from, t.to)))
        .collect()
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn nominal_snapshot_ends_benign() {
    let transport = Arc::new(InMemoryTransport::new(ResponsePolicy::Silent));
    let orchestrator = Orchestrator::builder(reference_bundle())
        .with_transport(transport.clone())
        .build();

    let summary = orchestrator
        .process(event_at("HERO-0001", &[], MUMBAI))
        .await;

    assert_eq!(summary.state, RunState::BenignTerminal);
    assert_eq!(summary.risk_class, Some(RiskClass::Low));
    assert!(summary.failure.is_none());
    assert!(summary.diagnosis_id.is_none());
    assert!(summary.booking_id.is_none());

    let vehicle = VehicleId::new("HERO-0001");
    let records = orchestrator.record_store();
    assert_eq!(records.assessments_for(&vehicle).unwrap().len(), 1);
    assert!(records.diagnoses_for(&vehicle).unwrap().is_empty());
    assert!(records.bookings_for(&vehicle).unwrap().is_empty());
    assert!(orchestrator.feedback_log().is_empty());

    let sent = transport.sent_to(&vehicle);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, MessageKind::HealthSummary);

    assert_eq!(
        transitions(&orchestrator, &summary),
        vec![
            (RunState::Ingested, RunState::Assessed),
            (RunState::Assessed, RunState::BenignTerminal),
        ]
    );
}

#[tokio::test]
async fn critical_score_books_and_requests_decision() {
    let transport = Arc::new(InMemoryTransport::new(ResponsePolicy::Respond(
        OwnerResponse::Confirm,
    )));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_transport(transport.clone())
        .build();

    let summary = orchestrator.process(worn_brakes("MAH-0042")).await;

    assert!((summary.risk_score.unwrap() - 0.92).abs() < 1e-9);
    assert_eq!(summary.risk_class, Some(RiskClass::Critical));
    assert_eq!(summary.state, RunState::Closed);
    assert_eq!(summary.booking_status, Some(BookingStatus::Confirmed));
    assert!(summary.failure.is_none());

    let vehicle = VehicleId::new("MAH-0042");
    let records = orchestrator.record_store();
    let diagnoses = records.diagnoses_for(&vehicle).unwrap();
    assert_eq!(diagnoses.len(), 1);
    assert_eq!(diagnoses[0].subsystem, Subsystem::Brakes);
    assert!(diagnoses[0].confidence > 0.0);

    let bookings = records.bookings_for(&vehicle).unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Confirmed);
    assert_eq!(Some(bookings[0].id), summary.booking_id);

    let kinds: Vec<MessageKind> = transport.sent_to(&vehicle).iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::CriticalAlert, MessageKind::BookingConfirmation]
    );

    let feedback = orchestrator.feedback_log().for_vehicle(&vehicle);
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].cohort.production_batch, "B2023-07");
}

#[tokio::test]
async fn every_transition_emits_one_event() {
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_transport(Arc::new(InMemoryTransport::new(ResponsePolicy::Respond(
            OwnerResponse::Confirm,
        ))))
        .build();

    let summary = orchestrator.process(worn_brakes("MAH-0042")).await;

    assert_eq!(
        transitions(&orchestrator, &summary),
        vec![
            (RunState::Ingested, RunState::Assessed),
            (RunState::Assessed, RunState::Diagnosed),
            (RunState::Diagnosed, RunState::Scheduled),
            (RunState::Scheduled, RunState::Notified),
            (RunState::Notified, RunState::Closed),
        ]
    );

    let events = orchestrator
        .audit_store()
        .list(&EventQuery::for_run(summary.run_id))
        .unwrap();
    assert_eq!(events.len() as u32, summary.event_count);
    assert!(events.iter().all(|e| e.verify_integrity()));
    let sequences: Vec<u32> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..summary.event_count).collect::<Vec<_>>());
    assert_eq!(events[0].agent, AgentName::FeatureExtractor);
}

#[tokio::test]
async fn no_capacity_after_retry_fails_with_radius() {
    let transport = Arc::new(InMemoryTransport::new(ResponsePolicy::Silent));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_transport(transport.clone())
        .build();

    // Every seeded center is in Mumbai, far outside the widened radius.
    let summary = orchestrator
        .process(event_at("MAH-0099", &[("brake_wear", 65.0)], DELHI))
        .await;

    assert_eq!(summary.state, RunState::Failed);
    let widened = 200.0 * 1.5;
    match &summary.failure {
        Some(FailureKind::NoCapacityAvailable { radius_km }) => {
            assert!((radius_km - widened).abs() < 1e-9)
        }
        other => panic!("unexpected failure {other:?}"),
    }
    assert!(summary.booking_id.is_none());

    let events = orchestrator
        .audit_store()
        .list(&EventQuery::for_run(summary.run_id))
        .unwrap();
    let failed = events
        .iter()
        .find(|e| e.transition.map(|t| t.to) == Some(RunState::Failed))
        .unwrap();
    assert_eq!(failed.agent, AgentName::Master);
    assert_eq!(
        failed.failure,
        Some(FailureKind::NoCapacityAvailable { radius_km: widened })
    );

    let first_attempt = events
        .iter()
        .find(|e| e.agent == AgentName::Scheduling)
        .unwrap();
    assert_eq!(
        first_attempt.failure,
        Some(FailureKind::NoCapacityAvailable { radius_km: 200.0 })
    );

    let kinds: Vec<MessageKind> = transport
        .sent_to(&VehicleId::new("MAH-0099"))
        .iter()
        .map(|m| m.kind)
        .collect();
    assert_eq!(kinds, vec![MessageKind::ManualFollowUp]);
}

#[tokio::test]
async fn unanswered_request_expires_booking() {
    let registry = Arc::new(InMemoryRegistry::new(vec![single_center(3)]));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, fast_timeout()))
        .with_registry(registry.clone())
        .with_transport(Arc::new(InMemoryTransport::new(ResponsePolicy::Silent)))
        .build();

    let summary = orchestrator.process(worn_brakes("HERO-0007")).await;

    assert_eq!(summary.state, RunState::Closed);
    assert_eq!(summary.booking_status, Some(BookingStatus::Expired));
    assert_eq!(
        summary.failure,
        Some(FailureKind::NotificationTimeout { timeout_ms: 20 })
    );

    let bookings = orchestrator
        .record_store()
        .bookings_for(&VehicleId::new("HERO-0007"))
        .unwrap();
    assert_eq!(bookings[0].status, BookingStatus::Expired);

    // Expired bookings hand their capacity back.
    assert_eq!(
        registry.remaining(&CenterId::new("multibrand-navi-mumbai")),
        Some(3)
    );
}

#[tokio::test]
async fn declined_booking_releases_capacity() {
    let registry = Arc::new(InMemoryRegistry::new(vec![single_center(1)]));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_registry(registry.clone())
        .with_transport(Arc::new(InMemoryTransport::new(ResponsePolicy::Respond(
            OwnerResponse::Decline,
        ))))
        .build();

    let first = orchestrator.process(worn_brakes("HERO-0008")).await;
    let second = orchestrator.process(worn_brakes("HERO-0009")).await;

    assert_eq!(first.booking_status, Some(BookingStatus::Rejected));
    assert_eq!(second.booking_status, Some(BookingStatus::Rejected));
    assert_eq!(
        registry.remaining(&CenterId::new("multibrand-navi-mumbai")),
        Some(1)
    );
}

#[tokio::test]
async fn undelivered_request_fails_without_waiting() {
    let registry = Arc::new(InMemoryRegistry::new(vec![single_center(2)]));
    let transport = Arc::new(InMemoryTransport::new(ResponsePolicy::Unreachable));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_registry(registry.clone())
        .with_transport(transport.clone())
        .build();

    // The default response window is minutes long; nothing may wait it out.
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.process(worn_brakes("HERO-0012")),
    )
    .await
    .unwrap();

    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.booking_status, Some(BookingStatus::Expired));
    assert!(matches!(
        summary.failure,
        Some(FailureKind::NotificationUndelivered { .. })
    ));
    assert_eq!(
        transitions(&orchestrator, &summary).last(),
        Some(&(RunState::Scheduled, RunState::Failed))
    );
    assert_eq!(
        registry.remaining(&CenterId::new("multibrand-navi-mumbai")),
        Some(2)
    );
    assert!(transport.sent().is_empty());

    let runs = orchestrator.runs_for(&VehicleId::new("HERO-0012"));
    assert_eq!(runs, vec![summary]);
}

#[tokio::test]
async fn reschedule_closes_booking_as_rejected() {
    let registry = Arc::new(InMemoryRegistry::new(vec![single_center(1)]));
    let transport = Arc::new(InMemoryTransport::new(ResponsePolicy::Respond(
        OwnerResponse::Reschedule,
    )));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_registry(registry.clone())
        .with_transport(transport.clone())
        .build();

    let summary = orchestrator.process(worn_brakes("HERO-0013")).await;

    assert_eq!(summary.state, RunState::Closed);
    assert_eq!(summary.booking_status, Some(BookingStatus::Rejected));
    assert!(summary.failure.is_none());

    // No second booking is made inside the run.
    let vehicle = VehicleId::new("HERO-0013");
    let bookings = orchestrator.record_store().bookings_for(&vehicle).unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Rejected);
    assert_eq!(
        registry.remaining(&CenterId::new("multibrand-navi-mumbai")),
        Some(1)
    );
    let kinds: Vec<MessageKind> = transport.sent_to(&vehicle).iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MessageKind::CriticalAlert]);
}

#[tokio::test]
async fn unloadable_model_fails_each_run_and_alerts() {
    let mut config = PipelineConfig::default();
    config.prediction.model_path = Some("/nonexistent/autosense-model.json".to_string());
    let orchestrator = Orchestrator::from_config(config).unwrap().build();

    assert_eq!(orchestrator.health().model_unavailable_count(), 1);
    assert!(orchestrator
        .health()
        .last_alert()
        .unwrap()
        .reason
        .contains("autosense-model.json"));

    let summaries = orchestrator
        .run_batch(vec![worn_brakes("HERO-0014"), worn_brakes("HERO-0015")], 4)
        .await;

    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert_eq!(summary.state, RunState::Failed);
        assert!(matches!(
            summary.failure,
            Some(FailureKind::ModelUnavailable { .. })
        ));
        assert_eq!(orchestrator.runs_for(&summary.vehicle_id), vec![summary.clone()]);
    }
    assert_eq!(orchestrator.health().model_unavailable_count(), 3);
}

#[tokio::test]
async fn missing_estimators_fail_loudly() {
    let orchestrator =
        Orchestrator::builder(ModelBundle::unloaded(PipelineConfig::default())).build();

    let summary = orchestrator.process(worn_brakes("HERO-0010")).await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(matches!(
        summary.failure,
        Some(FailureKind::ModelUnavailable { .. })
    ));
    assert!(summary.assessment_id.is_none());
    assert_eq!(orchestrator.health().model_unavailable_count(), 1);
    assert!(orchestrator.health().is_degraded());
    assert_eq!(
        transitions(&orchestrator, &summary),
        vec![(RunState::Ingested, RunState::Failed)]
    );
}

#[tokio::test]
async fn invalid_snapshot_is_dropped_and_recorded() {
    let orchestrator = Orchestrator::builder(reference_bundle()).build();

    let mut event = event_at("HERO-0011", &[], MUMBAI);
    event.snapshot.readings.remove("oil_pressure");
    let summary = orchestrator.process(event).await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(matches!(
        summary.failure,
        Some(FailureKind::InvalidSnapshot { .. })
    ));
    assert_eq!(orchestrator.health().model_unavailable_count(), 0);

    let runs = orchestrator.runs_for(&VehicleId::new("HERO-0011"));
    assert_eq!(runs, vec![summary]);
}

#[tokio::test]
async fn last_slot_is_booked_once_under_concurrency() {
    let registry = Arc::new(InMemoryRegistry::new(vec![single_center(1)]));
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, PipelineConfig::default()))
        .with_registry(registry.clone())
        .with_transport(Arc::new(InMemoryTransport::new(ResponsePolicy::Respond(
            OwnerResponse::Confirm,
        ))))
        .build();

    let events: Vec<PipelineEvent> = (0..8)
        .map(|i| worn_brakes(&format!("HERO-{i:04}")))
        .collect();
    let summaries = orchestrator.run_batch(events, 8).await;

    assert_eq!(summaries.len(), 8);
    let confirmed = summaries
        .iter()
        .filter(|s| s.booking_status == Some(BookingStatus::Confirmed))
        .count();
    let failed = summaries.iter().filter(|s| s.is_failed()).count();
    assert_eq!(confirmed, 1);
    assert_eq!(failed, 7);
    assert_eq!(
        registry.remaining(&CenterId::new("multibrand-navi-mumbai")),
        Some(0)
    );
}

#[tokio::test]
async fn same_vehicle_runs_keep_submission_order() {
    let orchestrator = Orchestrator::builder(reference_bundle()).build();

    let events: Vec<PipelineEvent> = (0..5)
        .map(|_| event_at("HERO-0001", &[], MUMBAI))
        .chain((0..5).map(|_| event_at("HERO-0002", &[], MUMBAI)))
        .collect();
    let snapshot_order: Vec<_> = events
        .iter()
        .filter(|e| e.snapshot.vehicle_id.as_str() == "HERO-0001")
        .map(|e| e.snapshot.id)
        .collect();

    let summaries = orchestrator.run_batch(events, 3).await;
    assert_eq!(summaries.len(), 10);

    let ledger_runs: Vec<_> = orchestrator
        .runs_for(&VehicleId::new("HERO-0001"))
        .into_iter()
        .map(|s| s.run_id)
        .collect();
    let submitted_runs: Vec<_> = summaries[..5].iter().map(|s| s.run_id).collect();
    assert_eq!(ledger_runs, submitted_runs);

    let assessed: Vec<_> = orchestrator
        .record_store()
        .assessments_for(&VehicleId::new("HERO-0001"))
        .unwrap()
        .into_iter()
        .map(|a| a.snapshot_id)
        .collect();
    assert_eq!(assessed, snapshot_order);
}

#[tokio::test]
async fn reload_applies_to_new_runs_only() {
    let orchestrator = Orchestrator::builder(reference_bundle()).build();
    let before = orchestrator
        .process(event_at("HERO-0001", &[], MUMBAI))
        .await;
    assert_eq!(before.state, RunState::BenignTerminal);

    orchestrator.reload(ModelBundle::unloaded(PipelineConfig::default()));
    let after = orchestrator
        .process(event_at("HERO-0001", &[], MUMBAI))
        .await;
    assert!(matches!(
        after.failure,
        Some(FailureKind::ModelUnavailable { .. })
    ));

    let runs = orchestrator.runs_for(&VehicleId::new("HERO-0001"));
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].state, RunState::BenignTerminal);
    assert_eq!(runs[1].state, RunState::Failed);
}

#[tokio::test]
async fn file_audit_store_holds_sealed_trail() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileAuditStore::new(dir.path()).unwrap());
    let orchestrator = Orchestrator::builder(pinned_bundle(0.92, fast_timeout()))
        .with_audit_store(store.clone())
        .build();

    let summary = orchestrator.process(worn_brakes("MAH-0042")).await;
    assert_eq!(summary.state, RunState::Closed);

    let verified = store.verify_all().unwrap();
    assert_eq!(verified as u32, summary.event_count);

    let by_vehicle = store
        .list(&EventQuery::for_vehicle(&VehicleId::new("MAH-0042")))
        .unwrap();
    assert_eq!(by_vehicle.len() as u32, summary.event_count);
}
