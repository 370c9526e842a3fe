//! Master orchestrator: drives one telemetry event through the agent chain.
//!
//! Stage order is fixed: features → prediction → (benign notice | diagnosis
//! → scheduling → owner decision). Each run captures one model bundle at
//! start, walks the run state machine, and emits exactly one sealed audit
//! event per state transition. Stage failures end the run in `failed`;
//! they never propagate to the caller or to other runs.
//!
//! Runs for different vehicles execute concurrently. Runs for the same
//! vehicle are chained through a per-vehicle lane so their history keeps
//! submission order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autosense_agents::{
    await_response, CustomerAgent, DiagnosisAgent, DiagnosisRequest, FeedbackLog,
    InMemoryRegistry, InMemoryTransport, NotificationOutcome, NotificationTransport,
    NotifySubject, ResponsePolicy, ScheduleError, ScheduleRequest, SchedulingAgent,
    ServiceCenterRegistry,
};
use autosense_audit::{AuditStore, EventBuilder, EventRecorder, MemoryAuditStore};
use autosense_core::types::{
    Assessment, Booking, BookingStatus, Diagnosis, FailureKind, FeedbackRecord, RunId, RunState,
    TelemetrySnapshot, VehicleContext, VehicleId,
};
use autosense_core::{Agent, AgentName, PipelineConfig};
use autosense_predict::{ConfigHandle, FeatureExtractor, ModelBundle, PredictError, PredictionAgent};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::health::PlatformHealth;
use crate::run::{RunLedger, RunSummary};
use crate::store::{MemoryRecordStore, RecordStore};

/// One ingestion call: a snapshot plus the owner-facing vehicle context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub snapshot: TelemetrySnapshot,
    pub vehicle: VehicleContext,
}

/// Cheap to clone; clones share stores, ledger, and lanes.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    bundle: Arc<ConfigHandle>,
    registry: Arc<dyn ServiceCenterRegistry>,
    transport: Arc<dyn NotificationTransport>,
    audit: Arc<dyn AuditStore>,
    records: Arc<dyn RecordStore>,
    feedback: Arc<FeedbackLog>,
    ledger: RunLedger,
    health: PlatformHealth,
    /// Completion signal of the most recently submitted run per vehicle.
    /// Removed once that run finishes with no successor queued.
    lanes: Mutex<HashMap<VehicleId, LaneTail>>,
    next_ticket: AtomicU64,
}

pub struct OrchestratorBuilder {
    bundle: ModelBundle,
    registry: Option<Arc<dyn ServiceCenterRegistry>>,
    transport: Option<Arc<dyn NotificationTransport>>,
    audit: Option<Arc<dyn AuditStore>>,
    records: Option<Arc<dyn RecordStore>>,
    feedback: Option<Arc<FeedbackLog>>,
    outage: Option<String>,
}

impl OrchestratorBuilder {
    pub fn with_registry(mut self, registry: Arc<dyn ServiceCenterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_audit_store(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_feedback_log(mut self, feedback: Arc<FeedbackLog>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Missing collaborators default to the seeded registry, a transport
    /// that never answers, and in-memory stores.
    pub fn build(self) -> Orchestrator {
        let inner = Inner {
            bundle: Arc::new(ConfigHandle::new(self.bundle)),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(InMemoryRegistry::seeded())),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(InMemoryTransport::new(ResponsePolicy::Silent))),
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(MemoryAuditStore::new())),
            records: self
                .records
                .unwrap_or_else(|| Arc::new(MemoryRecordStore::new())),
            feedback: self.feedback.unwrap_or_default(),
            ledger: RunLedger::new(),
            health: PlatformHealth::new(),
            lanes: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        };
        if let Some(reason) = &self.outage {
            inner.health.record_model_unavailable(reason);
        }
        Orchestrator {
            inner: Arc::new(inner),
        }
    }
}

impl Orchestrator {
    pub fn builder(bundle: ModelBundle) -> OrchestratorBuilder {
        OrchestratorBuilder {
            bundle,
            registry: None,
            transport: None,
            audit: None,
            records: None,
            feedback: None,
            outage: None,
        }
    }

    /// Builder over the bundle `config` describes. Estimators that cannot
    /// be loaded do not stop the platform: the bundle stays unloaded, a
    /// health alert is raised at build, and every run fails with
    /// `ModelUnavailable`.
    pub fn from_config(config: PipelineConfig) -> Result<OrchestratorBuilder, PredictError> {
        let (bundle, outage) = ModelBundle::load_or_degrade(config)?;
        Ok(OrchestratorBuilder {
            outage,
            ..Self::builder(bundle)
        })
    }

    /// Run one event to a terminal state.
    pub async fn process(&self, event: PipelineEvent) -> RunSummary {
        let lane = self.inner.enter_lane(&event.snapshot.vehicle_id);
        let lane = lane.wait().await;
        self.inner.execute(event, lane).await
    }

    /// Spawn one independent run. Same-vehicle runs keep call order.
    pub fn submit(&self, event: PipelineEvent) -> JoinHandle<RunSummary> {
        let lane = self.inner.enter_lane(&event.snapshot.vehicle_id);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let lane = lane.wait().await;
            inner.execute(event, lane).await
        })
    }

    /// Run a batch with at most `max_concurrent` runs in flight.
    /// Summaries come back in input order.
    pub async fn run_batch(
        &self,
        events: Vec<PipelineEvent>,
        max_concurrent: usize,
    ) -> Vec<RunSummary> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(events.len());

        for event in events {
            let lane = self.inner.enter_lane(&event.snapshot.vehicle_id);
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                // Wait for the vehicle's previous run before taking a permit,
                // so a queued run never holds a slot its predecessor needs.
                let lane = lane.wait().await;
                let _permit = semaphore.acquire_owned().await.ok();
                inner.execute(event, lane).await
            }));
        }

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::error!(error = %e, "Pipeline run task panicked"),
            }
        }
        summaries
    }

    /// Swap in a new bundle. Runs already in flight keep their snapshot.
    pub fn reload(&self, bundle: ModelBundle) {
        self.inner.bundle.reload(bundle);
    }

    pub fn config_handle(&self) -> Arc<ConfigHandle> {
        Arc::clone(&self.inner.bundle)
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.inner.ledger
    }

    pub fn runs_for(&self, vehicle_id: &VehicleId) -> Vec<RunSummary> {
        self.inner.ledger.for_vehicle(vehicle_id)
    }

    pub fn health(&self) -> &PlatformHealth {
        &self.inner.health
    }

    pub fn feedback_log(&self) -> Arc<FeedbackLog> {
        Arc::clone(&self.inner.feedback)
    }

    pub fn audit_store(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.inner.audit)
    }

    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.inner.records)
    }
}

// ── Lanes ─────────────────────────────────────────────────────────

/// A reserved position in a vehicle's run order.
struct Lane {
    ticket: u64,
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

/// Last reserved position of a vehicle's lane.
struct LaneTail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

/// Held for the duration of a run; dropping it releases the next run.
struct LaneGuard {
    ticket: u64,
    done: Option<oneshot::Sender<()>>,
}

impl Lane {
    async fn wait(self) -> LaneGuard {
        if let Some(previous) = self.previous {
            // A dropped sender (panicked predecessor) also releases the lane.
            let _ = previous.await;
        }
        LaneGuard {
            ticket: self.ticket,
            done: Some(self.done),
        }
    }
}

impl Drop for LaneGuard {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

// ── Run execution ─────────────────────────────────────────────────

/// Mutable state of one run.
struct RunContext<'o> {
    inner: &'o Inner,
    recorder: EventRecorder,
    summary: RunSummary,
}

impl<'o> RunContext<'o> {
    fn new(inner: &'o Inner, snapshot: &TelemetrySnapshot) -> Self {
        let run_id = RunId::new();
        let now = Utc::now();
        Self {
            inner,
            recorder: EventRecorder::new(run_id, snapshot.vehicle_id.clone()),
            summary: RunSummary {
                run_id,
                vehicle_id: snapshot.vehicle_id.clone(),
                state: RunState::Ingested,
                failure: None,
                assessment_id: None,
                diagnosis_id: None,
                booking_id: None,
                booking_status: None,
                risk_score: None,
                risk_class: None,
                started_at: now,
                finished_at: now,
                event_count: 0,
            },
        }
    }

    fn begin(&mut self, agent: AgentName, summary: &str) -> EventBuilder {
        self.recorder.begin(agent, summary)
    }

    /// Seal and append an event, moving the run to `to` when given.
    fn commit(&mut self, mut builder: EventBuilder, to: Option<RunState>) {
        if let Some(to) = to {
            let from = self.summary.state;
            if !from.can_transition_to(to) {
                tracing::error!(
                    run_id = %self.summary.run_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "Illegal run transition skipped"
                );
            } else {
                builder = builder.transition(from, to);
                self.summary.state = to;
                tracing::debug!(
                    run_id = %self.summary.run_id,
                    vehicle_id = %self.summary.vehicle_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "Run transition"
                );
            }
        }

        let appended = builder
            .seal()
            .and_then(|event| self.inner.audit.append(&event));
        if let Err(e) = appended {
            tracing::error!(
                run_id = %self.summary.run_id,
                error = %e,
                "Audit event not recorded"
            );
        }
    }

    /// End the run in `failed`.
    fn fail(&mut self, builder: EventBuilder, failure: FailureKind) {
        self.summary.failure = Some(failure.clone());
        self.commit(builder.failure(failure), Some(RunState::Failed));
    }

    fn finish(mut self) -> RunSummary {
        self.summary.finished_at = Utc::now();
        self.summary.event_count = self.recorder.count();
        self.inner.ledger.record(self.summary.clone());
        tracing::info!(
            run_id = %self.summary.run_id,
            vehicle_id = %self.summary.vehicle_id,
            state = self.summary.state.as_str(),
            failure = self.summary.failure.as_ref().map(FailureKind::as_str),
            booking_status = self.summary.booking_status.map(|s| s.as_str()),
            events = self.summary.event_count,
            "Run finished"
        );
        self.summary
    }
}

impl Inner {
    fn enter_lane(&self, vehicle_id: &VehicleId) -> Lane {
        let (done, next) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut lanes = self
            .lanes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = lanes
            .insert(vehicle_id.clone(), LaneTail { ticket, done: next })
            .map(|tail| tail.done);
        Lane {
            ticket,
            previous,
            done,
        }
    }

    /// Drop the vehicle's lane entry if no run queued behind `ticket`.
    fn leave_lane(&self, vehicle_id: &VehicleId, ticket: u64) {
        let mut lanes = self
            .lanes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if lanes.get(vehicle_id).is_some_and(|tail| tail.ticket == ticket) {
            lanes.remove(vehicle_id);
        }
    }

    async fn execute(&self, event: PipelineEvent, lane: LaneGuard) -> RunSummary {
        let bundle = self.bundle.current();
        let mut run = RunContext::new(self, &event.snapshot);
        self.drive(&mut run, &bundle, &event).await;
        let summary = run.finish();
        self.leave_lane(&summary.vehicle_id, lane.ticket);
        summary
    }

    async fn drive(&self, run: &mut RunContext<'_>, bundle: &ModelBundle, event: &PipelineEvent) {
        let Some(assessment) = self.assess(run, bundle, &event.snapshot) else {
            return;
        };

        if !assessment.is_anomalous {
            self.notify_benign(run, &assessment, &event.vehicle);
            return;
        }

        let diagnosis = self.diagnose(run, bundle, &assessment, &event.snapshot);

        let Some(mut booking) = self.schedule(run, bundle, &diagnosis, &event.vehicle) else {
            return;
        };

        self.resolve_booking(run, bundle, &mut booking, &diagnosis, &event.vehicle)
            .await;
    }

    /// Features and prediction. `None` when the run has failed.
    fn assess(
        &self,
        run: &mut RunContext<'_>,
        bundle: &ModelBundle,
        snapshot: &TelemetrySnapshot,
    ) -> Option<Assessment> {
        let extractor = FeatureExtractor::new(&bundle.config.features);
        let vector = match extractor.invoke(snapshot) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(
                    vehicle_id = %snapshot.vehicle_id,
                    snapshot_id = %snapshot.id,
                    error = %e,
                    "Snapshot rejected"
                );
                let builder = run
                    .begin(extractor.name(), &e.to_string())
                    .input_ref(snapshot.id);
                run.fail(builder, e.failure_kind());
                return None;
            }
        };
        let features: BTreeMap<&str, f64> = vector.named().collect();
        let builder = run
            .begin(extractor.name(), "Features extracted")
            .input_ref(snapshot.id)
            .output_ref(snapshot.id)
            .details(json!({ "features": features }));
        run.commit(builder, None);

        let predictor = PredictionAgent::new(bundle);
        let assessment = match predictor.invoke(&vector) {
            Ok(assessment) => assessment,
            Err(e) => {
                let failure = e.failure_kind();
                match &failure {
                    FailureKind::ModelUnavailable { reason } => {
                        self.health.record_model_unavailable(reason)
                    }
                    _ => tracing::warn!(
                        vehicle_id = %snapshot.vehicle_id,
                        error = %e,
                        "Assessment failed"
                    ),
                }
                let builder = run
                    .begin(predictor.name(), &e.to_string())
                    .input_ref(snapshot.id);
                run.fail(builder, failure);
                return None;
            }
        };

        if let Err(e) = self.records.append_assessment(&assessment) {
            tracing::error!(assessment_id = %assessment.id, error = %e, "Assessment not persisted");
        }
        run.summary.assessment_id = Some(assessment.id);
        run.summary.risk_score = Some(assessment.risk_score);
        run.summary.risk_class = Some(assessment.risk_class);

        let summary = format!(
            "Risk {:.2} ({}), anomalous: {}",
            assessment.risk_score,
            assessment.risk_class.as_str(),
            assessment.is_anomalous
        );
        let builder = run
            .begin(predictor.name(), &summary)
            .input_ref(snapshot.id)
            .output_ref(assessment.id)
            .details(json!({
                "risk_score": assessment.risk_score,
                "risk_class": assessment.risk_class,
                "anomaly_score": assessment.anomaly_score,
                "failure_mass": assessment.failure_mass,
                "is_anomalous": assessment.is_anomalous,
                "anomaly_threshold": bundle.config.prediction.anomaly_threshold,
                "contributions": assessment.contributions,
            }));
        run.commit(builder, Some(RunState::Assessed));
        Some(assessment)
    }

    fn notify_benign(
        &self,
        run: &mut RunContext<'_>,
        assessment: &Assessment,
        vehicle: &VehicleContext,
    ) {
        let customer = CustomerAgent::new(self.transport.as_ref());
        let builder = match customer.invoke(NotifySubject::Benign {
            assessment,
            vehicle,
        }) {
            Ok(outcome) => run
                .begin(customer.name(), "Health summary sent")
                .output_ref(outcome.message().id),
            Err(e) => {
                tracing::warn!(vehicle_id = %vehicle.vehicle_id, error = %e, "Health summary not delivered");
                run.begin(customer.name(), "Health summary not delivered")
                    .details(json!({ "error": e.to_string() }))
            }
        };
        run.commit(
            builder.input_ref(assessment.id),
            Some(RunState::BenignTerminal),
        );
    }

    fn diagnose(
        &self,
        run: &mut RunContext<'_>,
        bundle: &ModelBundle,
        assessment: &Assessment,
        snapshot: &TelemetrySnapshot,
    ) -> Diagnosis {
        let diagnoser = DiagnosisAgent::new(&bundle.config.diagnosis, self.feedback.as_ref());
        let attribution = diagnoser.attribute(assessment);
        let diagnosis = match diagnoser.invoke(DiagnosisRequest {
            assessment,
            vehicle_model: &snapshot.meta.model,
        }) {
            Ok(diagnosis) => diagnosis,
            Err(never) => match never {},
        };

        // History is read before this diagnosis joins it.
        self.feedback.append(FeedbackRecord {
            diagnosis_id: diagnosis.id,
            vehicle_id: diagnosis.vehicle_id.clone(),
            subsystem: diagnosis.subsystem,
            confidence: diagnosis.confidence,
            cohort: snapshot.meta.cohort(),
            recorded_at: Utc::now(),
        });
        if let Err(e) = self.records.append_diagnosis(&diagnosis) {
            tracing::error!(diagnosis_id = %diagnosis.id, error = %e, "Diagnosis not persisted");
        }
        run.summary.diagnosis_id = Some(diagnosis.id);

        let implicated: BTreeMap<&str, f64> = attribution
            .implicated
            .iter()
            .map(|(s, w)| (s.label(), *w))
            .collect();
        let tied: Vec<&str> = attribution.tied.iter().map(|s| s.label()).collect();
        let builder = run
            .begin(diagnoser.name(), &diagnosis.hypothesis)
            .input_ref(assessment.id)
            .output_ref(diagnosis.id)
            .details(json!({
                "subsystem": diagnosis.subsystem,
                "confidence": diagnosis.confidence,
                "implicated": implicated,
                "residual": attribution.residual,
                "total": attribution.total,
                "tied": tied,
                "evidence": diagnosis.evidence,
            }));
        run.commit(builder, Some(RunState::Diagnosed));
        diagnosis
    }

    /// Book a center, retrying once with a wider radius. `None` when the
    /// run has failed.
    fn schedule(
        &self,
        run: &mut RunContext<'_>,
        bundle: &ModelBundle,
        diagnosis: &Diagnosis,
        vehicle: &VehicleContext,
    ) -> Option<Booking> {
        let scheduler = SchedulingAgent::new(&bundle.config.scheduling, self.registry.as_ref());
        let mut attempt = 0;

        let (error, radius_km) = loop {
            let request = ScheduleRequest {
                diagnosis,
                vehicle,
                attempt,
                now: Utc::now(),
            };
            let constraints = scheduler.constraints(&request);
            match scheduler.invoke(request) {
                Ok(booking) => {
                    if let Err(e) = self.records.append_booking(&booking) {
                        tracing::error!(booking_id = %booking.id, error = %e, "Booking not persisted");
                    }
                    run.summary.booking_id = Some(booking.id);
                    run.summary.booking_status = Some(booking.status);

                    let summary = format!(
                        "Booked {} at {:.1} km",
                        booking.center_name, booking.distance_km
                    );
                    let builder = run
                        .begin(scheduler.name(), &summary)
                        .input_ref(diagnosis.id)
                        .output_ref(booking.id)
                        .details(json!({
                            "constraints": constraints,
                            "center_id": booking.center_id,
                            "slot": booking.slot,
                            "service_type": booking.service_type,
                        }));
                    run.commit(builder, Some(RunState::Scheduled));
                    return Some(booking);
                }
                Err(e) if attempt == 0 => {
                    let radius_km = match &e {
                        ScheduleError::NoCapacityAvailable { radius_km, .. } => *radius_km,
                        ScheduleError::Registry(_) => constraints.radius_km,
                    };
                    tracing::warn!(
                        vehicle_id = %vehicle.vehicle_id,
                        radius_km,
                        error = %e,
                        "No booking on first attempt, widening search"
                    );
                    let builder = run
                        .begin(scheduler.name(), &e.to_string())
                        .input_ref(diagnosis.id)
                        .details(json!({ "constraints": constraints }))
                        .failure(FailureKind::NoCapacityAvailable { radius_km });
                    run.commit(builder, None);
                    attempt += 1;
                }
                Err(e) => {
                    let radius_km = match &e {
                        ScheduleError::NoCapacityAvailable { radius_km, .. } => *radius_km,
                        ScheduleError::Registry(_) => constraints.radius_km,
                    };
                    break (e, radius_km);
                }
            }
        };

        tracing::warn!(
            vehicle_id = %vehicle.vehicle_id,
            radius_km,
            error = %error,
            "Scheduling failed after retry, manual follow-up required"
        );
        let customer = CustomerAgent::new(self.transport.as_ref());
        let builder = match customer.invoke(NotifySubject::ManualFollowUp {
            diagnosis,
            vehicle,
            radius_km,
        }) {
            Ok(outcome) => run
                .begin(customer.name(), "Manual follow-up notice sent")
                .output_ref(outcome.message().id),
            Err(e) => run
                .begin(customer.name(), "Manual follow-up notice not delivered")
                .details(json!({ "error": e.to_string() })),
        };
        run.commit(builder.input_ref(diagnosis.id), None);

        let builder = run
            .begin(
                AgentName::Master,
                &format!("No service capacity within {radius_km:.1} km after retry"),
            )
            .input_ref(diagnosis.id)
            .details(json!({ "attempts": attempt + 1, "radius_km": radius_km }));
        run.fail(builder, FailureKind::NoCapacityAvailable { radius_km });
        None
    }

    /// The decision request never reached the owner: the reservation lapses
    /// and the run fails without waiting out the response window.
    fn abandon_booking(&self, run: &mut RunContext<'_>, booking: &mut Booking, reason: &str) {
        tracing::warn!(
            vehicle_id = %booking.vehicle_id,
            booking_id = %booking.id,
            error = reason,
            "Decision request not delivered"
        );
        if let Err(e) = booking.transition(BookingStatus::Expired) {
            tracing::error!(booking_id = %booking.id, error = %e, "Booking not expired");
        } else if let Err(e) = self.registry.release(&booking.center_id) {
            tracing::warn!(center_id = %booking.center_id, error = %e, "Capacity not released");
        }
        if let Err(e) = self.records.append_booking(booking) {
            tracing::error!(booking_id = %booking.id, error = %e, "Booking update not persisted");
        }
        run.summary.booking_status = Some(booking.status);

        let builder = run
            .begin(AgentName::Customer, "Decision request not delivered")
            .input_ref(booking.id)
            .output_ref(booking.id)
            .details(json!({ "error": reason, "status": booking.status }));
        run.fail(
            builder,
            FailureKind::NotificationUndelivered {
                reason: reason.to_string(),
            },
        );
    }

    /// Ask the owner and close the run with the booking's final status.
    async fn resolve_booking(
        &self,
        run: &mut RunContext<'_>,
        bundle: &ModelBundle,
        booking: &mut Booking,
        diagnosis: &Diagnosis,
        vehicle: &VehicleContext,
    ) {
        let timeout_ms = bundle.config.customer.response_timeout_ms;
        let customer = CustomerAgent::new(self.transport.as_ref());

        let pending = match customer.invoke(NotifySubject::Booking {
            booking: &*booking,
            diagnosis,
            vehicle,
        }) {
            Ok(NotificationOutcome::DecisionRequested { message, response }) => {
                let builder = run
                    .begin(customer.name(), "Decision request sent")
                    .input_ref(booking.id)
                    .output_ref(message.id)
                    .details(json!({ "kind": message.kind, "timeout_ms": timeout_ms }));
                run.commit(builder, Some(RunState::Notified));
                Some(response)
            }
            Ok(NotificationOutcome::Informational { message }) => {
                let builder = run
                    .begin(customer.name(), "Booking notice sent without decision request")
                    .input_ref(booking.id)
                    .output_ref(message.id);
                run.commit(builder, Some(RunState::Notified));
                None
            }
            Err(e) => {
                self.abandon_booking(run, booking, &e.to_string());
                return;
            }
        };

        let response = match pending {
            Some(rx) => await_response(rx, Duration::from_millis(timeout_ms)).await,
            None => None,
        };

        let status = match customer.record_response(booking, response, vehicle) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(booking_id = %booking.id, error = %e, "Owner response not applied");
                booking.status
            }
        };

        if matches!(status, BookingStatus::Rejected | BookingStatus::Expired) {
            if let Err(e) = self.registry.release(&booking.center_id) {
                tracing::warn!(center_id = %booking.center_id, error = %e, "Capacity not released");
            }
        }
        if let Err(e) = self.records.append_booking(booking) {
            tracing::error!(booking_id = %booking.id, error = %e, "Booking update not persisted");
        }
        run.summary.booking_status = Some(status);

        let summary = match response {
            Some(_) => format!("Owner answered, booking {}", status.as_str()),
            None => format!("No answer within {timeout_ms} ms, booking {}", status.as_str()),
        };
        let mut builder = run
            .begin(customer.name(), &summary)
            .input_ref(booking.id)
            .output_ref(booking.id)
            .details(json!({ "response": response, "status": status }));
        if response.is_none() {
            let failure = FailureKind::NotificationTimeout { timeout_ms };
            run.summary.failure = Some(failure.clone());
            builder = builder.failure(failure);
        }
        run.commit(builder, Some(RunState::Closed));
    }
}
