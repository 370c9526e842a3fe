//! Per-run event recorder.
//!
//! The orchestrator owns one recorder per pipeline run. Each call to
//! [`EventRecorder::begin`] reserves the next sequence number, so events of
//! one run keep their order even when many runs share a store:
//!
//! ```no_run
//! # use autosense_audit::EventRecorder;
//! # use autosense_core::types::{RunId, RunState, VehicleId};
//! # use autosense_core::AgentName;
//! let mut recorder = EventRecorder::new(RunId::new(), VehicleId::new("VIN001"));
//! let event = recorder
//!     .begin(AgentName::Prediction, "Risk 0.92 (critical)")
//!     .input_ref("snapshot-1")
//!     .output_ref("assessment-1")
//!     .details(serde_json::json!({"risk_score": 0.92}))
//!     .transition(RunState::Ingested, RunState::Assessed)
//!     .seal()
//!     .unwrap();
//! assert!(event.verify_integrity());
//! ```

use autosense_core::types::{FailureKind, RunId, RunState, VehicleId};
use autosense_core::AgentName;
use chrono::Utc;

use crate::store::AuditError;
use crate::{AgentEvent, EventId, Rationale, StateChange};

/// Hands out sequence numbers for the events of a single run.
#[derive(Debug)]
pub struct EventRecorder {
    run_id: RunId,
    vehicle_id: VehicleId,
    next_sequence: u32,
}

impl EventRecorder {
    pub fn new(run_id: RunId, vehicle_id: VehicleId) -> Self {
        Self {
            run_id,
            vehicle_id,
            next_sequence: 0,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Number of events started so far.
    pub fn count(&self) -> u32 {
        self.next_sequence
    }

    /// Start a new event for `agent`.
    pub fn begin(&mut self, agent: AgentName, summary: &str) -> EventBuilder {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        EventBuilder {
            event: AgentEvent {
                id: EventId::new(),
                run_id: self.run_id,
                vehicle_id: self.vehicle_id.clone(),
                sequence,
                agent,
                input_ref: None,
                output_ref: None,
                rationale: Rationale {
                    summary: summary.to_string(),
                    details: serde_json::Value::Null,
                },
                transition: None,
                failure: None,
                timestamp: Utc::now(),
                content_hash: None,
            },
        }
    }
}

/// Builder for one event; consumed by [`EventBuilder::seal`].
#[derive(Debug)]
pub struct EventBuilder {
    event: AgentEvent,
}

impl EventBuilder {
    pub fn input_ref(mut self, reference: impl ToString) -> Self {
        self.event.input_ref = Some(reference.to_string());
        self
    }

    pub fn output_ref(mut self, reference: impl ToString) -> Self {
        self.event.output_ref = Some(reference.to_string());
        self
    }

    /// Structured decision criteria (weighted features, search constraints).
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.event.rationale.details = details;
        self
    }

    pub fn transition(mut self, from: RunState, to: RunState) -> Self {
        self.event.transition = Some(StateChange { from, to });
        self
    }

    pub fn failure(mut self, kind: FailureKind) -> Self {
        self.event.failure = Some(kind);
        self
    }

    /// Stamp the content hash. The event is immutable from here on.
    pub fn seal(mut self) -> Result<AgentEvent, AuditError> {
        let hash = self.event.compute_hash()?;
        self.event.content_hash = Some(hash);
        Ok(self.event)
    }
}
