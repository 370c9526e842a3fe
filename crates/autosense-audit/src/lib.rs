//! AutoSense Audit: tamper-evident record of every agent decision.
//!
//! Each agent invocation and each pipeline state transition produces one
//! `AgentEvent`: which agent acted, what it consumed and produced (by
//! identifier), the rationale it used, and the resulting state change.
//! Events are sealed with a BLAKE3 content hash and are never deleted.

pub mod hash;
pub mod recorder;
pub mod store;

use autosense_core::types::{FailureKind, RunId, RunState, VehicleId};
use autosense_core::AgentName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use recorder::{EventBuilder, EventRecorder};
pub use store::{AuditError, AuditStore, EventQuery, FileAuditStore, MemoryAuditStore};

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for an audit event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A run state transition recorded by an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChange {
    pub from: RunState,
    pub to: RunState,
}

/// The decision criteria an agent applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rationale {
    /// Human-readable summary.
    pub summary: String,
    /// Structured criteria: weighted features, selection constraints, etc.
    pub details: serde_json::Value,
}

/// One audit trail entry. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    pub id: EventId,
    pub run_id: RunId,
    pub vehicle_id: VehicleId,
    /// Position of this event within its run, starting at 0.
    pub sequence: u32,
    pub agent: AgentName,
    /// Identifier of the entity the agent consumed.
    pub input_ref: Option<String>,
    /// Identifier of the entity the agent produced.
    pub output_ref: Option<String>,
    pub rationale: Rationale,
    pub transition: Option<StateChange>,
    pub failure: Option<FailureKind>,
    pub timestamp: DateTime<Utc>,
    /// BLAKE3 content hash (hex), set when the event is sealed.
    pub content_hash: Option<String>,
}

impl AgentEvent {
    /// Compute the BLAKE3 hash of the event's content.
    /// The hash covers all fields except `content_hash` itself.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        hash::compute_event_hash(self)
    }

    /// Verify that the stored content_hash matches a freshly computed hash.
    pub fn verify_integrity(&self) -> bool {
        match (&self.content_hash, self.compute_hash()) {
            (Some(stored), Ok(fresh)) => stored == &fresh,
            _ => false,
        }
    }
}
