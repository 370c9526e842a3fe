//! BLAKE3 content hashing for tamper evidence.
//!
//! Computes a deterministic hash of all event fields (excluding the
//! content_hash itself) so that any modification is detectable.

use autosense_core::types::{FailureKind, RunId, VehicleId};
use autosense_core::AgentName;
use serde::Serialize;

use crate::{AgentEvent, EventId, Rationale, StateChange};

/// Hashable representation of an AgentEvent (excludes content_hash).
#[derive(Serialize)]
struct HashableEvent<'a> {
    id: &'a EventId,
    run_id: &'a RunId,
    vehicle_id: &'a VehicleId,
    sequence: u32,
    agent: &'a AgentName,
    input_ref: &'a Option<String>,
    output_ref: &'a Option<String>,
    rationale: &'a Rationale,
    transition: &'a Option<StateChange>,
    failure: &'a Option<FailureKind>,
    timestamp: &'a chrono::DateTime<chrono::Utc>,
}

/// Compute the BLAKE3 hash of an event's content.
///
/// Serializes all fields except `content_hash` to JSON, then hashes the
/// bytes with BLAKE3. Returns the hex-encoded hash.
pub fn compute_event_hash(event: &AgentEvent) -> Result<String, serde_json::Error> {
    let hashable = HashableEvent {
        id: &event.id,
        run_id: &event.run_id,
        vehicle_id: &event.vehicle_id,
        sequence: event.sequence,
        agent: &event.agent,
        input_ref: &event.input_ref,
        output_ref: &event.output_ref,
        rationale: &event.rationale,
        transition: &event.transition,
        failure: &event.failure,
        timestamp: &event.timestamp,
    };

    let json = serde_json::to_vec(&hashable)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}
