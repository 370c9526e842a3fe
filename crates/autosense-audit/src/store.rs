//! Audit storage: trait plus in-memory and file-backed implementations.
//!
//! Both stores are append-only: they accept sealed events, never
//! overwrite, and expose no delete. Concurrent writers from independent
//! runs are safe; no cross-run ordering is promised.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use autosense_core::types::{RunId, VehicleId};
use autosense_core::AgentName;
use chrono::{DateTime, Utc};

use crate::{AgentEvent, EventId};

/// Errors that can occur during audit storage operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Event not found: {0}")]
    NotFound(EventId),

    #[error("Integrity check failed for event {0}: stored hash does not match content")]
    IntegrityViolation(EventId),

    #[error("Event has no content hash (not sealed)")]
    NotSealed,

    #[error("Event {0} already recorded")]
    Duplicate(EventId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query parameters for listing events.
#[derive(Debug, Default, Clone)]
pub struct EventQuery {
    pub vehicle_id: Option<VehicleId>,
    pub run_id: Option<RunId>,
    pub agent: Option<AgentName>,
    /// Only include events at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only include events at or before this time.
    pub to: Option<DateTime<Utc>>,
}

impl EventQuery {
    pub fn for_vehicle(vehicle_id: &VehicleId) -> Self {
        Self {
            vehicle_id: Some(vehicle_id.clone()),
            ..Default::default()
        }
    }

    pub fn for_run(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            ..Default::default()
        }
    }

    /// Check whether an event matches all set filters.
    pub fn matches(&self, event: &AgentEvent) -> bool {
        if let Some(vid) = &self.vehicle_id {
            if &event.vehicle_id != vid {
                return false;
            }
        }
        if let Some(rid) = &self.run_id {
            if &event.run_id != rid {
                return false;
            }
        }
        if let Some(agent) = &self.agent {
            if &event.agent != agent {
                return false;
            }
        }
        if let Some(from) = &self.from {
            if &event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if &event.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Trait for audit persistence backends.
pub trait AuditStore: Send + Sync {
    /// Append a sealed event. Unsealed events are rejected.
    fn append(&self, event: &AgentEvent) -> Result<(), AuditError>;

    /// List events matching the query. Events of one run come back in
    /// sequence order.
    fn list(&self, query: &EventQuery) -> Result<Vec<AgentEvent>, AuditError>;
}

/// Process-local audit store.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    events: RwLock<Vec<AgentEvent>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, event: &AgentEvent) -> Result<(), AuditError> {
        if event.content_hash.is_none() {
            return Err(AuditError::NotSealed);
        }
        let mut events = self
            .events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event.clone());
        Ok(())
    }

    fn list(&self, query: &EventQuery) -> Result<Vec<AgentEvent>, AuditError> {
        let events = self
            .events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(events.iter().filter(|e| query.matches(e)).cloned().collect())
    }
}

/// File-system backed audit store.
///
/// Stores events as JSON files in a directory tree:
/// ```text
/// {root}/
///   2025/
///     03/
///       14/
///         {event_id}.json
/// ```
///
/// Files are created with `create_new`, so an existing record is never
/// overwritten.
pub struct FileAuditStore {
    root: PathBuf,
}

impl FileAuditStore {
    /// Create a new store rooted at the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Build the file path for an event based on its timestamp and ID.
    fn event_path(&self, event: &AgentEvent) -> PathBuf {
        let date = event.timestamp.format("%Y/%m/%d");
        self.root.join(format!("{}/{}.json", date, event.id.0))
    }

    /// Retrieve an event by ID, verifying integrity.
    pub fn get(&self, id: EventId) -> Result<AgentEvent, AuditError> {
        let filename = format!("{}.json", id.0);
        let path = find_file_recursive(&self.root, &filename).ok_or(AuditError::NotFound(id))?;
        let event: AgentEvent = serde_json::from_str(&fs::read_to_string(&path)?)?;

        if !event.verify_integrity() {
            return Err(AuditError::IntegrityViolation(id));
        }

        Ok(event)
    }

    /// Re-check every stored seal. Returns the number of events verified.
    pub fn verify_all(&self) -> Result<usize, AuditError> {
        let events = self.list(&EventQuery::default())?;
        Ok(events.len())
    }
}

impl AuditStore for FileAuditStore {
    fn append(&self, event: &AgentEvent) -> Result<(), AuditError> {
        if event.content_hash.is_none() {
            return Err(AuditError::NotSealed);
        }

        let path = self.event_path(event);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(event)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AuditError::Duplicate(event.id))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes())?;

        tracing::debug!(
            event_id = %event.id,
            run_id = %event.run_id,
            path = %path.display(),
            "Audit event saved"
        );

        Ok(())
    }

    fn list(&self, query: &EventQuery) -> Result<Vec<AgentEvent>, AuditError> {
        let mut results = Vec::new();

        collect_events_recursive(&self.root, query, &mut results)?;

        results.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.run_id.cmp(&b.run_id))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });

        Ok(results)
    }
}

/// Recursively find a file by name.
fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }

    None
}

/// Recursively collect events matching a query, verifying each seal.
fn collect_events_recursive(
    dir: &Path,
    query: &EventQuery,
    results: &mut Vec<AgentEvent>,
) -> Result<(), AuditError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let entries = fs::read_dir(dir)?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_events_recursive(&path, query, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let event: AgentEvent = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if !event.verify_integrity() {
                return Err(AuditError::IntegrityViolation(event.id));
            }

            if query.matches(&event) {
                results.push(event);
            }
        }
    }

    Ok(())
}
