//! Notification transport contract.
//!
//! Delivery channel and wire format live outside the pipeline. The
//! transport only promises to deliver a message and, for decision
//! requests, to hand back a channel that resolves with the owner's answer.

use std::sync::Mutex;

use autosense_core::types::{BookingId, OwnerResponse, VehicleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    HealthSummary,
    CriticalAlert,
    WarningAlert,
    BookingConfirmation,
    ManualFollowUp,
}

/// A rendered owner-facing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerMessage {
    pub id: MessageId,
    pub vehicle_id: VehicleId,
    pub kind: MessageKind,
    pub subject: String,
    pub body: String,
    pub booking_id: Option<BookingId>,
    pub created_at: DateTime<Utc>,
}

pub trait NotificationTransport: Send + Sync {
    /// Deliver an informational message.
    fn send(&self, message: &CustomerMessage) -> Result<(), TransportError>;

    /// Deliver a decision request. The receiver resolves with the owner's
    /// answer; the caller bounds the wait.
    fn request_decision(
        &self,
        message: &CustomerMessage,
    ) -> Result<oneshot::Receiver<OwnerResponse>, TransportError>;
}

/// How [`InMemoryTransport`] answers decision requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    /// Answer every request immediately.
    Respond(OwnerResponse),
    /// Never answer; the request stays open until the caller gives up.
    Silent,
    /// Refuse delivery.
    Unreachable,
}

/// Records every message and answers decision requests per policy.
#[derive(Debug)]
pub struct InMemoryTransport {
    policy: ResponsePolicy,
    sent: Mutex<Vec<CustomerMessage>>,
    open: Mutex<Vec<oneshot::Sender<OwnerResponse>>>,
}

impl InMemoryTransport {
    pub fn new(policy: ResponsePolicy) -> Self {
        Self {
            policy,
            sent: Mutex::new(Vec::new()),
            open: Mutex::new(Vec::new()),
        }
    }

    /// Decision requests still waiting for an answer.
    pub fn open_requests(&self) -> usize {
        self.open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Every delivered message, in delivery order.
    pub fn sent(&self) -> Vec<CustomerMessage> {
        self.sent
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn sent_to(&self, vehicle_id: &VehicleId) -> Vec<CustomerMessage> {
        self.sent()
            .into_iter()
            .filter(|m| &m.vehicle_id == vehicle_id)
            .collect()
    }

    fn record(&self, message: &CustomerMessage) -> Result<(), TransportError> {
        if self.policy == ResponsePolicy::Unreachable {
            return Err(TransportError::Unreachable(message.vehicle_id.to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }
}

impl NotificationTransport for InMemoryTransport {
    fn send(&self, message: &CustomerMessage) -> Result<(), TransportError> {
        self.record(message)
    }

    fn request_decision(
        &self,
        message: &CustomerMessage,
    ) -> Result<oneshot::Receiver<OwnerResponse>, TransportError> {
        self.record(message)?;
        let (tx, rx) = oneshot::channel();
        match self.policy {
            ResponsePolicy::Respond(response) => {
                let _ = tx.send(response);
            }
            ResponsePolicy::Silent | ResponsePolicy::Unreachable => {
                let mut open = self
                    .open
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                // Requests whose waiter gave up are no longer answerable.
                open.retain(|tx| !tx.is_closed());
                open.push(tx);
            }
        }
        Ok(rx)
    }
}
