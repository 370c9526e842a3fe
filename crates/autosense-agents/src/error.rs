//! Error types for the autosense-agents crate.

use autosense_core::types::{CenterId, UrgencyTier};
use autosense_core::AutosenseError;
use thiserror::Error;

/// Errors from the external service-center registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown service center: {0}")]
    UnknownCenter(CenterId),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("No service center with capacity within {radius_km} km for {} urgency", .urgency.as_str())]
    NoCapacityAvailable { radius_km: f64, urgency: UrgencyTier },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors from the external notification transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Recipient unreachable for vehicle {0}")]
    Unreachable(String),
}

#[derive(Error, Debug)]
pub enum CustomerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Booking(#[from] AutosenseError),
}
