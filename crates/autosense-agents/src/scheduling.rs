//! Scheduling Agent: diagnosis + vehicle context → booking proposal.
//!
//! The urgency tier (derived from the risk class) sets the search radius,
//! the latest acceptable slot, and whether the center must specialise in
//! the diagnosed subsystem. Candidates are taken in ascending
//! `(distance, next slot, center id)` order and reserved with the
//! registry's atomic compare-and-decrement; the first successful
//! reservation becomes the booking.

use autosense_core::config::{SchedulingConfig, UrgencyLimits};
use autosense_core::types::{
    Booking, BookingId, BookingStatus, Diagnosis, ServiceType, TimeSlot, UrgencyTier,
    VehicleContext,
};
use autosense_core::{Agent, AgentName};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::ScheduleError;
use crate::knowledge;
use crate::registry::{CenterAvailability, CenterQuery, ServiceCenterRegistry};

/// What the Scheduling Agent consumes.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRequest<'a> {
    pub diagnosis: &'a Diagnosis,
    pub vehicle: &'a VehicleContext,
    /// 0 for the first search, 1 for the widened retry.
    pub attempt: u32,
    pub now: DateTime<Utc>,
}

/// Effective search constraints for one attempt. Recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConstraints {
    pub urgency: UrgencyTier,
    pub radius_km: f64,
    pub max_delay_hours: u32,
    pub specialty: Option<String>,
    pub attempt: u32,
}

pub struct SchedulingAgent<'a> {
    config: &'a SchedulingConfig,
    registry: &'a dyn ServiceCenterRegistry,
}

impl<'a> SchedulingAgent<'a> {
    pub fn new(config: &'a SchedulingConfig, registry: &'a dyn ServiceCenterRegistry) -> Self {
        Self { config, registry }
    }

    pub fn constraints(&self, request: &ScheduleRequest<'_>) -> SearchConstraints {
        let urgency = UrgencyTier::from(request.diagnosis.risk_class);
        let UrgencyLimits {
            max_radius_km,
            max_delay_hours,
            require_specialty,
        } = self.config.urgency.limits(urgency);
        let widen = self
            .config
            .retry_radius_factor
            .powi(request.attempt.min(1) as i32);

        SearchConstraints {
            urgency,
            radius_km: max_radius_km * widen,
            max_delay_hours,
            specialty: require_specialty
                .then(|| knowledge::specialty_tag(request.diagnosis.subsystem).to_string()),
            attempt: request.attempt,
        }
    }

    pub fn schedule(&self, request: ScheduleRequest<'_>) -> Result<Booking, ScheduleError> {
        let constraints = self.constraints(&request);
        let query = CenterQuery {
            location: request.vehicle.location,
            radius_km: constraints.radius_km,
            specialty: constraints.specialty.clone(),
            now: request.now,
            latest_slot: request.now + Duration::hours(i64::from(constraints.max_delay_hours)),
        };

        let mut candidates: Vec<CenterAvailability> = self
            .registry
            .query(&query)?
            .into_iter()
            .filter(|c| {
                c.remaining_capacity > 0
                    && c.distance_km <= query.radius_km
                    && c.next_slot <= query.latest_slot
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then(a.next_slot.cmp(&b.next_slot))
                .then_with(|| a.center_id.cmp(&b.center_id))
        });

        for candidate in candidates {
            if !self.registry.try_reserve(&candidate.center_id)? {
                tracing::debug!(
                    center_id = %candidate.center_id,
                    "Center filled before reservation, trying next"
                );
                continue;
            }

            let now = Utc::now();
            let booking = Booking {
                id: BookingId::new(),
                diagnosis_id: request.diagnosis.id,
                vehicle_id: request.vehicle.vehicle_id.clone(),
                center_id: candidate.center_id,
                center_name: candidate.name,
                slot: TimeSlot {
                    start: candidate.next_slot,
                    duration_minutes: request.diagnosis.estimated_repair_minutes,
                },
                urgency: constraints.urgency,
                service_type: ServiceType::from(request.diagnosis.subsystem),
                distance_km: candidate.distance_km,
                status: BookingStatus::Proposed,
                created_at: now,
                updated_at: now,
            };
            tracing::info!(
                vehicle_id = %booking.vehicle_id,
                center_id = %booking.center_id,
                distance_km = booking.distance_km,
                urgency = booking.urgency.as_str(),
                "Booking proposed"
            );
            return Ok(booking);
        }

        Err(ScheduleError::NoCapacityAvailable {
            radius_km: constraints.radius_km,
            urgency: constraints.urgency,
        })
    }
}

impl Agent for SchedulingAgent<'_> {
    type Input<'i> = ScheduleRequest<'i>;
    type Output = Booking;
    type Error = ScheduleError;

    fn name(&self) -> AgentName {
        AgentName::Scheduling
    }

    fn invoke(&self, request: ScheduleRequest<'_>) -> Result<Booking, ScheduleError> {
        self.schedule(request)
    }
}
