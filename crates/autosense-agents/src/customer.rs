//! Customer Agent: message templating and owner-response recording.
//!
//! A benign assessment yields an informational health summary. A booking
//! yields a decision request (confirm / reschedule / decline); the answer,
//! or its absence within the response window, becomes the booking's final
//! status.

use std::time::Duration;

use autosense_core::types::{
    Assessment, Booking, BookingStatus, Diagnosis, OwnerResponse, RiskClass, VehicleContext,
};
use autosense_core::{Agent, AgentName};
use chrono::Utc;
use tokio::sync::oneshot;

use crate::error::CustomerError;
use crate::transport::{CustomerMessage, MessageId, MessageKind, NotificationTransport};

const SIGN_OFF: &str = "AutoSenseAI Team";

/// What the Customer Agent is asked to communicate.
#[derive(Debug, Clone, Copy)]
pub enum NotifySubject<'a> {
    Benign {
        assessment: &'a Assessment,
        vehicle: &'a VehicleContext,
    },
    Booking {
        booking: &'a Booking,
        diagnosis: &'a Diagnosis,
        vehicle: &'a VehicleContext,
    },
    /// No service center could be found; a person has to follow up.
    ManualFollowUp {
        diagnosis: &'a Diagnosis,
        vehicle: &'a VehicleContext,
        radius_km: f64,
    },
}

#[derive(Debug)]
pub enum NotificationOutcome {
    Informational {
        message: CustomerMessage,
    },
    DecisionRequested {
        message: CustomerMessage,
        response: oneshot::Receiver<OwnerResponse>,
    },
}

impl NotificationOutcome {
    pub fn message(&self) -> &CustomerMessage {
        match self {
            NotificationOutcome::Informational { message }
            | NotificationOutcome::DecisionRequested { message, .. } => message,
        }
    }

    pub fn is_decision_request(&self) -> bool {
        matches!(self, NotificationOutcome::DecisionRequested { .. })
    }
}

/// Wait for the owner's answer, giving up after `timeout`.
///
/// A closed channel counts as no answer.
pub async fn await_response(
    response: oneshot::Receiver<OwnerResponse>,
    timeout: Duration,
) -> Option<OwnerResponse> {
    match tokio::time::timeout(timeout, response).await {
        Ok(Ok(answer)) => Some(answer),
        Ok(Err(_)) | Err(_) => None,
    }
}

pub struct CustomerAgent<'a> {
    transport: &'a dyn NotificationTransport,
}

impl<'a> CustomerAgent<'a> {
    pub fn new(transport: &'a dyn NotificationTransport) -> Self {
        Self { transport }
    }

    pub fn notify(&self, subject: NotifySubject<'_>) -> Result<NotificationOutcome, CustomerError> {
        match subject {
            NotifySubject::Benign { assessment, vehicle } => {
                let message = health_summary(assessment, vehicle);
                self.transport.send(&message)?;
                Ok(NotificationOutcome::Informational { message })
            }
            NotifySubject::Booking {
                booking,
                diagnosis,
                vehicle,
            } => {
                let message = booking_alert(booking, diagnosis, vehicle);
                let response = self.transport.request_decision(&message)?;
                tracing::info!(
                    vehicle_id = %vehicle.vehicle_id,
                    booking_id = %booking.id,
                    "Decision request sent"
                );
                Ok(NotificationOutcome::DecisionRequested { message, response })
            }
            NotifySubject::ManualFollowUp {
                diagnosis,
                vehicle,
                radius_km,
            } => {
                let message = manual_follow_up(diagnosis, vehicle, radius_km);
                self.transport.send(&message)?;
                Ok(NotificationOutcome::Informational { message })
            }
        }
    }

    /// Apply the owner's answer (or its absence) to the booking.
    ///
    /// Confirm → confirmed, decline or reschedule → rejected, no answer →
    /// expired. A reschedule closes this booking; a new slot comes from the
    /// owner's next contact, not from this run.
    pub fn record_response(
        &self,
        booking: &mut Booking,
        response: Option<OwnerResponse>,
        vehicle: &VehicleContext,
    ) -> Result<BookingStatus, CustomerError> {
        let next = match response {
            Some(OwnerResponse::Confirm) => BookingStatus::Confirmed,
            Some(OwnerResponse::Decline) | Some(OwnerResponse::Reschedule) => {
                BookingStatus::Rejected
            }
            None => BookingStatus::Expired,
        };
        booking.transition(next)?;

        if next == BookingStatus::Confirmed {
            let confirmation = booking_confirmation(booking, vehicle);
            if let Err(e) = self.transport.send(&confirmation) {
                tracing::warn!(
                    booking_id = %booking.id,
                    error = %e,
                    "Booking confirmation not delivered"
                );
            }
        }

        tracing::info!(
            booking_id = %booking.id,
            status = next.as_str(),
            response = ?response,
            "Owner response recorded"
        );
        Ok(next)
    }
}

impl Agent for CustomerAgent<'_> {
    type Input<'i> = NotifySubject<'i>;
    type Output = NotificationOutcome;
    type Error = CustomerError;

    fn name(&self) -> AgentName {
        AgentName::Customer
    }

    fn invoke(&self, subject: NotifySubject<'_>) -> Result<NotificationOutcome, CustomerError> {
        self.notify(subject)
    }
}

// ── Templates ─────────────────────────────────────────────────────

fn message(
    vehicle: &VehicleContext,
    kind: MessageKind,
    subject: String,
    body: String,
    booking: Option<&Booking>,
) -> CustomerMessage {
    CustomerMessage {
        id: MessageId::new(),
        vehicle_id: vehicle.vehicle_id.clone(),
        kind,
        subject,
        body,
        booking_id: booking.map(|b| b.id),
        created_at: Utc::now(),
    }
}

fn health_summary(assessment: &Assessment, vehicle: &VehicleContext) -> CustomerMessage {
    let body = format!(
        "Dear {owner},\n\n\
         Your {make} {model} passed its latest health check.\n\
         Risk Level: {class} (score {score:.2})\n\n\
         No action is needed. We will keep monitoring your vehicle.\n\n\
         Best regards,\n{SIGN_OFF}",
        owner = vehicle.owner_name,
        make = vehicle.make,
        model = vehicle.model,
        class = assessment.risk_class.as_str().to_uppercase(),
        score = assessment.risk_score,
    );
    message(
        vehicle,
        MessageKind::HealthSummary,
        format!("{} {}: health check passed", vehicle.make, vehicle.model),
        body,
        None,
    )
}

fn booking_alert(booking: &Booking, diagnosis: &Diagnosis, vehicle: &VehicleContext) -> CustomerMessage {
    let action = diagnosis
        .recommended_actions
        .first()
        .map(String::as_str)
        .unwrap_or("Schedule service");
    let (kind, subject, opening, sign) = if diagnosis.risk_class == RiskClass::Critical {
        (
            MessageKind::CriticalAlert,
            format!("URGENT: {} {} requires immediate attention", vehicle.make, vehicle.model),
            format!(
                "URGENT: Your {} {} ({}) requires immediate attention.",
                vehicle.make, vehicle.model, vehicle.vin
            ),
            "Safety First",
        )
    } else {
        (
            MessageKind::WarningAlert,
            format!("{} {} requires attention soon", vehicle.make, vehicle.model),
            format!("Your {} {} requires attention soon.", vehicle.make, vehicle.model),
            "Best regards",
        )
    };
    let body = format!(
        "Dear {owner},\n\n\
         {opening}\n\n\
         Issue Detected: {issue}\n\
         Risk Level: {class}\n\
         Recommended Action: {action}\n\n\
         We have reserved a service appointment for you:\n\
         Date: {date}\n\
         Time: {time}\n\
         Location: {center} ({distance:.1} km)\n\n\
         Reply CONFIRM to keep this appointment, RESCHEDULE for another slot, or DECLINE.\n\n\
         {sign},\n{SIGN_OFF}",
        owner = vehicle.owner_name,
        issue = diagnosis.hypothesis,
        class = diagnosis.risk_class.as_str().to_uppercase(),
        date = booking.slot.start.format("%Y-%m-%d"),
        time = booking.slot.start.format("%H:%M UTC"),
        center = booking.center_name,
        distance = booking.distance_km,
    );
    message(vehicle, kind, subject, body, Some(booking))
}

fn booking_confirmation(booking: &Booking, vehicle: &VehicleContext) -> CustomerMessage {
    let body = format!(
        "Dear {owner},\n\n\
         Your service appointment has been confirmed!\n\n\
         Vehicle: {make} {model}\n\
         Date: {date}\n\
         Time: {time}\n\
         Location: {center}\n\
         Service Type: {service}\n\
         Estimated Duration: {duration} minutes\n\n\
         Please arrive 10 minutes before your scheduled time.\n\n\
         Thank you for choosing AutoSenseAI!",
        owner = vehicle.owner_name,
        make = vehicle.make,
        model = vehicle.model,
        date = booking.slot.start.format("%Y-%m-%d"),
        time = booking.slot.start.format("%H:%M UTC"),
        center = booking.center_name,
        service = booking.service_type.as_str(),
        duration = booking.slot.duration_minutes,
    );
    message(
        vehicle,
        MessageKind::BookingConfirmation,
        "Service appointment confirmed".to_string(),
        body,
        Some(booking),
    )
}

fn manual_follow_up(diagnosis: &Diagnosis, vehicle: &VehicleContext, radius_km: f64) -> CustomerMessage {
    let body = format!(
        "Dear {owner},\n\n\
         Your {make} {model} needs service: {issue}.\n\n\
         We could not find an available service slot within {radius:.0} km of your location. \
         A service advisor will contact you shortly to arrange an appointment.\n\n\
         Safety First,\n{SIGN_OFF}",
        owner = vehicle.owner_name,
        make = vehicle.make,
        model = vehicle.model,
        issue = diagnosis.hypothesis,
        radius = radius_km,
    );
    message(
        vehicle,
        MessageKind::ManualFollowUp,
        format!("{} {}: service advisor follow-up", vehicle.make, vehicle.model),
        body,
        None,
    )
}
