//! Append-only persistence for pipeline entities.
//!
//! The orchestrator writes every assessment, diagnosis, and booking
//! version it produces. Reads are by vehicle only.

use std::sync::RwLock;

use autosense_core::types::{Assessment, Booking, Diagnosis, VehicleId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// External persistence collaborator.
pub trait RecordStore: Send + Sync {
    fn append_assessment(&self, assessment: &Assessment) -> Result<(), StoreError>;
    fn append_diagnosis(&self, diagnosis: &Diagnosis) -> Result<(), StoreError>;
    /// Append one version of a booking. Status changes append a new version.
    fn append_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    fn assessments_for(&self, vehicle_id: &VehicleId) -> Result<Vec<Assessment>, StoreError>;
    fn diagnoses_for(&self, vehicle_id: &VehicleId) -> Result<Vec<Diagnosis>, StoreError>;
    /// Latest version of each booking for the vehicle, in creation order.
    fn bookings_for(&self, vehicle_id: &VehicleId) -> Result<Vec<Booking>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    assessments: RwLock<Vec<Assessment>>,
    diagnoses: RwLock<Vec<Diagnosis>>,
    bookings: RwLock<Vec<Booking>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn append<T: Clone>(lock: &RwLock<Vec<T>>, item: &T) {
    lock.write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(item.clone());
}

fn select<T: Clone>(lock: &RwLock<Vec<T>>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    lock.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .filter(|item| keep(item))
        .cloned()
        .collect()
}

impl RecordStore for MemoryRecordStore {
    fn append_assessment(&self, assessment: &Assessment) -> Result<(), StoreError> {
        append(&self.assessments, assessment);
        Ok(())
    }

    fn append_diagnosis(&self, diagnosis: &Diagnosis) -> Result<(), StoreError> {
        append(&self.diagnoses, diagnosis);
        Ok(())
    }

    fn append_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        append(&self.bookings, booking);
        Ok(())
    }

    fn assessments_for(&self, vehicle_id: &VehicleId) -> Result<Vec<Assessment>, StoreError> {
        Ok(select(&self.assessments, |a| &a.vehicle_id == vehicle_id))
    }

    fn diagnoses_for(&self, vehicle_id: &VehicleId) -> Result<Vec<Diagnosis>, StoreError> {
        Ok(select(&self.diagnoses, |d| &d.vehicle_id == vehicle_id))
    }

    fn bookings_for(&self, vehicle_id: &VehicleId) -> Result<Vec<Booking>, StoreError> {
        let versions = select(&self.bookings, |b| &b.vehicle_id == vehicle_id);
        let mut latest: Vec<Booking> = Vec::new();
        for version in versions {
            match latest.iter_mut().find(|b| b.id == version.id) {
                Some(existing) => *existing = version,
                None => latest.push(version),
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosense_core::types::{
        BookingId, BookingStatus, CenterId, DiagnosisId, ServiceType, TimeSlot, UrgencyTier,
    };
    use chrono::Utc;

    fn booking(vehicle: &str) -> Booking {
        Booking {
            id: BookingId::new(),
            diagnosis_id: DiagnosisId::new(),
            vehicle_id: VehicleId::new(vehicle),
            center_id: CenterId::new("hero-central"),
            center_name: "Hero Service Hub - Central".to_string(),
            slot: TimeSlot {
                start: Utc::now(),
                duration_minutes: 30,
            },
            urgency: UrgencyTier::Soon,
            service_type: ServiceType::ElectricalService,
            distance_km: 3.0,
            status: BookingStatus::Proposed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bookings_for_returns_latest_version() {
        let store = MemoryRecordStore::new();
        let mut first = booking("HERO-0001");
        let second = booking("HERO-0001");
        store.append_booking(&first).unwrap();
        store.append_booking(&second).unwrap();
        store.append_booking(&booking("HERO-0002")).unwrap();

        first.transition(BookingStatus::Expired).unwrap();
        store.append_booking(&first).unwrap();

        let bookings = store.bookings_for(&VehicleId::new("HERO-0001")).unwrap();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[0].id, first.id);
        assert_eq!(bookings[0].status, BookingStatus::Expired);
        assert_eq!(bookings[1].status, BookingStatus::Proposed);
    }
}
