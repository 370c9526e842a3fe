//! Service-center registry contract and an in-process implementation.
//!
//! The registry is the one shared resource pipeline runs contend on.
//! `try_reserve` is a compare-and-decrement: two runs racing for a
//! center's last slot can never both succeed.

use std::sync::atomic::{AtomicU32, Ordering};

use autosense_core::types::{CenterId, GeoPoint};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Specialty tags that mark a center as able to handle any subsystem.
const GENERALIST_TAGS: [&str; 3] = ["all", "general", "full-service"];

/// Search parameters sent to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterQuery {
    pub location: GeoPoint,
    pub radius_km: f64,
    /// Required specialty tag, if any.
    pub specialty: Option<String>,
    pub now: DateTime<Utc>,
    /// Latest acceptable slot start.
    pub latest_slot: DateTime<Utc>,
}

/// One registry hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CenterAvailability {
    pub center_id: CenterId,
    pub name: String,
    pub distance_km: f64,
    pub next_slot: DateTime<Utc>,
    pub remaining_capacity: u32,
}

/// External service-center registry.
pub trait ServiceCenterRegistry: Send + Sync {
    /// Centers within radius, window, and specialty that still have capacity.
    fn query(&self, query: &CenterQuery) -> Result<Vec<CenterAvailability>, RegistryError>;

    /// Atomically take one unit of capacity. `Ok(false)` when none is left.
    fn try_reserve(&self, center_id: &CenterId) -> Result<bool, RegistryError>;

    /// Return one unit of capacity taken by `try_reserve`.
    fn release(&self, center_id: &CenterId) -> Result<(), RegistryError>;
}

/// Static description of a service center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCenter {
    pub id: CenterId,
    pub name: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub capacity: u32,
    #[serde(default)]
    pub current_load: u32,
    /// Hours from now until the next open slot.
    #[serde(default = "default_slot_offset")]
    pub next_slot_offset_hours: u32,
    #[serde(default)]
    pub rating: f64,
}

fn default_slot_offset() -> u32 {
    24
}

impl ServiceCenter {
    pub fn covers(&self, specialty: &str) -> bool {
        self.specialties
            .iter()
            .any(|s| s == specialty || GENERALIST_TAGS.contains(&s.as_str()))
    }
}

struct Entry {
    center: ServiceCenter,
    remaining: AtomicU32,
}

/// Registry backed by a fixed list of centers.
pub struct InMemoryRegistry {
    entries: Vec<Entry>,
}

impl InMemoryRegistry {
    pub fn new(centers: Vec<ServiceCenter>) -> Self {
        let entries = centers
            .into_iter()
            .map(|center| Entry {
                remaining: AtomicU32::new(center.capacity.saturating_sub(center.current_load)),
                center,
            })
            .collect();
        Self { entries }
    }

    /// The Mumbai-area network used for demos and tests.
    pub fn seeded() -> Self {
        Self::new(seed_centers())
    }

    pub fn remaining(&self, center_id: &CenterId) -> Option<u32> {
        self.entry(center_id)
            .map(|e| e.remaining.load(Ordering::Acquire))
    }

    fn entry(&self, center_id: &CenterId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.center.id == center_id)
    }
}

impl ServiceCenterRegistry for InMemoryRegistry {
    fn query(&self, query: &CenterQuery) -> Result<Vec<CenterAvailability>, RegistryError> {
        let hits = self
            .entries
            .iter()
            .filter_map(|e| {
                let remaining = e.remaining.load(Ordering::Acquire);
                if remaining == 0 {
                    return None;
                }
                if let Some(tag) = &query.specialty {
                    if !e.center.covers(tag) {
                        return None;
                    }
                }
                let distance_km = query.location.distance_km(&e.center.location);
                if distance_km > query.radius_km {
                    return None;
                }
                let next_slot =
                    query.now + Duration::hours(i64::from(e.center.next_slot_offset_hours));
                if next_slot > query.latest_slot {
                    return None;
                }
                Some(CenterAvailability {
                    center_id: e.center.id.clone(),
                    name: e.center.name.clone(),
                    distance_km,
                    next_slot,
                    remaining_capacity: remaining,
                })
            })
            .collect();
        Ok(hits)
    }

    fn try_reserve(&self, center_id: &CenterId) -> Result<bool, RegistryError> {
        let entry = self
            .entry(center_id)
            .ok_or_else(|| RegistryError::UnknownCenter(center_id.clone()))?;
        let reserved = entry
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        Ok(reserved)
    }

    fn release(&self, center_id: &CenterId) -> Result<(), RegistryError> {
        let entry = self
            .entry(center_id)
            .ok_or_else(|| RegistryError::UnknownCenter(center_id.clone()))?;
        let capacity = entry.center.capacity;
        // Never release past the configured capacity.
        let _ = entry
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            });
        Ok(())
    }
}

/// Five centers across the Mumbai metropolitan region.
pub fn seed_centers() -> Vec<ServiceCenter> {
    let center = |id: &str,
                  name: &str,
                  (lat, lon): (f64, f64),
                  capacity: u32,
                  current_load: u32,
                  specialties: &[&str],
                  next_slot_offset_hours: u32,
                  rating: f64| ServiceCenter {
        id: CenterId::new(id),
        name: name.to_string(),
        location: GeoPoint::new(lat, lon),
        specialties: specialties.iter().map(|s| s.to_string()).collect(),
        capacity,
        current_load,
        next_slot_offset_hours,
        rating,
    };
    vec![
        center(
            "hero-central",
            "Hero Service Hub - Central",
            (18.9690, 72.8205),
            15,
            3,
            &["two-wheeler", "engine", "electrical"],
            24,
            4.5,
        ),
        center(
            "mahindra-andheri",
            "Mahindra Authorized - Andheri",
            (19.1364, 72.8296),
            20,
            5,
            &["SUV", "engine", "transmission", "body"],
            24,
            4.3,
        ),
        center(
            "hero-thane",
            "Hero Express Service",
            (19.2183, 72.9781),
            10,
            2,
            &["two-wheeler", "quick-service"],
            12,
            4.7,
        ),
        center(
            "mahindra-powai",
            "Mahindra Premium Care",
            (19.1176, 72.9060),
            25,
            8,
            &["SUV", "premium", "full-service"],
            48,
            4.8,
        ),
        center(
            "multibrand-navi-mumbai",
            "Multi-brand Service Center",
            (19.0330, 73.0297),
            30,
            10,
            &["all", "general"],
            24,
            4.0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn one_slot_center() -> ServiceCenter {
        ServiceCenter {
            id: CenterId::new("solo"),
            name: "Solo Garage".to_string(),
            location: GeoPoint::new(19.0760, 72.8777),
            specialties: vec!["brakes".to_string()],
            capacity: 1,
            current_load: 0,
            next_slot_offset_hours: 2,
            rating: 4.0,
        }
    }

    #[test]
    fn reserve_until_empty_then_release() {
        let registry = InMemoryRegistry::new(vec![one_slot_center()]);
        let id = CenterId::new("solo");
        assert!(registry.try_reserve(&id).unwrap());
        assert!(!registry.try_reserve(&id).unwrap());
        assert_eq!(registry.remaining(&id), Some(0));

        registry.release(&id).unwrap();
        registry.release(&id).unwrap();
        assert_eq!(registry.remaining(&id), Some(1));
    }

    #[test]
    fn concurrent_reservations_never_overbook() {
        let registry = Arc::new(InMemoryRegistry::new(vec![one_slot_center()]));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.try_reserve(&CenterId::new("solo")).unwrap())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn query_filters_radius_window_specialty_and_capacity() {
        let registry = InMemoryRegistry::seeded();
        let now = Utc::now();
        let mut query = CenterQuery {
            location: GeoPoint::new(19.0760, 72.8777),
            radius_km: 200.0,
            specialty: Some("transmission".to_string()),
            now,
            latest_slot: now + Duration::hours(72),
        };
        let ids: Vec<String> = registry
            .query(&query)
            .unwrap()
            .into_iter()
            .map(|c| c.center_id.0)
            .collect();
        assert!(ids.contains(&"mahindra-andheri".to_string()));
        assert!(ids.contains(&"mahindra-powai".to_string()));
        assert!(ids.contains(&"multibrand-navi-mumbai".to_string()));
        assert!(!ids.contains(&"hero-central".to_string()));

        query.latest_slot = now + Duration::hours(24);
        let ids: Vec<String> = registry
            .query(&query)
            .unwrap()
            .into_iter()
            .map(|c| c.center_id.0)
            .collect();
        assert!(!ids.contains(&"mahindra-powai".to_string()));

        query.radius_km = 0.5;
        assert!(registry.query(&query).unwrap().is_empty());
    }

    #[test]
    fn unknown_center_is_an_error() {
        let registry = InMemoryRegistry::seeded();
        assert!(matches!(
            registry.try_reserve(&CenterId::new("nowhere")),
            Err(RegistryError::UnknownCenter(_))
        ));
    }
}
