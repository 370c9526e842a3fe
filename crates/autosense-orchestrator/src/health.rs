//! Platform health.
//!
//! `ModelUnavailable` means the platform cannot assess risk for anyone, so
//! it is tracked here in addition to the per-run failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct PlatformHealth {
    model_unavailable: AtomicU64,
    last_alert: RwLock<Option<HealthAlert>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthAlert {
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl PlatformHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_model_unavailable(&self, reason: &str) {
        let count = self.model_unavailable.fetch_add(1, Ordering::AcqRel) + 1;
        *self
            .last_alert
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(HealthAlert {
            reason: reason.to_string(),
            at: Utc::now(),
        });
        tracing::error!(
            platform_alert = true,
            occurrences = count,
            reason,
            "Risk assessment unavailable"
        );
    }

    pub fn model_unavailable_count(&self) -> u64 {
        self.model_unavailable.load(Ordering::Acquire)
    }

    pub fn last_alert(&self) -> Option<HealthAlert> {
        self.last_alert
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.model_unavailable_count() > 0
    }
}
