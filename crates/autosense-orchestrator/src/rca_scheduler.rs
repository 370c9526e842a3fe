//! Periodic RCA recomputation.
//!
//! Decoupled from pipeline runs: each tick reads a snapshot of the feedback
//! log and replaces the latest report. Stale by up to one period.

use std::sync::{Arc, RwLock};

use autosense_agents::{FeedbackLog, RcaFeedbackAgent, RcaReport};
use autosense_core::Agent;
use autosense_predict::ConfigHandle;
use chrono::Utc;
use tokio::time::{interval, Duration};

/// A century; longer windows are clamped.
const MAX_WINDOW_HOURS: u64 = 100 * 365 * 24;

pub struct RcaScheduler {
    feedback: Arc<FeedbackLog>,
    bundle: Arc<ConfigHandle>,
    latest: RwLock<Option<Arc<RcaReport>>>,
}

impl RcaScheduler {
    pub fn new(feedback: Arc<FeedbackLog>, bundle: Arc<ConfigHandle>) -> Self {
        Self {
            feedback,
            bundle,
            latest: RwLock::new(None),
        }
    }

    /// Aggregate the configured window ending now and keep the result.
    pub fn run_once(&self) -> Arc<RcaReport> {
        let bundle = self.bundle.current();
        let config = &bundle.config.rca;
        let window_hours = config.window_hours.min(MAX_WINDOW_HOURS) as i64;
        let window = self
            .feedback
            .window(Utc::now(), chrono::Duration::hours(window_hours));

        let agent = RcaFeedbackAgent::new(config);
        let report = match agent.invoke(&window) {
            Ok(report) => Arc::new(report),
            Err(never) => match never {},
        };

        tracing::info!(
            total_records = report.total_records,
            recurring = report.recurring.len(),
            findings = report.findings.len(),
            oem_actions = report.findings.iter().filter(|f| f.oem_action_required).count(),
            "RCA report generated"
        );

        *self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&report));
        report
    }

    pub fn latest(&self) -> Option<Arc<RcaReport>> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recompute every `rca.interval_secs` until the runtime shuts down.
    pub async fn run(&self) {
        let secs = self.bundle.current().config.rca.interval_secs.max(1);
        self.run_with_period(Duration::from_secs(secs)).await;
    }

    pub async fn run_with_period(&self, period: Duration) {
        let mut ticker = interval(period);
        tracing::info!(period_ms = period.as_millis() as u64, "RCA scheduler started");
        loop {
            ticker.tick().await;
            self.run_once();
        }
    }
}
