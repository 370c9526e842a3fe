//! RCA Feedback Agent: fleet feedback window → manufacturing report.
//!
//! A pure reducer over immutable feedback records. Computes recurring
//! subsystems, per-cohort failure shares, window-over-window trends, and
//! one manufacturing finding per recurring subsystem. A report is empty only
//! when both the current and the prior window are.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;

use autosense_core::config::RcaConfig;
use autosense_core::types::{FeedbackRecord, Subsystem, VehicleId};
use autosense_core::{Agent, AgentName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackWindow;
use crate::knowledge;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubsystemFrequency {
    pub subsystem: Subsystem,
    pub count: usize,
    /// Share of all records in the current window.
    pub share: f64,
}

/// Failure share of one subsystem within one production cohort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohortRate {
    pub model: String,
    pub production_batch: String,
    pub subsystem: Subsystem,
    pub count: usize,
    /// Records for this cohort in the window.
    pub cohort_total: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubsystemTrend {
    pub subsystem: Subsystem,
    pub current: usize,
    pub prior: usize,
    /// `(current - prior) / prior`; absent when the prior window is empty.
    pub rate_of_change: Option<f64>,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Medium,
    High,
}

/// Manufacturing-facing conclusion for one recurring subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManufacturingFinding {
    pub subsystem: Subsystem,
    pub suspected_cause: String,
    pub recommendation: String,
    pub affected_vehicles: usize,
    pub severity: FindingSeverity,
    pub oem_action_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RcaReport {
    pub generated_at: DateTime<Utc>,
    pub total_records: usize,
    pub recurring: Vec<SubsystemFrequency>,
    pub cohorts: Vec<CohortRate>,
    pub trends: Vec<SubsystemTrend>,
    pub findings: Vec<ManufacturingFinding>,
}

impl RcaReport {
    pub fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            total_records: 0,
            recurring: Vec::new(),
            cohorts: Vec::new(),
            trends: Vec::new(),
            findings: Vec::new(),
        }
    }

    /// No records in either window. A quiet current window after a busy
    /// prior one still carries decreasing trends.
    pub fn is_empty(&self) -> bool {
        self.total_records == 0 && self.trends.is_empty()
    }
}

pub struct RcaFeedbackAgent<'a> {
    config: &'a RcaConfig,
}

impl<'a> RcaFeedbackAgent<'a> {
    pub fn new(config: &'a RcaConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(&self, window: &FeedbackWindow) -> RcaReport {
        if window.current.is_empty() && window.prior.is_empty() {
            return RcaReport::empty();
        }

        let current = count_by_subsystem(&window.current);
        let prior = count_by_subsystem(&window.prior);
        let total = window.current.len();

        let mut recurring: Vec<SubsystemFrequency> = current
            .iter()
            .map(|(subsystem, count)| SubsystemFrequency {
                subsystem: *subsystem,
                count: *count,
                share: *count as f64 / total as f64,
            })
            .collect();
        recurring.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.subsystem.label().cmp(b.subsystem.label()))
        });
        recurring.truncate(self.config.top_n);

        let trends = trends(&current, &prior);
        let cohorts = cohort_rates(&window.current);

        let findings = recurring
            .iter()
            .map(|freq| {
                let affected = distinct_vehicles(&window.current, freq.subsystem);
                let increasing = trends
                    .iter()
                    .any(|t| t.subsystem == freq.subsystem && t.direction == TrendDirection::Increasing);
                ManufacturingFinding {
                    subsystem: freq.subsystem,
                    suspected_cause: knowledge::suspected_design_cause(freq.subsystem).to_string(),
                    recommendation: knowledge::manufacturing_recommendation(freq.subsystem)
                        .to_string(),
                    affected_vehicles: affected,
                    severity: if increasing {
                        FindingSeverity::High
                    } else {
                        FindingSeverity::Medium
                    },
                    oem_action_required: affected > self.config.oem_action_min_vehicles,
                }
            })
            .collect();

        RcaReport {
            generated_at: Utc::now(),
            total_records: total,
            recurring,
            cohorts,
            trends,
            findings,
        }
    }
}

impl Agent for RcaFeedbackAgent<'_> {
    type Input<'i> = &'i FeedbackWindow;
    type Output = RcaReport;
    type Error = Infallible;

    fn name(&self) -> AgentName {
        AgentName::RcaFeedback
    }

    fn invoke(&self, window: &FeedbackWindow) -> Result<RcaReport, Infallible> {
        Ok(self.aggregate(window))
    }
}

fn count_by_subsystem(records: &[FeedbackRecord]) -> BTreeMap<Subsystem, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.subsystem).or_insert(0) += 1;
    }
    counts
}

fn distinct_vehicles(records: &[FeedbackRecord], subsystem: Subsystem) -> usize {
    records
        .iter()
        .filter(|r| r.subsystem == subsystem)
        .map(|r| &r.vehicle_id)
        .collect::<BTreeSet<&VehicleId>>()
        .len()
}

fn trends(
    current: &BTreeMap<Subsystem, usize>,
    prior: &BTreeMap<Subsystem, usize>,
) -> Vec<SubsystemTrend> {
    let subsystems: BTreeSet<Subsystem> = current.keys().chain(prior.keys()).copied().collect();
    let mut trends: Vec<SubsystemTrend> = subsystems
        .into_iter()
        .map(|subsystem| {
            let now = current.get(&subsystem).copied().unwrap_or(0);
            let before = prior.get(&subsystem).copied().unwrap_or(0);
            let rate_of_change =
                (before > 0).then(|| (now as f64 - before as f64) / before as f64);
            let direction = match now.cmp(&before) {
                std::cmp::Ordering::Greater => TrendDirection::Increasing,
                std::cmp::Ordering::Equal => TrendDirection::Stable,
                std::cmp::Ordering::Less => TrendDirection::Decreasing,
            };
            SubsystemTrend {
                subsystem,
                current: now,
                prior: before,
                rate_of_change,
                direction,
            }
        })
        .collect();
    trends.sort_by(|a, b| a.subsystem.label().cmp(b.subsystem.label()));
    trends
}

fn cohort_rates(records: &[FeedbackRecord]) -> Vec<CohortRate> {
    let mut totals: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    let mut counts: BTreeMap<(&str, &str, Subsystem), usize> = BTreeMap::new();
    for r in records {
        let key = (r.cohort.model.as_str(), r.cohort.production_batch.as_str());
        *totals.entry(key).or_insert(0) += 1;
        *counts.entry((key.0, key.1, r.subsystem)).or_insert(0) += 1;
    }

    let mut rates: Vec<CohortRate> = counts
        .into_iter()
        .map(|((model, batch, subsystem), count)| {
            let cohort_total = totals.get(&(model, batch)).copied().unwrap_or(count);
            CohortRate {
                model: model.to_string(),
                production_batch: batch.to_string(),
                subsystem,
                count,
                cohort_total,
                rate: count as f64 / cohort_total as f64,
            }
        })
        .collect();
    rates.sort_by(|a, b| {
        b.rate
            .total_cmp(&a.rate)
            .then_with(|| a.model.cmp(&b.model))
            .then_with(|| a.production_batch.cmp(&b.production_batch))
            .then_with(|| a.subsystem.label().cmp(b.subsystem.label()))
    });
    rates
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosense_core::types::{CohortTags, DiagnosisId};

    fn record(vehicle: &str, batch: &str, subsystem: Subsystem) -> FeedbackRecord {
        FeedbackRecord {
            diagnosis_id: DiagnosisId::new(),
            vehicle_id: VehicleId::new(vehicle),
            subsystem,
            confidence: 0.8,
            cohort: CohortTags {
                model: "XUV700".to_string(),
                production_batch: batch.to_string(),
            },
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn empty_window_gives_empty_report() {
        let config = RcaConfig::default();
        let report = RcaFeedbackAgent::new(&config)
            .invoke(&FeedbackWindow::default())
            .unwrap();
        assert!(report.is_empty());
        assert!(report.recurring.is_empty());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn recurring_subsystems_ranked_by_frequency() {
        let config = RcaConfig {
            top_n: 2,
            ..RcaConfig::default()
        };
        let window = FeedbackWindow {
            current: vec![
                record("V1", "B1", Subsystem::Brakes),
                record("V2", "B1", Subsystem::Brakes),
                record("V3", "B2", Subsystem::Engine),
                record("V4", "B2", Subsystem::Battery),
                record("V5", "B2", Subsystem::Brakes),
            ],
            prior: vec![],
        };
        let report = RcaFeedbackAgent::new(&config).aggregate(&window);
        assert_eq!(report.total_records, 5);
        assert_eq!(report.recurring.len(), 2);
        assert_eq!(report.recurring[0].subsystem, Subsystem::Brakes);
        assert_eq!(report.recurring[0].count, 3);
        // Battery and engine tie on count; label order decides.
        assert_eq!(report.recurring[1].subsystem, Subsystem::Battery);
        assert!((report.recurring[0].share - 0.6).abs() < 1e-12);
    }

    #[test]
    fn cohort_rates_by_batch() {
        let config = RcaConfig::default();
        let window = FeedbackWindow {
            current: vec![
                record("V1", "B1", Subsystem::Brakes),
                record("V2", "B1", Subsystem::Brakes),
                record("V3", "B1", Subsystem::Engine),
                record("V4", "B2", Subsystem::Brakes),
            ],
            prior: vec![],
        };
        let report = RcaFeedbackAgent::new(&config).aggregate(&window);
        let b1_brakes = report
            .cohorts
            .iter()
            .find(|c| c.production_batch == "B1" && c.subsystem == Subsystem::Brakes)
            .unwrap();
        assert_eq!(b1_brakes.cohort_total, 3);
        assert!((b1_brakes.rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn quiet_window_after_busy_one_is_not_empty() {
        let config = RcaConfig::default();
        let window = FeedbackWindow {
            current: vec![],
            prior: vec![
                record("V1", "B1", Subsystem::Brakes),
                record("V2", "B1", Subsystem::Brakes),
            ],
        };
        let report = RcaFeedbackAgent::new(&config).aggregate(&window);

        assert!(!report.is_empty());
        assert_eq!(report.total_records, 0);
        assert!(report.recurring.is_empty());
        assert!(report.findings.is_empty());
        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.trends[0].direction, TrendDirection::Decreasing);
        assert_eq!(report.trends[0].rate_of_change, Some(-1.0));
    }

    #[test]
    fn trend_against_prior_window() {
        let config = RcaConfig::default();
        let window = FeedbackWindow {
            current: vec![
                record("V1", "B1", Subsystem::Brakes),
                record("V2", "B1", Subsystem::Brakes),
                record("V3", "B1", Subsystem::Brakes),
            ],
            prior: vec![
                record("V1", "B1", Subsystem::Brakes),
                record("V9", "B1", Subsystem::Tires),
            ],
        };
        let report = RcaFeedbackAgent::new(&config).aggregate(&window);

        let brakes = report
            .trends
            .iter()
            .find(|t| t.subsystem == Subsystem::Brakes)
            .unwrap();
        assert_eq!(brakes.direction, TrendDirection::Increasing);
        assert_eq!(brakes.rate_of_change, Some(2.0));

        let tires = report
            .trends
            .iter()
            .find(|t| t.subsystem == Subsystem::Tires)
            .unwrap();
        assert_eq!(tires.direction, TrendDirection::Decreasing);
        assert_eq!(tires.rate_of_change, Some(-1.0));

        assert_eq!(report.findings[0].severity, FindingSeverity::High);
    }

    #[test]
    fn oem_action_needs_more_than_threshold_vehicles() {
        let config = RcaConfig::default();
        let mut current: Vec<FeedbackRecord> = (1..=3)
            .map(|i| record(&format!("V{i}"), "B1", Subsystem::Engine))
            .collect();
        // Repeat diagnoses of one vehicle count once.
        current.push(record("V1", "B1", Subsystem::Engine));
        let window = FeedbackWindow {
            current: current.clone(),
            prior: vec![],
        };
        let report = RcaFeedbackAgent::new(&config).aggregate(&window);
        assert_eq!(report.findings[0].affected_vehicles, 3);
        assert!(!report.findings[0].oem_action_required);

        current.push(record("V4", "B1", Subsystem::Engine));
        let report = RcaFeedbackAgent::new(&config).aggregate(&FeedbackWindow {
            current,
            prior: vec![],
        });
        assert!(report.findings[0].oem_action_required);
        assert_eq!(report.findings[0].suspected_cause, "Material fatigue");
    }
}
