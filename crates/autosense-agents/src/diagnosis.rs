//! Diagnosis Agent: anomalous assessment → subsystem-level hypothesis.
//!
//! Each contribution's weight is split across the subsystems its feature
//! implicates, in proportion to the configured mapping weights. The
//! subsystem with the most implicated mass wins. Ties go to the higher
//! historical failure base rate for the vehicle model, then to the
//! lexicographically first label. Mass on unmapped features is residual.

use std::collections::BTreeMap;
use std::convert::Infallible;

use autosense_core::config::DiagnosisConfig;
use autosense_core::types::{Assessment, Diagnosis, DiagnosisId, Subsystem};
use autosense_core::{Agent, AgentName};
use chrono::Utc;

use crate::feedback::FailureHistory;
use crate::knowledge;

/// What the Diagnosis Agent consumes.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosisRequest<'a> {
    pub assessment: &'a Assessment,
    /// Used to look up historical base rates for tie-breaks.
    pub vehicle_model: &'a str,
}

/// How the winning subsystem was picked. Recorded in the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub implicated: BTreeMap<Subsystem, f64>,
    pub residual: f64,
    pub total: f64,
    pub tied: Vec<Subsystem>,
}

pub struct DiagnosisAgent<'a> {
    config: &'a DiagnosisConfig,
    history: &'a dyn FailureHistory,
}

impl<'a> DiagnosisAgent<'a> {
    pub fn new(config: &'a DiagnosisConfig, history: &'a dyn FailureHistory) -> Self {
        Self { config, history }
    }

    /// Split contribution mass across implicated subsystems.
    pub fn attribute(&self, assessment: &Assessment) -> Attribution {
        let mut implicated: BTreeMap<Subsystem, f64> = BTreeMap::new();
        let mut residual = 0.0;
        let mut total = 0.0;

        for c in &assessment.contributions {
            let weight = if c.weight.is_finite() { c.weight.max(0.0) } else { 0.0 };
            total += weight;

            let mapping = self.config.subsystem_map.get(&c.feature);
            let mapped_sum: f64 = mapping
                .map(|ws| ws.iter().map(|w| w.weight).sum())
                .unwrap_or(0.0);

            match mapping {
                Some(ws) if mapped_sum > 0.0 => {
                    for w in ws {
                        *implicated.entry(w.subsystem).or_default() += weight * w.weight / mapped_sum;
                    }
                }
                _ => residual += weight,
            }
        }

        Attribution {
            implicated,
            residual,
            total,
            tied: Vec::new(),
        }
    }


    /// Pick the winning subsystem. Deterministic for identical inputs.
    fn select(&self, attribution: &mut Attribution, model: &str) -> Option<Subsystem> {
        let max = attribution
            .implicated
            .values()
            .copied()
            .fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return None;
        }

        let mut tied: Vec<Subsystem> = attribution
            .implicated
            .iter()
            .filter(|(_, mass)| max - **mass <= self.config.tie_epsilon)
            .map(|(s, _)| *s)
            .collect();
        if tied.len() > 1 {
            // One history read per tie-break.
            let history = self.history.subsystem_shares(model);
            let rates: BTreeMap<Subsystem, f64> = tied
                .iter()
                .map(|s| {
                    let rate = match &history {
                        Some(shares) => shares.get(s).copied().unwrap_or(0.0),
                        None => self.config.prior_base_rate(*s),
                    };
                    (*s, rate)
                })
                .collect();
            tied.sort_by(|a, b| {
                rates[b]
                    .total_cmp(&rates[a])
                    .then_with(|| a.label().cmp(b.label()))
            });
        }

        let winner = tied.first().copied();
        attribution.tied = tied;
        winner
    }

    pub fn diagnose(&self, request: DiagnosisRequest<'_>) -> Diagnosis {
        let assessment = request.assessment;
        let mut attribution = self.attribute(assessment);

        let (subsystem, mass) = match self.select(&mut attribution, request.vehicle_model) {
            Some(s) => (s, attribution.implicated.get(&s).copied().unwrap_or(0.0)),
            None => (Subsystem::Other, attribution.residual),
        };
        let confidence = if attribution.total > 0.0 {
            (mass / attribution.total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let leading_feature = assessment
            .contributions
            .iter()
            .find(|c| {
                self.config
                    .subsystem_map
                    .get(&c.feature)
                    .is_some_and(|ws| ws.iter().any(|w| w.subsystem == subsystem))
            })
            .map(|c| c.feature.as_str());
        let entry = knowledge::lookup(subsystem, leading_feature);
        let primary_cause = entry.causes.first().copied().unwrap_or("Requires inspection");
        let hypothesis = format!(
            "{} fault suspected ({}): most likely {}",
            subsystem.label(),
            entry.indicator,
            primary_cause.to_lowercase()
        );

        if attribution.tied.len() > 1 {
            tracing::debug!(
                vehicle_id = %assessment.vehicle_id,
                tied = ?attribution.tied,
                winner = %subsystem,
                "Subsystem tie broken"
            );
        }

        Diagnosis {
            id: DiagnosisId::new(),
            assessment_id: assessment.id,
            vehicle_id: assessment.vehicle_id.clone(),
            subsystem,
            confidence,
            hypothesis,
            evidence: assessment.contributions.clone(),
            recommended_actions: entry.actions.iter().map(|a| a.to_string()).collect(),
            estimated_repair_minutes: knowledge::repair_minutes(subsystem),
            risk_class: assessment.risk_class,
            diagnosed_at: Utc::now(),
        }
    }
}

impl Agent for DiagnosisAgent<'_> {
    type Input<'i> = DiagnosisRequest<'i>;
    type Output = Diagnosis;
    type Error = Infallible;

    fn name(&self) -> AgentName {
        AgentName::Diagnosis
    }

    fn invoke(&self, request: DiagnosisRequest<'_>) -> Result<Diagnosis, Infallible> {
        Ok(self.diagnose(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::feedback::{FeedbackLog, NoHistory};
    use autosense_core::config::SubsystemWeight;
    use autosense_core::types::{
        AssessmentId, CohortTags, Contribution, FeedbackRecord, RiskClass, SnapshotId, VehicleId,
    };

    fn assessment(contributions: &[(&str, f64)]) -> Assessment {
        Assessment {
            id: AssessmentId::new(),
            vehicle_id: VehicleId::new("MAH-0042"),
            snapshot_id: SnapshotId::new(),
            is_anomalous: true,
            risk_score: 0.92,
            risk_class: RiskClass::Critical,
            anomaly_score: 0.92,
            failure_mass: 0.92,
            contributions: contributions
                .iter()
                .map(|(f, w)| Contribution {
                    feature: f.to_string(),
                    weight: *w,
                })
                .collect(),
            assessed_at: Utc::now(),
        }
    }

    fn request(a: &Assessment) -> DiagnosisRequest<'_> {
        DiagnosisRequest {
            assessment: a,
            vehicle_model: "XUV700",
        }
    }

    #[test]
    fn dominant_feature_picks_subsystem() {
        let config = DiagnosisConfig::default();
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        let a = assessment(&[("brake_wear", 20.0), ("engine_temp", 1.0)]);
        let d = agent.diagnose(request(&a));

        assert_eq!(d.subsystem, Subsystem::Brakes);
        assert!((d.confidence - 20.0 / 21.0).abs() < 1e-12);
        assert_eq!(d.evidence, a.contributions);
        assert_eq!(d.estimated_repair_minutes, 90);
        assert_eq!(d.recommended_actions[0], "Replace brake pads");
        assert_eq!(d.assessment_id, a.id);
    }

    #[test]
    fn one_feature_implicates_several_subsystems() {
        let config = DiagnosisConfig::default();
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        // engine_temp splits 0.6 engine / 0.4 cooling; coolant_temp is all cooling.
        let a = assessment(&[("engine_temp", 10.0), ("coolant_temp", 3.0)]);
        let d = agent.diagnose(request(&a));
        assert_eq!(d.subsystem, Subsystem::CoolingSystem);
        assert!((d.confidence - 7.0 / 13.0).abs() < 1e-12);
    }

    #[test]
    fn tie_prefers_higher_prior_base_rate() {
        let config = DiagnosisConfig::default();
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        // Equal mass on battery and tires; default prior for tires is higher.
        let a = assessment(&[("battery_voltage", 2.0), ("tire_pressure_avg", 2.0)]);
        let d = agent.diagnose(request(&a));
        assert_eq!(d.subsystem, Subsystem::Tires);
    }

    #[test]
    fn tie_prefers_fleet_history_for_model() {
        let config = DiagnosisConfig::default();
        let log = FeedbackLog::new();
        log.append(FeedbackRecord {
            diagnosis_id: DiagnosisId::new(),
            vehicle_id: VehicleId::new("MAH-0007"),
            subsystem: Subsystem::Battery,
            confidence: 0.7,
            cohort: CohortTags {
                model: "XUV700".to_string(),
                production_batch: "B1".to_string(),
            },
            recorded_at: Utc::now(),
        });
        let agent = DiagnosisAgent::new(&config, &log);
        let a = assessment(&[("battery_voltage", 2.0), ("tire_pressure_avg", 2.0)]);
        assert_eq!(agent.diagnose(request(&a)).subsystem, Subsystem::Battery);
    }

    /// Counts history reads.
    struct CountingHistory(AtomicUsize);

    impl FailureHistory for CountingHistory {
        fn subsystem_shares(&self, _model: &str) -> Option<BTreeMap<Subsystem, f64>> {
            self.0.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    #[test]
    fn tie_break_reads_history_once() {
        let config = DiagnosisConfig::default();
        let history = CountingHistory(AtomicUsize::new(0));
        let agent = DiagnosisAgent::new(&config, &history);
        let a = assessment(&[
            ("battery_voltage", 2.0),
            ("tire_pressure_avg", 2.0),
            ("brake_wear", 2.0),
        ]);
        agent.diagnose(request(&a));
        assert_eq!(history.0.load(Ordering::Relaxed), 1);

        let a = assessment(&[("brake_wear", 3.0)]);
        agent.diagnose(request(&a));
        assert_eq!(history.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn full_tie_falls_back_to_label_order() {
        let mut config = DiagnosisConfig::default();
        config.base_rates.insert("battery".to_string(), 0.5);
        config.base_rates.insert("tires".to_string(), 0.5);
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        let a = assessment(&[("tire_pressure_avg", 2.0), ("battery_voltage", 2.0)]);
        for _ in 0..10 {
            assert_eq!(agent.diagnose(request(&a)).subsystem, Subsystem::Battery);
        }
    }

    #[test]
    fn unmapped_features_fall_back_to_other() {
        let config = DiagnosisConfig::default();
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        let a = assessment(&[("odometer_km", 1.5), ("vehicle_age_days", 0.5)]);
        let d = agent.diagnose(request(&a));
        assert_eq!(d.subsystem, Subsystem::Other);
        assert!((d.confidence - 1.0).abs() < 1e-12);
        assert_eq!(d.recommended_actions, vec!["General inspection".to_string()]);
    }

    #[test]
    fn empty_contributions_give_zero_confidence_other() {
        let config = DiagnosisConfig::default();
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        let a = assessment(&[]);
        let d = agent.invoke(request(&a)).unwrap();
        assert_eq!(d.subsystem, Subsystem::Other);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn custom_mapping_is_honoured() {
        let mut config = DiagnosisConfig::default();
        config.subsystem_map.insert(
            "speed".to_string(),
            vec![SubsystemWeight {
                subsystem: Subsystem::Tires,
                weight: 1.0,
            }],
        );
        let agent = DiagnosisAgent::new(&config, &NoHistory);
        let a = assessment(&[("speed", 5.0)]);
        assert_eq!(agent.diagnose(request(&a)).subsystem, Subsystem::Tires);
    }
}
