//! The capability contract shared by every decision unit in the pipeline.
//!
//! Each agent consumes one upstream entity and produces one downstream
//! entity. The orchestrator wires agents together through a fixed
//! dependency order; it never inspects agent types at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable name of each agent, used in audit events and logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Master,
    FeatureExtractor,
    Prediction,
    Diagnosis,
    Scheduling,
    Customer,
    RcaFeedback,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Master => "master_agent",
            AgentName::FeatureExtractor => "feature_extractor",
            AgentName::Prediction => "prediction_agent",
            AgentName::Diagnosis => "diagnosis_agent",
            AgentName::Scheduling => "scheduling_agent",
            AgentName::Customer => "customer_agent",
            AgentName::RcaFeedback => "rca_feedback_agent",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-responsibility decision unit: `{input type, output type, invoke}`.
///
/// Agents that cannot fail use `std::convert::Infallible` as their error.
pub trait Agent {
    type Input<'a>;
    type Output;
    type Error: std::error::Error;

    fn name(&self) -> AgentName;

    fn invoke(&self, input: Self::Input<'_>) -> Result<Self::Output, Self::Error>;
}
