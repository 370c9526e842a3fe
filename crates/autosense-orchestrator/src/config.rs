//! Application configuration for the `autosense` binary.
//!
//! Loaded from `{prefix}.toml` (optional) and `AUTOSENSE__` environment
//! variables, e.g. `AUTOSENSE__PREDICTION__ANOMALY_THRESHOLD=0.7` or
//! `AUTOSENSE__RUNTIME__AUTO_RESPONSE=confirm`.

use autosense_agents::registry::seed_centers;
use autosense_agents::ServiceCenter;
use autosense_core::types::OwnerResponse;
use autosense_core::PipelineConfig;
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Registry contents for CLI runs.
    #[serde(default = "seed_centers")]
    pub service_centers: Vec<ServiceCenter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum pipeline runs in flight at once.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Directory of the file-backed audit store. In-memory when unset.
    #[serde(default)]
    pub audit_dir: Option<String>,

    /// Answer given to every decision request. Unset means no answer,
    /// so bookings expire after `customer.response_timeout_ms`.
    #[serde(default)]
    pub auto_response: Option<OwnerResponse>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            audit_dir: None,
            auto_response: None,
        }
    }
}

fn default_max_concurrent_runs() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            runtime: RuntimeConfig::default(),
            service_centers: seed_centers(),
        }
    }
}

impl AppConfig {
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("AUTOSENSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let app: AppConfig = cfg.try_deserialize()?;
        app.pipeline
            .validate()
            .map_err(|e| crate::error::OrchestratorError::Config(e.to_string()))?;
        Ok(app)
    }
}
