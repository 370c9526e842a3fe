//! autosense-orchestrator: the Master Orchestrator.
//!
//! Drives each telemetry event through the agent chain as an explicit
//! state machine, keeps a per-vehicle ledger of terminal runs, tracks
//! platform health, and recomputes the fleet RCA report on a schedule.

pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod rca_scheduler;
pub mod run;
pub mod store;

pub use config::{AppConfig, RuntimeConfig};
pub use error::{OrchestratorError, Result};
pub use health::PlatformHealth;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, PipelineEvent};
pub use rca_scheduler::RcaScheduler;
pub use run::{RunLedger, RunSummary};
pub use store::{MemoryRecordStore, RecordStore, StoreError};
