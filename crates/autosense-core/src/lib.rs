//! autosense-core: Shared types, configuration, and error handling for the AutoSense pipeline.
//!
//! This crate provides the foundational types used across all AutoSense components:
//! - Telemetry, assessment, diagnosis, booking, and feedback entities
//! - The `Agent` capability contract implemented by every decision unit
//! - The pipeline configuration bundle and its atomic reload handle
//! - Common error types

pub mod agent;
pub mod config;
pub mod error;
pub mod types;

pub use agent::{Agent, AgentName};
pub use config::{PipelineConfig, Reloadable};
pub use error::AutosenseError;
