//! autosense-agents: the downstream decision units of the pipeline.
//!
//! - Diagnosis: anomalous assessment → subsystem hypothesis
//! - Scheduling: diagnosis → booking against the service-center registry
//! - Customer: booking or benign assessment → owner message and response
//! - RCA Feedback: fleet feedback window → manufacturing report
//!
//! Each agent borrows its configuration slice and collaborators for the
//! duration of one invocation, so a pipeline run never mixes bundles.

pub mod customer;
pub mod diagnosis;
pub mod error;
pub mod feedback;
pub mod knowledge;
pub mod rca;
pub mod registry;
pub mod scheduling;
pub mod transport;

pub use customer::{await_response, CustomerAgent, NotificationOutcome, NotifySubject};
pub use diagnosis::{DiagnosisAgent, DiagnosisRequest};
pub use error::{CustomerError, RegistryError, ScheduleError, TransportError};
pub use feedback::{FailureHistory, FeedbackLog, FeedbackWindow};
pub use rca::{RcaFeedbackAgent, RcaReport};
pub use registry::{InMemoryRegistry, ServiceCenter, ServiceCenterRegistry};
pub use scheduling::{ScheduleRequest, SchedulingAgent};
pub use transport::{CustomerMessage, InMemoryTransport, NotificationTransport, ResponsePolicy};
