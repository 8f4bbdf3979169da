//! Workflow execution engine: graph validation, the run loop with
//! suspend/resume, approval coordination, and execution analytics.

pub mod analytics;
mod approvals;
mod engine;
mod executor;
mod registry;
pub mod validator;

pub use analytics::{NodeStats, WorkflowAnalytics};
pub use approvals::ApprovalCoordinator;
pub use engine::{EngineConfig, WorkflowEngine};
pub use registry::ProcessorRegistry;
pub use validator::{validate, ValidationReport};
