//! Core abstractions for the lexflow workflow engine
//!
//! This crate provides the data model, the condition grammar, and the
//! node-processor contract that the engine and the built-in node library
//! depend on. It contains no run-loop logic.

pub mod condition;
mod error;
pub mod events;
mod execution;
mod processor;
pub mod template;
mod workflow;

pub use condition::{Condition, ConditionOperator};
pub use error::{EngineError, ProcessorError};
pub use events::{EventBus, ExecutionEvent};
pub use execution::{
    ApprovalRequest, ApprovalStatus, ExecutionId, ExecutionStatus, NodeRun, NodeRunStatus,
    WorkflowExecution,
};
pub use processor::{
    NodeOutcome, NodeProcessor, NodeResult, ProcessorContext, SuspendReason,
};
pub use workflow::{
    ApprovalConfig, ArithmeticOp, ConditionConfig,
    DataTransformationConfig, DecisionConfig, DelayConfig, DocumentGenerationConfig,
    EmailConfig, FieldTransform, IntegrationConfig, NodeConfig, NodeId, NodeType,
    NotificationConfig, Operand, RetryPolicy, TaskConfig, TriggerType, WebhookConfig,
    WorkflowConnection, WorkflowDefinition, WorkflowId, WorkflowNode, WorkflowStatus,
    WorkflowTrigger,
};

/// Key/value bag used for execution context, trigger payloads, and node results.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
