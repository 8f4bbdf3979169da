use crate::execution::{ApprovalStatus, ExecutionStatus};
use crate::workflow::{NodeType, WorkflowStatus};
use thiserror::Error;
use uuid::Uuid;

/// Engine-level failures surfaced across the execute/approve API boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("workflow {workflow_id} is not active (status: {status:?})")]
    WorkflowNotActive {
        workflow_id: Uuid,
        status: WorkflowStatus,
    },

    #[error("workflow validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("approval request not found: {0}")]
    ApprovalNotFound(Uuid),

    #[error("approval request {approval_id} already resolved ({status:?})")]
    ApprovalAlreadyResolved {
        approval_id: Uuid,
        status: ApprovalStatus,
    },

    #[error("execution {execution_id} is not waiting for approval (status: {status:?})")]
    ExecutionNotWaiting {
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error("no processor registered for node type: {0}")]
    UnknownNodeType(NodeType),

    #[error("node error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure signalled by a node processor. Treated as terminal for the
/// execution once the node's retry policy is exhausted.
#[derive(Error, Debug, Clone)]
pub enum ProcessorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("processing failed: {0}")]
    Failed(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("cancelled")]
    Cancelled,
}
