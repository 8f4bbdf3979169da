use crate::execution::{ExecutionId, ExecutionStatus};
use crate::workflow::{NodeId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        workflow_version: u32,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        output: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ApprovalRequested {
        execution_id: ExecutionId,
        approval_id: Uuid,
        node_id: NodeId,
        approvers: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    DelayScheduled {
        execution_id: ExecutionId,
        node_id: NodeId,
        wake_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    ExecutionResumed {
        execution_id: ExecutionId,
        node_id: NodeId,
        approved: bool,
        timestamp: DateTime<Utc>,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        duration_ms: Option<i64>,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for execution events. Receivers that lag simply miss
/// events; the bus never blocks the engine.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}
