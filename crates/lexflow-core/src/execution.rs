use crate::workflow::{NodeId, WorkflowId};
use crate::DataMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// One runtime instance of a workflow definition.
///
/// Pins the definition version active at start time, so structural edits
/// never alter in-flight behavior. Mutated only by the engine and the
/// approval coordinator; `node_executions` is an append-only log keyed by
/// node id (an entry is re-written only when a suspended step resolves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub workflow_version: u32,
    pub status: ExecutionStatus,
    pub trigger_data: DataMap,
    pub context: DataMap,
    pub triggered_by: String,
    pub current_node_id: Option<NodeId>,
    pub node_executions: HashMap<NodeId, NodeRun>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new(
        workflow_id: WorkflowId,
        workflow_version: u32,
        variables: &DataMap,
        trigger_data: DataMap,
        triggered_by: impl Into<String>,
    ) -> Self {
        let mut context = variables.clone();
        for (key, value) in &trigger_data {
            context.insert(key.clone(), value.clone());
        }
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            workflow_version,
            status: ExecutionStatus::Pending,
            trigger_data,
            context,
            triggered_by: triggered_by.into(),
            current_node_id: None,
            node_executions: HashMap::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn record_node(&mut self, node_id: NodeId, run: NodeRun) {
        self.node_executions.insert(node_id, run);
        self.current_node_id = Some(node_id);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Log entry for a single node visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRun {
    pub status: NodeRunStatus,
    pub result: DataMap,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl NodeRun {
    pub fn completed(result: DataMap, attempts: u32) -> Self {
        Self {
            status: NodeRunStatus::Completed,
            result,
            attempts,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(result: DataMap, attempts: u32) -> Self {
        Self {
            status: NodeRunStatus::Failed,
            result,
            attempts,
            timestamp: Utc::now(),
        }
    }

    pub fn waiting(result: DataMap) -> Self {
        Self {
            status: NodeRunStatus::Waiting,
            result,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    /// The output port the node reported, used to select the outgoing
    /// connection.
    pub fn output(&self) -> Option<&str> {
        self.result.get("output").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Completed,
    Failed,
    Waiting,
}

/// Outstanding human decision for an Approval node. Resolved exactly once by
/// the approval coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub approvers: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub data: DataMap,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<String>,
    pub response_message: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        execution_id: ExecutionId,
        node_id: NodeId,
        approvers: Vec<String>,
        message: impl Into<String>,
        data: DataMap,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            node_id,
            approvers,
            message: message.into(),
            data,
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            responded_at: None,
            responded_by: None,
            response_message: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status != ApprovalStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}
