use crate::workflow::{NodeType, WorkflowNode};
use crate::{DataMap, ProcessorError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Capability contract for a single node type.
///
/// Processors are pure with respect to engine state: they read the execution
/// context and the node's config, perform an external effect through a
/// collaborator, and return an outcome the engine records verbatim. A
/// processor that cannot complete must return an error rather than an
/// ambiguous outcome.
#[async_trait]
pub trait NodeProcessor: Send + Sync {
    fn node_type(&self) -> NodeType;

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError>;
}

/// Read-only view handed to a processor for one step.
pub struct ProcessorContext<'a> {
    pub node: &'a WorkflowNode,
    /// Current execution context (definition variables + trigger data +
    /// accumulated updates).
    pub context: &'a DataMap,
    /// Result of the most recently completed node, if any.
    pub last_result: Option<&'a DataMap>,
    /// Observed at suspension/await points for cooperative cancellation.
    pub cancellation: &'a CancellationToken,
}

/// What the engine should do after a step.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// Record the result and traverse the matching outgoing connection.
    Advance(NodeResult),
    /// Record the result; the run loop ends here (End nodes).
    Complete(NodeResult),
    /// Halt mid-graph; resumption is driven externally.
    Suspend(SuspendReason),
}

/// Why an execution suspended.
#[derive(Debug, Clone)]
pub enum SuspendReason {
    /// Wait for a human decision. The engine creates the ApprovalRequest.
    Approval {
        approvers: Vec<String>,
        message: String,
        data: DataMap,
    },
    /// Wait until the recorded wake time. The timestamp is persisted on the
    /// node run so a restarted engine can resume the delay.
    DelayUntil { wake_at: DateTime<Utc> },
}

/// A completed step: the reported output port plus opaque result data and
/// any context mutations, applied by the engine before the step is recorded.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub output: String,
    pub data: DataMap,
    pub context_updates: DataMap,
}

impl NodeResult {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: DataMap::new(),
            context_updates: DataMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_context_update(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.into(), value.into());
        self
    }

    /// Flatten into the map stored in `node_executions`, with the mandatory
    /// `output` port alongside the result data.
    pub fn into_record(self) -> DataMap {
        let mut record = self.data;
        record.insert("output".to_string(), Value::String(self.output));
        record
    }
}
