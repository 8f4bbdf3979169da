use crate::approvals::ApprovalCoordinator;
use crate::registry::ProcessorRegistry;
use chrono::Utc;
use lexflow_core::{
    condition, ApprovalRequest, DataMap, EventBus, ExecutionEvent, ExecutionId, ExecutionStatus,
    NodeId, NodeOutcome, NodeResult, NodeRun, NodeRunStatus, ProcessorContext, ProcessorError,
    SuspendReason, WorkflowDefinition, WorkflowExecution, WorkflowNode,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) type SharedExecutions = Arc<RwLock<HashMap<ExecutionId, WorkflowExecution>>>;

/// Live driver task for an execution. The id tells a finished task's own
/// entry apart from one a resume has already replaced.
pub(crate) struct TaskHandle {
    pub id: Uuid,
    pub cancellation: CancellationToken,
}

pub(crate) type TaskTable = Arc<RwLock<HashMap<ExecutionId, TaskHandle>>>;

/// Select the outgoing connection for a node's reported result.
///
/// Connections are scanned in authoring order; the first one whose
/// `source_output` matches the reported output port and whose guard (if any)
/// holds wins. Later matches are never taken, even when their conditions are
/// also true.
pub(crate) fn next_node(
    definition: &WorkflowDefinition,
    from: NodeId,
    result: &DataMap,
    context: &DataMap,
) -> Option<NodeId> {
    let output = result.get("output")?.as_str()?;
    definition
        .connections_from(from)
        .filter(|c| c.source_output == output)
        .find(|c| {
            c.condition
                .as_ref()
                .map_or(true, |cond| condition::evaluate(cond, context, Some(result)))
        })
        .map(|c| c.target_node_id)
}

/// Drives one execution on its own tokio task: processes nodes sequentially,
/// records each step, and stops at suspension points, terminal states, or
/// cancellation.
pub(crate) struct ExecutionDriver {
    pub definition: Arc<WorkflowDefinition>,
    pub execution_id: ExecutionId,
    pub executions: SharedExecutions,
    pub approvals: ApprovalCoordinator,
    pub registry: Arc<ProcessorRegistry>,
    pub events: Arc<EventBus>,
    pub cancellation: CancellationToken,
    /// Result namespace seeded for the first node, used when resuming after
    /// an approval so guards and branches still see `result.*`.
    pub initial_result: Option<DataMap>,
    pub task_id: Uuid,
    pub tasks: TaskTable,
}

impl ExecutionDriver {
    pub(crate) async fn run(mut self, start: NodeId) {
        self.drive(start).await;
        self.release().await;
    }

    async fn drive(&mut self, start: NodeId) {
        let mut current = start;
        let mut last_result = self.initial_result.take();

        loop {
            if self.cancellation.is_cancelled() {
                self.finish(ExecutionStatus::Cancelled, None).await;
                return;
            }

            let Some(node) = self.definition.find_node(current) else {
                self.finish(
                    ExecutionStatus::Failed,
                    Some(format!(
                        "node {} does not exist in workflow version {}",
                        current, self.definition.version
                    )),
                )
                .await;
                return;
            };

            self.events.emit(ExecutionEvent::NodeStarted {
                execution_id: self.execution_id,
                node_id: current,
                node_type: node.node_type().to_string(),
                timestamp: Utc::now(),
            });

            let Some(context) = self.context_snapshot().await else {
                return;
            };

            match self.step(node, &context, last_result.as_ref()).await {
                Err((ProcessorError::Cancelled, _)) => {
                    self.finish(ExecutionStatus::Cancelled, None).await;
                    return;
                }
                Err((err, attempts)) => {
                    let mut record = DataMap::new();
                    record.insert("error".to_string(), Value::String(err.to_string()));
                    self.record(current, NodeRun::failed(record, attempts)).await;
                    self.events.emit(ExecutionEvent::NodeFailed {
                        execution_id: self.execution_id,
                        node_id: current,
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    });
                    self.finish(
                        ExecutionStatus::Failed,
                        Some(format!("node '{}' failed: {}", node.name, err)),
                    )
                    .await;
                    return;
                }
                Ok((NodeOutcome::Advance(result), attempts)) => {
                    let output = result.output.clone();
                    let Some((record, context)) = self.apply(current, result, attempts).await
                    else {
                        return;
                    };
                    self.emit_node_completed(current, &output, attempts);
                    match next_node(&self.definition, current, &record, &context) {
                        Some(next) => {
                            last_result = Some(record);
                            current = next;
                        }
                        None => {
                            self.finish(ExecutionStatus::Completed, None).await;
                            return;
                        }
                    }
                }
                Ok((NodeOutcome::Complete(result), attempts)) => {
                    let output = result.output.clone();
                    if self.apply(current, result, attempts).await.is_none() {
                        return;
                    }
                    self.emit_node_completed(current, &output, attempts);
                    self.finish(ExecutionStatus::Completed, None).await;
                    return;
                }
                Ok((
                    NodeOutcome::Suspend(SuspendReason::Approval {
                        approvers,
                        message,
                        data,
                    }),
                    _,
                )) => {
                    // Resumption recomputes the next node from this stored
                    // result, not by re-invoking the processor, so the
                    // record must land before the task ends.
                    let mut record = data.clone();
                    record.insert("output".to_string(), Value::String("output".to_string()));
                    record.insert("message".to_string(), Value::String(message.clone()));
                    record.insert("approvers".to_string(), json!(approvers));
                    {
                        let mut executions = self.executions.write().await;
                        let Some(exec) = executions.get_mut(&self.execution_id) else {
                            return;
                        };
                        exec.record_node(current, NodeRun::waiting(record));
                        exec.status = ExecutionStatus::WaitingApproval;
                    }
                    let request = self
                        .approvals
                        .create(ApprovalRequest::new(
                            self.execution_id,
                            current,
                            approvers.clone(),
                            message,
                            data,
                        ))
                        .await;
                    self.events.emit(ExecutionEvent::ApprovalRequested {
                        execution_id: self.execution_id,
                        approval_id: request.id,
                        node_id: current,
                        approvers,
                        timestamp: Utc::now(),
                    });
                    tracing::info!(
                        "execution {} suspended at approval node '{}'",
                        self.execution_id,
                        node.name
                    );
                    return;
                }
                Ok((NodeOutcome::Suspend(SuspendReason::DelayUntil { wake_at }), attempts)) => {
                    let mut record = DataMap::new();
                    record.insert("output".to_string(), Value::String("output".to_string()));
                    record.insert("wake_at".to_string(), Value::String(wake_at.to_rfc3339()));
                    {
                        let mut executions = self.executions.write().await;
                        let Some(exec) = executions.get_mut(&self.execution_id) else {
                            return;
                        };
                        exec.record_node(current, NodeRun::waiting(record.clone()));
                    }
                    self.events.emit(ExecutionEvent::DelayScheduled {
                        execution_id: self.execution_id,
                        node_id: current,
                        wake_at,
                        timestamp: Utc::now(),
                    });

                    let wait = (wake_at - Utc::now()).to_std().unwrap_or_default();
                    tokio::select! {
                        _ = self.cancellation.cancelled() => {
                            self.finish(ExecutionStatus::Cancelled, None).await;
                            return;
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }

                    let context = {
                        let mut executions = self.executions.write().await;
                        let Some(exec) = executions.get_mut(&self.execution_id) else {
                            return;
                        };
                        if let Some(run) = exec.node_executions.get_mut(&current) {
                            run.status = NodeRunStatus::Completed;
                        }
                        exec.context.clone()
                    };
                    self.emit_node_completed(current, "output", attempts);
                    match next_node(&self.definition, current, &record, &context) {
                        Some(next) => {
                            last_result = Some(record);
                            current = next;
                        }
                        None => {
                            self.finish(ExecutionStatus::Completed, None).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Process one node, honoring its retry policy. The attempt count is
    /// reported back for the node run record.
    async fn step(
        &self,
        node: &WorkflowNode,
        context: &DataMap,
        last_result: Option<&DataMap>,
    ) -> Result<(NodeOutcome, u32), (ProcessorError, u32)> {
        let processor = match self.registry.processor(node.node_type()) {
            Ok(p) => p,
            Err(e) => return Err((ProcessorError::Configuration(e.to_string()), 0)),
        };
        let max_attempts = node
            .retry_policy
            .as_ref()
            .map(|p| p.max_attempts.max(1))
            .unwrap_or(1);
        let mut delay_ms = node.retry_policy.as_ref().map(|p| p.delay_ms).unwrap_or(0);
        let backoff = node
            .retry_policy
            .as_ref()
            .map(|p| p.backoff_multiplier)
            .unwrap_or(1.0);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let ctx = ProcessorContext {
                node,
                context,
                last_result,
                cancellation: &self.cancellation,
            };
            match processor.process(ctx).await {
                Ok(outcome) => return Ok((outcome, attempt)),
                Err(ProcessorError::Cancelled) => return Err((ProcessorError::Cancelled, attempt)),
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        "node '{}' attempt {}/{} failed: {}",
                        node.name,
                        attempt,
                        max_attempts,
                        err
                    );
                    if delay_ms > 0 {
                        tokio::select! {
                            _ = self.cancellation.cancelled() => {
                                return Err((ProcessorError::Cancelled, attempt));
                            }
                            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        }
                        delay_ms = (delay_ms as f64 * backoff) as u64;
                    }
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }

    /// Apply a completed step: context updates first, then the run record,
    /// in one lock scope, so a cancellation never observes a half-written
    /// step.
    async fn apply(
        &self,
        node_id: NodeId,
        result: NodeResult,
        attempts: u32,
    ) -> Option<(DataMap, DataMap)> {
        let NodeResult {
            output,
            data,
            context_updates,
        } = result;
        let mut executions = self.executions.write().await;
        let exec = executions.get_mut(&self.execution_id)?;
        for (key, value) in context_updates {
            exec.context.insert(key, value);
        }
        let mut record = data;
        record.insert("output".to_string(), Value::String(output));
        exec.record_node(node_id, NodeRun::completed(record.clone(), attempts));
        Some((record, exec.context.clone()))
    }

    async fn record(&self, node_id: NodeId, run: NodeRun) {
        let mut executions = self.executions.write().await;
        if let Some(exec) = executions.get_mut(&self.execution_id) {
            exec.record_node(node_id, run);
        }
    }

    /// Current context, or None once the execution is gone or terminal (a
    /// cancel may land while this task is between steps).
    async fn context_snapshot(&self) -> Option<DataMap> {
        let executions = self.executions.read().await;
        executions
            .get(&self.execution_id)
            .filter(|e| !e.is_terminal())
            .map(|e| e.context.clone())
    }

    /// Drop this task's entry from the task table. A resume may already
    /// have installed a fresh handle for the same execution; that one stays.
    async fn release(&self) {
        let mut tasks = self.tasks.write().await;
        if tasks
            .get(&self.execution_id)
            .map_or(false, |h| h.id == self.task_id)
        {
            tasks.remove(&self.execution_id);
        }
    }

    fn emit_node_completed(&self, node_id: NodeId, output: &str, attempts: u32) {
        self.events.emit(ExecutionEvent::NodeCompleted {
            execution_id: self.execution_id,
            node_id,
            output: output.to_string(),
            attempts,
            timestamp: Utc::now(),
        });
    }

    /// Move the execution to a terminal state, once. Cancelling an already
    /// terminal execution is a no-op.
    async fn finish(&self, status: ExecutionStatus, error: Option<String>) {
        let duration_ms = {
            let mut executions = self.executions.write().await;
            let Some(exec) = executions.get_mut(&self.execution_id) else {
                return;
            };
            if exec.is_terminal() {
                return;
            }
            if let Some(err) = error {
                exec.errors.push(err);
            }
            exec.status = status;
            exec.completed_at = Some(Utc::now());
            exec.duration_ms()
        };
        match status {
            ExecutionStatus::Failed => {
                tracing::error!("execution {} failed", self.execution_id)
            }
            _ => tracing::info!("execution {} finished: {:?}", self.execution_id, status),
        }
        self.events.emit(ExecutionEvent::ExecutionFinished {
            execution_id: self.execution_id,
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}
