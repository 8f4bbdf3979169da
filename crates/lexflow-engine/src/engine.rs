use crate::approvals::ApprovalCoordinator;
use crate::executor::{next_node, ExecutionDriver, SharedExecutions, TaskHandle, TaskTable};
use crate::registry::ProcessorRegistry;
use crate::validator::{validate, ValidationReport};
use crate::analytics::{aggregate, WorkflowAnalytics};
use chrono::Utc;
use lexflow_core::{
    ApprovalRequest, DataMap, EngineError, EventBus, ExecutionEvent, ExecutionId, ExecutionStatus,
    NodeRunStatus, WorkflowDefinition, WorkflowExecution, WorkflowId, WorkflowStatus,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Configuration for an engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1024,
        }
    }
}

/// The workflow engine: owns the definition, execution, and approval tables,
/// the processor registry, and one asynchronous task per in-flight
/// execution.
///
/// An explicit instance rather than module-level globals, so tenants and
/// tests can run isolated engines side by side. The in-memory tables are the
/// working set; durable storage sits behind the engine boundary.
pub struct WorkflowEngine {
    registry: Arc<ProcessorRegistry>,
    events: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowDefinition>>>,
    /// Definition snapshots pinned per (workflow, version) so in-flight
    /// executions never observe a live edit.
    snapshots: Arc<RwLock<HashMap<(WorkflowId, u32), Arc<WorkflowDefinition>>>>,
    executions: SharedExecutions,
    approvals: ApprovalCoordinator,
    /// One entry per live driver task; the driver removes its own entry
    /// when its run loop ends.
    tasks: TaskTable,
}

impl WorkflowEngine {
    pub fn new(registry: ProcessorRegistry) -> Self {
        Self::with_registry(Arc::new(registry), EngineConfig::default())
    }

    pub fn with_registry(registry: Arc<ProcessorRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            events: Arc::new(EventBus::new(config.event_buffer_size)),
            workflows: Arc::new(RwLock::new(HashMap::new())),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            executions: Arc::new(RwLock::new(HashMap::new())),
            approvals: ApprovalCoordinator::new(),
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub async fn register_workflow(&self, definition: WorkflowDefinition) -> WorkflowId {
        let id = definition.id;
        self.workflows.write().await.insert(id, definition);
        id
    }

    pub async fn workflow(&self, id: WorkflowId) -> Option<WorkflowDefinition> {
        self.workflows.read().await.get(&id).cloned()
    }

    pub async fn validate_workflow(&self, id: WorkflowId) -> Result<ValidationReport, EngineError> {
        let workflows = self.workflows.read().await;
        let definition = workflows.get(&id).ok_or(EngineError::WorkflowNotFound(id))?;
        Ok(validate(definition))
    }

    /// Transition Draft/Paused -> Active. Requires a passing validation; the
    /// report (with warnings) is returned to the caller.
    pub async fn activate(&self, id: WorkflowId) -> Result<ValidationReport, EngineError> {
        let mut workflows = self.workflows.write().await;
        let definition = workflows
            .get_mut(&id)
            .ok_or(EngineError::WorkflowNotFound(id))?;
        let report = validate(definition);
        if !report.valid {
            return Err(EngineError::ValidationFailed {
                errors: report.errors,
            });
        }
        definition.status = WorkflowStatus::Active;
        definition.updated_at = Utc::now();
        self.snapshots
            .write()
            .await
            .insert((id, definition.version), Arc::new(definition.clone()));
        tracing::info!("workflow '{}' activated (v{})", definition.name, definition.version);
        Ok(report)
    }

    pub async fn pause(&self, id: WorkflowId) -> Result<(), EngineError> {
        self.set_status(id, WorkflowStatus::Paused).await
    }

    pub async fn archive(&self, id: WorkflowId) -> Result<(), EngineError> {
        self.set_status(id, WorkflowStatus::Archived).await
    }

    async fn set_status(&self, id: WorkflowId, status: WorkflowStatus) -> Result<(), EngineError> {
        let mut workflows = self.workflows.write().await;
        let definition = workflows
            .get_mut(&id)
            .ok_or(EngineError::WorkflowNotFound(id))?;
        definition.status = status;
        definition.updated_at = Utc::now();
        Ok(())
    }

    /// Start a new execution of an active workflow.
    ///
    /// The Pending -> InProgress transition happens synchronously; node
    /// traversal runs on a dedicated task. The returned record reflects the
    /// state at spawn time.
    pub async fn execute(
        &self,
        workflow_id: WorkflowId,
        trigger_data: DataMap,
        triggered_by: &str,
    ) -> Result<WorkflowExecution, EngineError> {
        let (definition, start_id) = {
            let mut workflows = self.workflows.write().await;
            let definition = workflows
                .get_mut(&workflow_id)
                .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
            if definition.status != WorkflowStatus::Active {
                return Err(EngineError::WorkflowNotActive {
                    workflow_id,
                    status: definition.status,
                });
            }
            // Defensive re-validation: structural edits since activation
            // must not reach a running execution.
            let report = validate(definition);
            if !report.valid {
                return Err(EngineError::ValidationFailed {
                    errors: report.errors,
                });
            }
            let start_id = definition
                .start_node()
                .map(|n| n.id)
                .ok_or_else(|| EngineError::ValidationFailed {
                    errors: vec!["workflow has no start node".to_string()],
                })?;
            definition.execution_count += 1;
            definition.last_executed_at = Some(Utc::now());
            (definition.clone(), start_id)
        };

        let pinned = {
            let mut snapshots = self.snapshots.write().await;
            snapshots
                .entry((workflow_id, definition.version))
                .or_insert_with(|| Arc::new(definition.clone()))
                .clone()
        };

        let mut execution = WorkflowExecution::new(
            workflow_id,
            definition.version,
            &definition.variables,
            trigger_data,
            triggered_by,
        );
        execution.status = ExecutionStatus::InProgress;
        let execution_id = execution.id;
        self.executions
            .write()
            .await
            .insert(execution_id, execution.clone());

        self.events.emit(ExecutionEvent::ExecutionStarted {
            execution_id,
            workflow_id,
            workflow_version: definition.version,
            timestamp: Utc::now(),
        });
        tracing::info!(
            "executing workflow '{}' v{} as {}",
            definition.name,
            definition.version,
            execution_id
        );

        self.spawn_driver(execution_id, pinned, start_id, None).await;
        Ok(execution)
    }

    pub async fn execution(&self, id: ExecutionId) -> Option<WorkflowExecution> {
        self.executions.read().await.get(&id).cloned()
    }

    /// Number of executions with a live driver task. Terminal executions and
    /// executions waiting on an approval hold none; a delayed execution
    /// keeps its task until the wake time.
    pub async fn active_executions(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Cancel an in-flight execution. Idempotent: cancelling a terminal
    /// execution is a no-op, not an error.
    pub async fn cancel(&self, id: ExecutionId) -> Result<(), EngineError> {
        let already_terminal = {
            let mut executions = self.executions.write().await;
            let execution = executions
                .get_mut(&id)
                .ok_or(EngineError::ExecutionNotFound(id))?;
            if execution.is_terminal() {
                true
            } else {
                execution.status = ExecutionStatus::Cancelled;
                execution.completed_at = Some(Utc::now());
                false
            }
        };
        if let Some(handle) = self.tasks.write().await.remove(&id) {
            handle.cancellation.cancel();
        }
        if !already_terminal {
            let duration_ms = self
                .executions
                .read()
                .await
                .get(&id)
                .and_then(|e| e.duration_ms());
            self.events.emit(ExecutionEvent::ExecutionFinished {
                execution_id: id,
                status: ExecutionStatus::Cancelled,
                duration_ms,
                timestamp: Utc::now(),
            });
            tracing::info!("execution {} cancelled", id);
        }
        Ok(())
    }

    pub async fn approval(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.approvals.get(id).await
    }

    pub async fn pending_approvals(&self, execution_id: ExecutionId) -> Vec<ApprovalRequest> {
        self.approvals.pending_for_execution(execution_id).await
    }

    /// Record an approval decision and resume the suspended execution.
    ///
    /// The decision is merged into the stored approval node run, and the run
    /// loop restarts on a fresh task from the connection matching that
    /// stored result. A second decision for the same request, or a decision
    /// for an execution no longer waiting, fails with a conflict error.
    pub async fn approve(
        &self,
        approval_id: Uuid,
        approver: &str,
        approved: bool,
        message: Option<String>,
    ) -> Result<WorkflowExecution, EngineError> {
        let request = self
            .approvals
            .get(approval_id)
            .await
            .ok_or(EngineError::ApprovalNotFound(approval_id))?;

        let (record, context, workflow_id, version) = {
            let mut executions = self.executions.write().await;
            let execution = executions
                .get_mut(&request.execution_id)
                .ok_or(EngineError::ExecutionNotFound(request.execution_id))?;
            if execution.status != ExecutionStatus::WaitingApproval {
                return Err(EngineError::ExecutionNotWaiting {
                    execution_id: execution.id,
                    status: execution.status,
                });
            }
            // Resolved under the execution lock: a concurrent cancel cannot
            // land between the status check and the resume.
            self.approvals
                .resolve(approval_id, approver, approved, message.clone())
                .await?;
            if let Some(run) = execution.node_executions.get_mut(&request.node_id) {
                run.status = NodeRunStatus::Completed;
                run.result
                    .insert("approved".to_string(), Value::Bool(approved));
                run.result
                    .insert("approved_by".to_string(), Value::String(approver.to_string()));
                if let Some(msg) = &message {
                    run.result
                        .insert("response_message".to_string(), Value::String(msg.clone()));
                }
            }
            execution.status = ExecutionStatus::InProgress;
            let record = execution
                .node_executions
                .get(&request.node_id)
                .map(|run| run.result.clone())
                .unwrap_or_default();
            (
                record,
                execution.context.clone(),
                execution.workflow_id,
                execution.workflow_version,
            )
        };

        self.events.emit(ExecutionEvent::ExecutionResumed {
            execution_id: request.execution_id,
            node_id: request.node_id,
            approved,
            timestamp: Utc::now(),
        });
        tracing::info!(
            "execution {} resumed after approval decision ({})",
            request.execution_id,
            if approved { "approved" } else { "rejected" }
        );

        let pinned = self.pinned_definition(workflow_id, version).await?;
        match next_node(&pinned, request.node_id, &record, &context) {
            Some(next) => {
                self.spawn_driver(request.execution_id, pinned, next, Some(record))
                    .await;
            }
            None => {
                let duration_ms = {
                    let mut executions = self.executions.write().await;
                    if let Some(execution) = executions.get_mut(&request.execution_id) {
                        execution.status = ExecutionStatus::Completed;
                        execution.completed_at = Some(Utc::now());
                        execution.duration_ms()
                    } else {
                        None
                    }
                };
                self.events.emit(ExecutionEvent::ExecutionFinished {
                    execution_id: request.execution_id,
                    status: ExecutionStatus::Completed,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
        }

        self.execution(request.execution_id)
            .await
            .ok_or(EngineError::ExecutionNotFound(request.execution_id))
    }

    /// Success-rate, duration, and per-node failure statistics across all
    /// executions of a workflow.
    pub async fn analytics(&self, workflow_id: WorkflowId) -> Result<WorkflowAnalytics, EngineError> {
        let workflows = self.workflows.read().await;
        let definition = workflows
            .get(&workflow_id)
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        let executions = self.executions.read().await;
        Ok(aggregate(
            definition,
            executions.values().filter(|e| e.workflow_id == workflow_id),
        ))
    }

    async fn pinned_definition(
        &self,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Result<Arc<WorkflowDefinition>, EngineError> {
        if let Some(snapshot) = self.snapshots.read().await.get(&(workflow_id, version)) {
            return Ok(snapshot.clone());
        }
        // Snapshot missing only when the table was rebuilt; fall back to the
        // live definition if the version still matches.
        let workflows = self.workflows.read().await;
        match workflows.get(&workflow_id) {
            Some(def) if def.version == version => Ok(Arc::new(def.clone())),
            _ => Err(EngineError::WorkflowNotFound(workflow_id)),
        }
    }

    async fn spawn_driver(
        &self,
        execution_id: ExecutionId,
        definition: Arc<WorkflowDefinition>,
        start: lexflow_core::NodeId,
        initial_result: Option<DataMap>,
    ) {
        let cancellation = CancellationToken::new();
        let task_id = Uuid::new_v4();
        // Registered before the spawn; the driver unregisters itself when
        // its run loop ends.
        self.tasks.write().await.insert(
            execution_id,
            TaskHandle {
                id: task_id,
                cancellation: cancellation.clone(),
            },
        );
        let driver = ExecutionDriver {
            definition,
            execution_id,
            executions: self.executions.clone(),
            approvals: self.approvals.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            cancellation,
            initial_result,
            task_id,
            tasks: self.tasks.clone(),
        };
        tokio::spawn(driver.run(start));
    }
}
