//! End-to-end engine behavior: suspend/resume at approval gates, branch
//! routing, cancellation, retries, and version pinning.

use lexflow_core::{
    ApprovalConfig, Condition, ConditionOperator, DataMap, DecisionConfig, DelayConfig,
    EngineError, ExecutionId, ExecutionStatus, NodeConfig, NodeId, TaskConfig, WebhookConfig,
    WorkflowDefinition, WorkflowNode,
};
use lexflow_engine::{ProcessorRegistry, WorkflowEngine};
use lexflow_nodes::collaborators::{CollaboratorError, WebhookClient};
use lexflow_nodes::{register_builtin, RecordingCollaborators};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn engine_with_recording() -> (WorkflowEngine, RecordingCollaborators) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let recording = RecordingCollaborators::new();
    let mut registry = ProcessorRegistry::new();
    register_builtin(&mut registry, &recording.bundle());
    (WorkflowEngine::new(registry), recording)
}

fn trigger_data(entries: &[(&str, serde_json::Value)]) -> DataMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn wait_for_status(
    engine: &WorkflowEngine,
    id: ExecutionId,
    status: ExecutionStatus,
) -> lexflow_core::WorkflowExecution {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(exec) = engine.execution(id).await {
            if exec.status == status {
                return exec;
            }
            assert!(
                !exec.is_terminal(),
                "execution settled at {:?} while waiting for {:?} (errors: {:?})",
                exec.status,
                status,
                exec.errors
            );
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {:?}",
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_idle(engine: &WorkflowEngine) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while engine.active_executions().await != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "driver tasks were not released"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Start -> Task -> Decision(amount > 1000) -> {yes: Approval -> End, no: End}
struct ApprovalWorkflow {
    definition: WorkflowDefinition,
    approval: NodeId,
}

fn approval_workflow() -> ApprovalWorkflow {
    let mut def = WorkflowDefinition::new("Settlement review", Uuid::new_v4(), "author@firm.test");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let task = def.add_node(WorkflowNode::new(
        "Open review task",
        NodeConfig::Task(TaskConfig {
            title: "Review settlement".to_string(),
            description: String::new(),
            assignee: None,
        }),
    ));
    let decision = def.add_node(WorkflowNode::new(
        "Needs partner approval?",
        NodeConfig::Decision(DecisionConfig {
            conditions: vec![Condition::new(
                "context.amount",
                ConditionOperator::GreaterThan,
                json!(1000),
            )],
        }),
    ));
    let approval = def.add_node(WorkflowNode::new(
        "Partner approval",
        NodeConfig::Approval(ApprovalConfig {
            approvers: vec!["partner@firm.test".to_string()],
            message: "Approve settlement of ${{amount}}".to_string(),
            data: DataMap::new(),
        }),
    ));
    let end_approved = def.add_node(WorkflowNode::new("End (reviewed)", NodeConfig::End));
    let end_small = def.add_node(WorkflowNode::new("End (auto)", NodeConfig::End));

    def.connect(start, "output", task, "input");
    def.connect(task, "output", decision, "input");
    def.connect(decision, "yes", approval, "input");
    def.connect(decision, "no", end_small, "input");
    def.connect(approval, "output", end_approved, "input");

    ApprovalWorkflow {
        definition: def,
        approval,
    }
}

#[tokio::test]
async fn small_amount_completes_without_approval() {
    let (engine, recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;
    engine.activate(id).await.unwrap();

    let exec = engine
        .execute(id, trigger_data(&[("amount", json!(500))]), "dispatcher")
        .await
        .unwrap();
    assert_eq!(exec.status, ExecutionStatus::InProgress);

    let done = wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    assert!(done.completed_at.is_some());
    assert!(engine.pending_approvals(exec.id).await.is_empty());
    // The approval node was never visited.
    assert!(!done.node_executions.contains_key(&wf.approval));
    // The task collaborator fired exactly once.
    assert_eq!(recording.tasks.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn large_amount_suspends_then_resumes_on_approval() {
    let (engine, _recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;
    engine.activate(id).await.unwrap();

    let exec = engine
        .execute(id, trigger_data(&[("amount", json!(5000))]), "dispatcher")
        .await
        .unwrap();

    let waiting = wait_for_status(&engine, exec.id, ExecutionStatus::WaitingApproval).await;
    assert_eq!(waiting.current_node_id, Some(wf.approval));

    let pending = engine.pending_approvals(exec.id).await;
    assert_eq!(pending.len(), 1);
    let request = &pending[0];
    assert_eq!(request.node_id, wf.approval);
    assert_eq!(request.message, "Approve settlement of $5000");

    engine
        .approve(request.id, "partner@firm.test", true, None)
        .await
        .unwrap();

    let done = wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    let approval_run = &done.node_executions[&wf.approval];
    assert_eq!(approval_run.result.get("approved"), Some(&json!(true)));
    assert_eq!(
        approval_run.result.get("approved_by"),
        Some(&json!("partner@firm.test"))
    );
}

#[tokio::test]
async fn second_approval_decision_is_a_conflict() {
    let (engine, _recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;
    engine.activate(id).await.unwrap();

    let exec = engine
        .execute(id, trigger_data(&[("amount", json!(2000))]), "dispatcher")
        .await
        .unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::WaitingApproval).await;
    let request = engine.pending_approvals(exec.id).await.remove(0);

    engine
        .approve(request.id, "partner@firm.test", true, None)
        .await
        .unwrap();
    let err = engine
        .approve(request.id, "partner@firm.test", false, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::ApprovalAlreadyResolved { .. } | EngineError::ExecutionNotWaiting { .. }
    ));

    // The first decision stands and the execution still completes.
    wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
}

#[tokio::test]
async fn rejection_routes_through_the_result_guard() {
    let (engine, _recording) = engine_with_recording();
    let mut def = WorkflowDefinition::new("Filing sign-off", Uuid::new_v4(), "author");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let approval = def.add_node(WorkflowNode::new(
        "Sign-off",
        NodeConfig::Approval(ApprovalConfig {
            approvers: vec!["partner@firm.test".to_string()],
            message: "File?".to_string(),
            data: DataMap::new(),
        }),
    ));
    let filed = def.add_node(WorkflowNode::new("End (filed)", NodeConfig::End));
    let shelved = def.add_node(WorkflowNode::new("End (shelved)", NodeConfig::End));
    def.connect(start, "output", approval, "input");
    def.connect_if(
        approval,
        "output",
        filed,
        "input",
        Condition::new("result.approved", ConditionOperator::Equals, json!(true)),
    );
    def.connect(approval, "output", shelved, "input");

    let id = engine.register_workflow(def).await;
    engine.activate(id).await.unwrap();
    let exec = engine.execute(id, DataMap::new(), "dispatcher").await.unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::WaitingApproval).await;

    let request = engine.pending_approvals(exec.id).await.remove(0);
    engine
        .approve(request.id, "partner@firm.test", false, Some("hold off".to_string()))
        .await
        .unwrap();

    let done = wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    assert!(done.node_executions.contains_key(&shelved));
    assert!(!done.node_executions.contains_key(&filed));
}

#[tokio::test]
async fn decision_after_approval_reads_the_approval_result() {
    let (engine, _recording) = engine_with_recording();
    let mut def = WorkflowDefinition::new("Engagement sign-off", Uuid::new_v4(), "author");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let approval = def.add_node(WorkflowNode::new(
        "Sign-off",
        NodeConfig::Approval(ApprovalConfig {
            approvers: vec!["partner@firm.test".to_string()],
            message: "Proceed?".to_string(),
            data: DataMap::new(),
        }),
    ));
    let gate = def.add_node(WorkflowNode::new(
        "Approved?",
        NodeConfig::Decision(DecisionConfig {
            conditions: vec![Condition::new(
                "result.approved",
                ConditionOperator::Equals,
                json!(true),
            )],
        }),
    ));
    let engaged = def.add_node(WorkflowNode::new("End (engaged)", NodeConfig::End));
    let declined = def.add_node(WorkflowNode::new("End (declined)", NodeConfig::End));
    def.connect(start, "output", approval, "input");
    def.connect(approval, "output", gate, "input");
    def.connect(gate, "yes", engaged, "input");
    def.connect(gate, "no", declined, "input");

    let id = engine.register_workflow(def).await;
    engine.activate(id).await.unwrap();
    let exec = engine.execute(id, DataMap::new(), "dispatcher").await.unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::WaitingApproval).await;

    let request = engine.pending_approvals(exec.id).await.remove(0);
    engine
        .approve(request.id, "partner@firm.test", true, None)
        .await
        .unwrap();

    // The decision node runs right after the resume; it must still see the
    // approval's result namespace.
    let done = wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    assert_eq!(
        done.node_executions[&gate].result.get("matched"),
        Some(&json!(true))
    );
    assert!(done.node_executions.contains_key(&engaged));
    assert!(!done.node_executions.contains_key(&declined));
}

#[tokio::test]
async fn approving_a_cancelled_execution_is_a_conflict() {
    let (engine, _recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;
    engine.activate(id).await.unwrap();
    let exec = engine
        .execute(id, trigger_data(&[("amount", json!(2000))]), "dispatcher")
        .await
        .unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::WaitingApproval).await;
    let request = engine.pending_approvals(exec.id).await.remove(0);

    engine.cancel(exec.id).await.unwrap();

    let err = engine
        .approve(request.id, "partner@firm.test", true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExecutionNotWaiting { .. }));
    assert_eq!(
        engine.execution(exec.id).await.unwrap().status,
        ExecutionStatus::Cancelled
    );
    // The rejected decision did not consume the request either.
    assert!(!engine.approval(request.id).await.unwrap().is_resolved());
}

#[tokio::test]
async fn driver_tasks_are_released_when_the_run_loop_ends() {
    let (engine, _recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;
    engine.activate(id).await.unwrap();

    let exec = engine
        .execute(id, trigger_data(&[("amount", json!(100))]), "dispatcher")
        .await
        .unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    wait_for_idle(&engine).await;

    let exec = engine
        .execute(id, trigger_data(&[("amount", json!(9000))]), "dispatcher")
        .await
        .unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::WaitingApproval).await;
    // An execution parked at an approval holds no task; resumption spawns a
    // fresh one.
    wait_for_idle(&engine).await;

    let request = engine.pending_approvals(exec.id).await.remove(0);
    engine
        .approve(request.id, "partner@firm.test", true, None)
        .await
        .unwrap();
    wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    wait_for_idle(&engine).await;
}

#[tokio::test]
async fn executing_a_draft_workflow_is_rejected() {
    let (engine, _recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;

    let err = engine
        .execute(id, DataMap::new(), "dispatcher")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotActive { .. }));
}

#[tokio::test]
async fn activation_of_an_invalid_workflow_fails() {
    let (engine, _recording) = engine_with_recording();
    let mut def = WorkflowDefinition::new("No exit", Uuid::new_v4(), "author");
    def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let id = engine.register_workflow(def).await;

    let err = engine.activate(id).await.unwrap_err();
    let EngineError::ValidationFailed { errors } = err else {
        panic!("expected validation failure");
    };
    assert!(errors.iter().any(|e| e.contains("no end node")));
}

#[tokio::test]
async fn cancelling_a_delayed_execution_is_idempotent() {
    let (engine, _recording) = engine_with_recording();
    let mut def = WorkflowDefinition::new("Cooling-off", Uuid::new_v4(), "author");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let delay = def.add_node(WorkflowNode::new(
        "Wait a day",
        NodeConfig::Delay(DelayConfig {
            duration_secs: 3600,
        }),
    ));
    let end = def.add_node(WorkflowNode::new("End", NodeConfig::End));
    def.connect(start, "output", delay, "input");
    def.connect(delay, "output", end, "input");

    let id = engine.register_workflow(def).await;
    engine.activate(id).await.unwrap();
    let exec = engine.execute(id, DataMap::new(), "dispatcher").await.unwrap();

    // Give the driver time to reach the delay suspension point.
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine.cancel(exec.id).await.unwrap();
    let cancelled = wait_for_status(&engine, exec.id, ExecutionStatus::Cancelled).await;
    assert!(cancelled.completed_at.is_some());

    // Second cancel is a no-op, not an error.
    engine.cancel(exec.id).await.unwrap();
    assert_eq!(
        engine.execution(exec.id).await.unwrap().status,
        ExecutionStatus::Cancelled
    );
}

/// Fails a fixed number of deliveries before succeeding.
struct FlakyWebhookClient {
    failures_left: AtomicU32,
}

#[async_trait::async_trait]
impl WebhookClient for FlakyWebhookClient {
    async fn deliver(
        &self,
        _url: &str,
        _method: &str,
        _payload: &serde_json::Value,
    ) -> Result<String, CollaboratorError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CollaboratorError::Unavailable("endpoint down".to_string()));
        }
        Ok("delivery-1".to_string())
    }
}

#[tokio::test]
async fn retry_policy_rides_out_transient_collaborator_failures() {
    let recording = RecordingCollaborators::new();
    let mut collaborators = recording.bundle();
    collaborators.webhooks = Arc::new(FlakyWebhookClient {
        failures_left: AtomicU32::new(2),
    });
    let mut registry = ProcessorRegistry::new();
    register_builtin(&mut registry, &collaborators);
    let engine = WorkflowEngine::new(registry);

    let mut def = WorkflowDefinition::new("Court e-filing", Uuid::new_v4(), "author");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let hook = def.add_node(
        WorkflowNode::new(
            "Submit filing",
            NodeConfig::Webhook(WebhookConfig {
                url: "https://efile.test/submit".to_string(),
                method: "POST".to_string(),
                payload: DataMap::new(),
            }),
        )
        .with_retry(3, 10),
    );
    let end = def.add_node(WorkflowNode::new("End", NodeConfig::End));
    def.connect(start, "output", hook, "input");
    def.connect(hook, "output", end, "input");

    let id = engine.register_workflow(def).await;
    engine.activate(id).await.unwrap();
    let exec = engine.execute(id, DataMap::new(), "dispatcher").await.unwrap();

    let done = wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    assert_eq!(done.node_executions[&hook].attempts, 3);
    assert_eq!(
        done.node_executions[&hook].result.get("correlation_id"),
        Some(&json!("delivery-1"))
    );
}

#[tokio::test]
async fn exhausted_retries_fail_the_execution_with_recorded_errors() {
    let recording = RecordingCollaborators::new();
    let mut collaborators = recording.bundle();
    collaborators.webhooks = Arc::new(FlakyWebhookClient {
        failures_left: AtomicU32::new(u32::MAX),
    });
    let mut registry = ProcessorRegistry::new();
    register_builtin(&mut registry, &collaborators);
    let engine = WorkflowEngine::new(registry);

    let mut def = WorkflowDefinition::new("Court e-filing", Uuid::new_v4(), "author");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let hook = def.add_node(
        WorkflowNode::new(
            "Submit filing",
            NodeConfig::Webhook(WebhookConfig {
                url: "https://efile.test/submit".to_string(),
                method: "POST".to_string(),
                payload: DataMap::new(),
            }),
        )
        .with_retry(2, 1),
    );
    let end = def.add_node(WorkflowNode::new("End", NodeConfig::End));
    def.connect(start, "output", hook, "input");
    def.connect(hook, "output", end, "input");

    let id = engine.register_workflow(def).await;
    engine.activate(id).await.unwrap();
    let exec = engine.execute(id, DataMap::new(), "dispatcher").await.unwrap();

    let failed = wait_for_status(&engine, exec.id, ExecutionStatus::Failed).await;
    assert_eq!(failed.errors.len(), 1);
    assert!(failed.errors[0].contains("Submit filing"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn in_flight_executions_pin_their_version() {
    let (engine, _recording) = engine_with_recording();
    let mut def = WorkflowDefinition::new("Cooling-off", Uuid::new_v4(), "author");
    let start = def.add_node(WorkflowNode::new("Start", NodeConfig::Start));
    let delay = def.add_node(WorkflowNode::new(
        "Brief wait",
        NodeConfig::Delay(DelayConfig { duration_secs: 1 }),
    ));
    let end = def.add_node(WorkflowNode::new("End", NodeConfig::End));
    def.connect(start, "output", delay, "input");
    def.connect(delay, "output", end, "input");

    let id = engine.register_workflow(def).await;
    engine.activate(id).await.unwrap();
    let exec = engine.execute(id, DataMap::new(), "dispatcher").await.unwrap();
    assert_eq!(exec.workflow_version, 1);

    // Structural edit while the execution sleeps: bumps the live version.
    let mut edited = engine.workflow(id).await.unwrap();
    edited.add_node(WorkflowNode::new("Orphan", NodeConfig::End));
    assert_eq!(edited.version, 2);
    engine.register_workflow(edited).await;

    // The pinned snapshot still drives the old graph to completion.
    let done = wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    assert_eq!(done.workflow_version, 1);
    assert!(done.node_executions.contains_key(&end));
}

#[tokio::test]
async fn analytics_reflect_completed_and_failed_runs() {
    let (engine, _recording) = engine_with_recording();
    let wf = approval_workflow();
    let id = engine.register_workflow(wf.definition).await;
    engine.activate(id).await.unwrap();

    for _ in 0..3 {
        let exec = engine
            .execute(id, trigger_data(&[("amount", json!(100))]), "dispatcher")
            .await
            .unwrap();
        wait_for_status(&engine, exec.id, ExecutionStatus::Completed).await;
    }

    let stats = engine.analytics(id).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.success_rate, 100.0);
    assert!(stats.avg_duration_ms.is_some());
    assert_eq!(stats.per_node["Open review task"].executions, 3);
    assert_eq!(stats.per_node["Open review task"].failures, 0);
}
