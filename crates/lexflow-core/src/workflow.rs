use crate::condition::Condition;
use crate::DataMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = Uuid;

/// Complete workflow definition: the authored directed graph of typed steps.
///
/// Mutated only through the builder methods below. Structural edits after
/// activation bump `version`; executions pin the version current at start
/// time and never follow a live edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub tenant_id: Uuid,
    pub created_by: String,
    pub status: WorkflowStatus,
    pub version: u32,
    pub nodes: HashMap<NodeId, WorkflowNode>,
    /// Authoring order is significant: connection matching is first-match.
    pub connections: Vec<WorkflowConnection>,
    pub triggers: Vec<WorkflowTrigger>,
    /// Seed values copied into every execution's context.
    pub variables: DataMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, tenant_id: Uuid, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tenant_id,
            created_by: created_by.into(),
            status: WorkflowStatus::Draft,
            version: 1,
            nodes: HashMap::new(),
            connections: Vec::new(),
            triggers: Vec::new(),
            variables: DataMap::new(),
            created_at: now,
            updated_at: now,
            execution_count: 0,
            last_executed_at: None,
        }
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        self.structural_edit();
        id
    }

    pub fn connect(
        &mut self,
        source_node_id: NodeId,
        source_output: impl Into<String>,
        target_node_id: NodeId,
        target_input: impl Into<String>,
    ) -> Uuid {
        self.connect_with(source_node_id, source_output, target_node_id, target_input, None, None)
    }

    /// Add a guarded connection: only traversable when `condition` holds.
    pub fn connect_if(
        &mut self,
        source_node_id: NodeId,
        source_output: impl Into<String>,
        target_node_id: NodeId,
        target_input: impl Into<String>,
        condition: Condition,
    ) -> Uuid {
        self.connect_with(
            source_node_id,
            source_output,
            target_node_id,
            target_input,
            Some(condition),
            None,
        )
    }

    pub fn connect_with(
        &mut self,
        source_node_id: NodeId,
        source_output: impl Into<String>,
        target_node_id: NodeId,
        target_input: impl Into<String>,
        condition: Option<Condition>,
        label: Option<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.push(WorkflowConnection {
            id,
            source_node_id,
            source_output: source_output.into(),
            target_node_id,
            target_input: target_input.into(),
            condition,
            label,
        });
        self.structural_edit();
        id
    }

    pub fn add_trigger(&mut self, trigger: WorkflowTrigger) -> Uuid {
        let id = trigger.id;
        self.triggers.push(trigger);
        self.structural_edit();
        id
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn find_node(&self, id: NodeId) -> Option<&WorkflowNode> {
        self.nodes.get(&id)
    }

    /// Entry point of the graph. With multiple Start nodes (a validation
    /// warning) the engine takes whichever comes first.
    pub fn start_node(&self) -> Option<&WorkflowNode> {
        self.nodes
            .values()
            .find(|n| n.node_type() == NodeType::Start)
    }

    pub fn connections_from(&self, node_id: NodeId) -> impl Iterator<Item = &WorkflowConnection> {
        self.connections
            .iter()
            .filter(move |c| c.source_node_id == node_id)
    }

    /// Structural change to nodes/connections/triggers. Once the definition
    /// has left Draft, every such edit warrants a new version.
    fn structural_edit(&mut self) {
        if self.status != WorkflowStatus::Draft {
            self.version += 1;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

/// A typed step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    pub name: String,
    pub config: NodeConfig,
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowNode {
    pub fn new(name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config,
            retry_policy: None,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.retry_policy = Some(RetryPolicy {
            max_attempts,
            delay_ms,
            backoff_multiplier: 1.0,
        });
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }

    pub fn input_ports(&self) -> &'static [&'static str] {
        self.node_type().input_ports()
    }

    pub fn output_ports(&self) -> &'static [&'static str] {
        self.node_type().output_ports()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Task,
    Decision,
    Approval,
    Email,
    Delay,
    Condition,
    Webhook,
    DocumentGeneration,
    Notification,
    DataTransformation,
    Integration,
}

impl NodeType {
    pub fn input_ports(&self) -> &'static [&'static str] {
        match self {
            NodeType::Start => &[],
            _ => &["input"],
        }
    }

    pub fn output_ports(&self) -> &'static [&'static str] {
        match self {
            NodeType::End => &[],
            NodeType::Decision => &["yes", "no"],
            NodeType::Condition => &["true", "false"],
            _ => &["output"],
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Task => "task",
            NodeType::Decision => "decision",
            NodeType::Approval => "approval",
            NodeType::Email => "email",
            NodeType::Delay => "delay",
            NodeType::Condition => "condition",
            NodeType::Webhook => "webhook",
            NodeType::DocumentGeneration => "document_generation",
            NodeType::Notification => "notification",
            NodeType::DataTransformation => "data_transformation",
            NodeType::Integration => "integration",
        };
        f.write_str(s)
    }
}

/// Per-type node configuration, validated at construction rather than by
/// ad hoc field-presence checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Start,
    End,
    Task(TaskConfig),
    Decision(DecisionConfig),
    Approval(ApprovalConfig),
    Email(EmailConfig),
    Delay(DelayConfig),
    Condition(ConditionConfig),
    Webhook(WebhookConfig),
    DocumentGeneration(DocumentGenerationConfig),
    Notification(NotificationConfig),
    DataTransformation(DataTransformationConfig),
    Integration(IntegrationConfig),
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::Start => NodeType::Start,
            NodeConfig::End => NodeType::End,
            NodeConfig::Task(_) => NodeType::Task,
            NodeConfig::Decision(_) => NodeType::Decision,
            NodeConfig::Approval(_) => NodeType::Approval,
            NodeConfig::Email(_) => NodeType::Email,
            NodeConfig::Delay(_) => NodeType::Delay,
            NodeConfig::Condition(_) => NodeType::Condition,
            NodeConfig::Webhook(_) => NodeType::Webhook,
            NodeConfig::DocumentGeneration(_) => NodeType::DocumentGeneration,
            NodeConfig::Notification(_) => NodeType::Notification,
            NodeConfig::DataTransformation(_) => NodeType::DataTransformation,
            NodeConfig::Integration(_) => NodeType::Integration,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Evaluated in order; the first true condition routes to `yes`.
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub approvers: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default)]
    pub payload: DataMap,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentGenerationConfig {
    pub template: String,
    #[serde(default = "default_document_key")]
    pub output_key: String,
}

fn default_document_key() -> String {
    "document_id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub channel: String,
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformationConfig {
    /// Applied in order against the execution context.
    pub transformations: Vec<FieldTransform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub provider: String,
    pub action: String,
    #[serde(default)]
    pub params: DataMap,
}

/// Field-level context transform applied by DataTransformation nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldTransform {
    Copy { source: String, target: String },
    Set { target: String, value: serde_json::Value },
    Uppercase { field: String },
    Lowercase { field: String },
    Calculate {
        target: String,
        left: Operand,
        operator: ArithmeticOp,
        right: Operand,
    },
}

/// A calculate operand: a literal number or the name of a context field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Field(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Retry policy for node processing failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Directed, optionally conditional link between two node ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConnection {
    pub id: Uuid,
    pub source_node_id: NodeId,
    pub source_output: String,
    pub target_node_id: NodeId,
    pub target_input: String,
    pub condition: Option<Condition>,
    pub label: Option<String>,
}

/// Trigger owned by the definition; the event-specific polling/subscription
/// lives in an external dispatcher, the engine only executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: Uuid,
    pub trigger_type: TriggerType,
    pub enabled: bool,
    #[serde(default)]
    pub config: DataMap,
    /// Gating conditions evaluated against the inbound payload.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl WorkflowTrigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_type,
            enabled: true,
            config: DataMap::new(),
            conditions: Vec::new(),
        }
    }

    /// True when the trigger is enabled and every gating condition holds
    /// against the inbound payload.
    pub fn matches_payload(&self, payload: &DataMap) -> bool {
        self.enabled
            && self
                .conditions
                .iter()
                .all(|c| crate::condition::evaluate(c, payload, None))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    DocumentUpload,
    CaseStatusChange,
    DeadlineApproaching,
    FormSubmission,
    EmailReceived,
    Schedule { expression: String },
    Webhook { path: String },
}
