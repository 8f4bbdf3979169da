use crate::collaborators::TaskTracker;
use async_trait::async_trait;
use lexflow_core::{
    template, NodeConfig, NodeOutcome, NodeProcessor, NodeResult, NodeType, ProcessorContext,
    ProcessorError,
};
use std::sync::Arc;

/// Creates a record in the external task tracker and continues immediately
/// (fire-and-continue): the workflow does not wait for the task to be
/// worked.
pub struct TaskProcessor {
    tracker: Arc<dyn TaskTracker>,
}

impl TaskProcessor {
    pub fn new(tracker: Arc<dyn TaskTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl NodeProcessor for TaskProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Task
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Task(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "task node carries a non-task config".to_string(),
            ));
        };
        if ctx.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        let title = template::render(&cfg.title, ctx.context);
        let description = template::render(&cfg.description, ctx.context);
        let task_id = self
            .tracker
            .create_task(&title, &description, cfg.assignee.as_deref())
            .await
            .map_err(|e| ProcessorError::Collaborator(e.to_string()))?;
        Ok(NodeOutcome::Advance(
            NodeResult::new("output")
                .with_data("task_id", task_id)
                .with_data("title", title),
        ))
    }
}
