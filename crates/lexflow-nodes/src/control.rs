use async_trait::async_trait;
use lexflow_core::{
    NodeOutcome, NodeProcessor, NodeResult, NodeType, ProcessorContext, ProcessorError,
};

/// Entry point of every graph; deterministic pass-through.
pub struct StartProcessor;

#[async_trait]
impl NodeProcessor for StartProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Start
    }

    async fn process(&self, _ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        Ok(NodeOutcome::Advance(NodeResult::new("output")))
    }
}

/// Terminal marker; the run loop ends here without traversal.
pub struct EndProcessor;

#[async_trait]
impl NodeProcessor for EndProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::End
    }

    async fn process(&self, _ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        Ok(NodeOutcome::Complete(
            NodeResult::new("output").with_data("completed", true),
        ))
    }
}
