use crate::collaborators::DocumentGenerator;
use async_trait::async_trait;
use lexflow_core::{
    template, NodeConfig, NodeOutcome, NodeProcessor, NodeResult, NodeType, ProcessorContext,
    ProcessorError,
};
use std::sync::Arc;

/// Generates a document from a template and stores the resulting id in the
/// execution context under the configured key, so later nodes can reference
/// it.
pub struct DocumentGenerationProcessor {
    generator: Arc<dyn DocumentGenerator>,
}

impl DocumentGenerationProcessor {
    pub fn new(generator: Arc<dyn DocumentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl NodeProcessor for DocumentGenerationProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::DocumentGeneration
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::DocumentGeneration(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "document node carries a non-document config".to_string(),
            ));
        };
        if ctx.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        let template_name = template::render(&cfg.template, ctx.context);
        let document_id = self
            .generator
            .generate(&template_name, ctx.context)
            .await
            .map_err(|e| ProcessorError::Collaborator(e.to_string()))?;
        Ok(NodeOutcome::Advance(
            NodeResult::new("output")
                .with_data("document_id", document_id.clone())
                .with_context_update(cfg.output_key.clone(), document_id),
        ))
    }
}
