use async_trait::async_trait;
use lexflow_core::{
    template, NodeConfig, NodeOutcome, NodeProcessor, NodeType, ProcessorContext, ProcessorError,
    SuspendReason,
};

/// Suspends the execution pending a human decision. The engine creates the
/// ApprovalRequest and the approval coordinator drives resumption; this
/// processor only shapes the request.
pub struct ApprovalProcessor;

#[async_trait]
impl NodeProcessor for ApprovalProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Approval
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Approval(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "approval node carries a non-approval config".to_string(),
            ));
        };
        if cfg.approvers.is_empty() {
            return Err(ProcessorError::Configuration(
                "approval node has no approvers".to_string(),
            ));
        }
        Ok(NodeOutcome::Suspend(SuspendReason::Approval {
            approvers: cfg.approvers.clone(),
            message: template::render(&cfg.message, ctx.context),
            data: cfg.data.clone(),
        }))
    }
}
