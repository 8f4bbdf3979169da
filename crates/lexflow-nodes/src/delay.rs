use async_trait::async_trait;
use chrono::{Duration, Utc};
use lexflow_core::{
    NodeConfig, NodeOutcome, NodeProcessor, NodeType, ProcessorContext, ProcessorError,
    SuspendReason,
};

/// Suspends the execution until a wake timestamp. The engine persists the
/// timestamp on the node run before waiting, so the delay survives as data
/// rather than only as an in-process sleep.
pub struct DelayProcessor;

#[async_trait]
impl NodeProcessor for DelayProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Delay
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Delay(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "delay node carries a non-delay config".to_string(),
            ));
        };
        if cfg.duration_secs == 0 {
            return Err(ProcessorError::Configuration(
                "delay node has no duration".to_string(),
            ));
        }
        let wake_at = Utc::now() + Duration::seconds(cfg.duration_secs as i64);
        Ok(NodeOutcome::Suspend(SuspendReason::DelayUntil { wake_at }))
    }
}
