use async_trait::async_trait;
use lexflow_core::{
    condition, NodeConfig, NodeOutcome, NodeProcessor, NodeResult, NodeType, ProcessorContext,
    ProcessorError,
};

/// Routes to `yes` when the first true condition is found, `no` otherwise.
/// Evaluation is first-match over the authored order, never best-match.
pub struct DecisionProcessor;

#[async_trait]
impl NodeProcessor for DecisionProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Decision
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Decision(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "decision node carries a non-decision config".to_string(),
            ));
        };
        let matched = cfg
            .conditions
            .iter()
            .position(|c| condition::evaluate(c, ctx.context, ctx.last_result));
        let output = if matched.is_some() { "yes" } else { "no" };
        let mut result = NodeResult::new(output).with_data("matched", matched.is_some());
        if let Some(index) = matched {
            result = result.with_data("matched_index", index as i64);
        }
        Ok(NodeOutcome::Advance(result))
    }
}

/// Boolean gate: `true` when any condition holds, `false` otherwise.
pub struct ConditionProcessor;

#[async_trait]
impl NodeProcessor for ConditionProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Condition(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "condition node carries a non-condition config".to_string(),
            ));
        };
        let passed = cfg
            .conditions
            .iter()
            .any(|c| condition::evaluate(c, ctx.context, ctx.last_result));
        let output = if passed { "true" } else { "false" };
        Ok(NodeOutcome::Advance(
            NodeResult::new(output).with_data("passed", passed),
        ))
    }
}
