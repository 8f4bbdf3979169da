use crate::collaborators::{IntegrationConnector, WebhookClient};
use async_trait::async_trait;
use lexflow_core::{
    template, DataMap, NodeConfig, NodeOutcome, NodeProcessor, NodeResult, NodeType,
    ProcessorContext, ProcessorError,
};
use serde_json::Value;
use std::sync::Arc;

/// Render every string value of a payload map against the context. Nested
/// values pass through untouched.
fn render_map(map: &DataMap, context: &DataMap) -> DataMap {
    map.iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => Value::String(template::render(s, context)),
                other => other.clone(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

/// Delivers a rendered payload to an external HTTP endpoint.
pub struct WebhookProcessor {
    client: Arc<dyn WebhookClient>,
}

impl WebhookProcessor {
    pub fn new(client: Arc<dyn WebhookClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeProcessor for WebhookProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Webhook
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Webhook(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "webhook node carries a non-webhook config".to_string(),
            ));
        };
        if ctx.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        let url = template::render(&cfg.url, ctx.context);
        let payload = Value::Object(render_map(&cfg.payload, ctx.context));
        let correlation_id = self
            .client
            .deliver(&url, &cfg.method, &payload)
            .await
            .map_err(|e| ProcessorError::Collaborator(e.to_string()))?;
        Ok(NodeOutcome::Advance(
            NodeResult::new("output")
                .with_data("correlation_id", correlation_id)
                .with_data("url", url),
        ))
    }
}

/// Invokes a named action on an external integration provider.
pub struct IntegrationProcessor {
    connector: Arc<dyn IntegrationConnector>,
}

impl IntegrationProcessor {
    pub fn new(connector: Arc<dyn IntegrationConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl NodeProcessor for IntegrationProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Integration
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Integration(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "integration node carries a non-integration config".to_string(),
            ));
        };
        if ctx.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        let params = Value::Object(render_map(&cfg.params, ctx.context));
        let correlation_id = self
            .connector
            .invoke(&cfg.provider, &cfg.action, &params)
            .await
            .map_err(|e| ProcessorError::Collaborator(e.to_string()))?;
        Ok(NodeOutcome::Advance(
            NodeResult::new("output")
                .with_data("correlation_id", correlation_id)
                .with_data("provider", cfg.provider.clone()),
        ))
    }
}
