use crate::collaborators::{EmailSender, NotificationDispatcher};
use async_trait::async_trait;
use lexflow_core::{
    template, NodeConfig, NodeOutcome, NodeProcessor, NodeResult, NodeType, ProcessorContext,
    ProcessorError,
};
use std::sync::Arc;

/// Renders the configured strings and hands the message to the email
/// collaborator.
pub struct EmailProcessor {
    sender: Arc<dyn EmailSender>,
}

impl EmailProcessor {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NodeProcessor for EmailProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Email
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Email(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "email node carries a non-email config".to_string(),
            ));
        };
        if ctx.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        let to = template::render(&cfg.to, ctx.context);
        let subject = template::render(&cfg.subject, ctx.context);
        let body = template::render(&cfg.body, ctx.context);
        let message_id = self
            .sender
            .send(&to, &subject, &body)
            .await
            .map_err(|e| ProcessorError::Collaborator(e.to_string()))?;
        Ok(NodeOutcome::Advance(
            NodeResult::new("output")
                .with_data("message_id", message_id)
                .with_data("to", to),
        ))
    }
}

/// Dispatches a rendered message through the notification channel
/// collaborator.
pub struct NotificationProcessor {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationProcessor {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl NodeProcessor for NotificationProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Notification
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::Notification(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "notification node carries a non-notification config".to_string(),
            ));
        };
        if ctx.cancellation.is_cancelled() {
            return Err(ProcessorError::Cancelled);
        }
        let message = template::render(&cfg.message, ctx.context);
        let notification_id = self
            .dispatcher
            .dispatch(&cfg.channel, &cfg.recipients, &message)
            .await
            .map_err(|e| ProcessorError::Collaborator(e.to_string()))?;
        Ok(NodeOutcome::Advance(
            NodeResult::new("output").with_data("notification_id", notification_id),
        ))
    }
}
