//! Built-in node processor library
//!
//! One processor per node type, plus the collaborator contracts through
//! which externally-visible effects leave the engine.

mod approval;
mod branch;
pub mod collaborators;
mod control;
mod delay;
mod document;
mod messaging;
mod task;
mod transform;
mod webhook;

pub use approval::ApprovalProcessor;
pub use branch::{ConditionProcessor, DecisionProcessor};
pub use collaborators::{
    CollaboratorError, Collaborators, DocumentGenerator, EmailSender, HttpWebhookClient,
    IntegrationConnector, NotificationDispatcher, RecordingCollaborators, TaskTracker,
    WebhookClient,
};
pub use control::{EndProcessor, StartProcessor};
pub use delay::DelayProcessor;
pub use document::DocumentGenerationProcessor;
pub use messaging::{EmailProcessor, NotificationProcessor};
pub use task::TaskProcessor;
pub use transform::DataTransformationProcessor;
pub use webhook::{IntegrationProcessor, WebhookProcessor};

use lexflow_engine::ProcessorRegistry;
use std::sync::Arc;

/// Register a processor for every node type against the given collaborators.
pub fn register_builtin(registry: &mut ProcessorRegistry, collaborators: &Collaborators) {
    registry.register(Arc::new(StartProcessor));
    registry.register(Arc::new(EndProcessor));
    registry.register(Arc::new(TaskProcessor::new(collaborators.tasks.clone())));
    registry.register(Arc::new(DecisionProcessor));
    registry.register(Arc::new(ApprovalProcessor));
    registry.register(Arc::new(EmailProcessor::new(collaborators.email.clone())));
    registry.register(Arc::new(DelayProcessor));
    registry.register(Arc::new(ConditionProcessor));
    registry.register(Arc::new(WebhookProcessor::new(collaborators.webhooks.clone())));
    registry.register(Arc::new(DocumentGenerationProcessor::new(
        collaborators.documents.clone(),
    )));
    registry.register(Arc::new(NotificationProcessor::new(
        collaborators.notifications.clone(),
    )));
    registry.register(Arc::new(DataTransformationProcessor));
    registry.register(Arc::new(IntegrationProcessor::new(
        collaborators.integrations.clone(),
    )));
}
