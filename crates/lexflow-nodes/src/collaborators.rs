//! Boundary contracts for externally-visible node effects.
//!
//! Each trait takes rendered parameters and returns a correlation id or a
//! failure; the engine does not retry on a collaborator's behalf beyond the
//! node's own retry policy. The in-memory implementations record every call
//! and back the default registry wiring for tests and development.

use async_trait::async_trait;
use lexflow_core::DataMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn deliver(
        &self,
        url: &str,
        method: &str,
        payload: &Value,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(&self, template: &str, context: &DataMap)
        -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        channel: &str,
        recipients: &[String],
        message: &str,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait IntegrationConnector: Send + Sync {
    async fn invoke(
        &self,
        provider: &str,
        action: &str,
        params: &Value,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait TaskTracker: Send + Sync {
    async fn create_task(
        &self,
        title: &str,
        description: &str,
        assignee: Option<&str>,
    ) -> Result<String, CollaboratorError>;
}

/// Bundle of collaborator capabilities handed to `register_builtin`.
#[derive(Clone)]
pub struct Collaborators {
    pub email: Arc<dyn EmailSender>,
    pub webhooks: Arc<dyn WebhookClient>,
    pub documents: Arc<dyn DocumentGenerator>,
    pub notifications: Arc<dyn NotificationDispatcher>,
    pub integrations: Arc<dyn IntegrationConnector>,
    pub tasks: Arc<dyn TaskTracker>,
}

/// In-memory collaborators that record every call, kept alongside the
/// bundle so callers can inspect what the engine delivered.
#[derive(Clone, Default)]
pub struct RecordingCollaborators {
    pub email: Arc<RecordingEmailSender>,
    pub webhooks: Arc<RecordingWebhookClient>,
    pub documents: Arc<RecordingDocumentGenerator>,
    pub notifications: Arc<RecordingNotificationDispatcher>,
    pub integrations: Arc<RecordingIntegrationConnector>,
    pub tasks: Arc<RecordingTaskTracker>,
}

impl RecordingCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bundle(&self) -> Collaborators {
        Collaborators {
            email: self.email.clone(),
            webhooks: self.webhooks.clone(),
            documents: self.documents.clone(),
            notifications: self.notifications.clone(),
            integrations: self.integrations.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<SentEmail>>,
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, CollaboratorError> {
        self.sent
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("email log poisoned".into()))?
            .push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(correlation_id())
    }
}

#[derive(Debug, Clone)]
pub struct DeliveredWebhook {
    pub url: String,
    pub method: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct RecordingWebhookClient {
    pub delivered: Mutex<Vec<DeliveredWebhook>>,
}

#[async_trait]
impl WebhookClient for RecordingWebhookClient {
    async fn deliver(
        &self,
        url: &str,
        method: &str,
        payload: &Value,
    ) -> Result<String, CollaboratorError> {
        self.delivered
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("webhook log poisoned".into()))?
            .push(DeliveredWebhook {
                url: url.to_string(),
                method: method.to_string(),
                payload: payload.clone(),
            });
        Ok(correlation_id())
    }
}

#[derive(Default)]
pub struct RecordingDocumentGenerator {
    pub generated: Mutex<Vec<String>>,
}

#[async_trait]
impl DocumentGenerator for RecordingDocumentGenerator {
    async fn generate(
        &self,
        template: &str,
        _context: &DataMap,
    ) -> Result<String, CollaboratorError> {
        self.generated
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("document log poisoned".into()))?
            .push(template.to_string());
        Ok(correlation_id())
    }
}

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub channel: String,
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingNotificationDispatcher {
    pub sent: Mutex<Vec<SentNotification>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingNotificationDispatcher {
    async fn dispatch(
        &self,
        channel: &str,
        recipients: &[String],
        message: &str,
    ) -> Result<String, CollaboratorError> {
        self.sent
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("notification log poisoned".into()))?
            .push(SentNotification {
                channel: channel.to_string(),
                recipients: recipients.to_vec(),
                message: message.to_string(),
            });
        Ok(correlation_id())
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationCall {
    pub provider: String,
    pub action: String,
    pub params: Value,
}

#[derive(Default)]
pub struct RecordingIntegrationConnector {
    pub calls: Mutex<Vec<IntegrationCall>>,
}

#[async_trait]
impl IntegrationConnector for RecordingIntegrationConnector {
    async fn invoke(
        &self,
        provider: &str,
        action: &str,
        params: &Value,
    ) -> Result<String, CollaboratorError> {
        self.calls
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("integration log poisoned".into()))?
            .push(IntegrationCall {
                provider: provider.to_string(),
                action: action.to_string(),
                params: params.clone(),
            });
        Ok(correlation_id())
    }
}

#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub title: String,
    pub description: String,
    pub assignee: Option<String>,
}

#[derive(Default)]
pub struct RecordingTaskTracker {
    pub created: Mutex<Vec<CreatedTask>>,
}

#[async_trait]
impl TaskTracker for RecordingTaskTracker {
    async fn create_task(
        &self,
        title: &str,
        description: &str,
        assignee: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        self.created
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("task log poisoned".into()))?
            .push(CreatedTask {
                title: title.to_string(),
                description: description.to_string(),
                assignee: assignee.map(str::to_string),
            });
        Ok(correlation_id())
    }
}

/// Webhook delivery over HTTP.
pub struct HttpWebhookClient {
    client: reqwest::Client,
}

impl HttpWebhookClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn deliver(
        &self,
        url: &str,
        method: &str,
        payload: &Value,
    ) -> Result<String, CollaboratorError> {
        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url).json(payload),
            "PUT" => self.client.put(url).json(payload),
            "DELETE" => self.client.delete(url),
            other => {
                return Err(CollaboratorError::Rejected(format!(
                    "unsupported method: {}",
                    other
                )))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Rejected(format!(
                "webhook returned status {}",
                status
            )));
        }
        let correlation = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(correlation_id);
        tracing::debug!("webhook delivered to {} ({})", url, correlation);
        Ok(correlation)
    }
}
