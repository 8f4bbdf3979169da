use chrono::Utc;
use lexflow_core::{ApprovalRequest, ApprovalStatus, EngineError, ExecutionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tracks outstanding approval requests and enforces exactly-once
/// resolution. Resuming the owning execution is the engine's job; this
/// coordinator owns only the request records.
#[derive(Clone, Default)]
pub struct ApprovalCoordinator {
    requests: Arc<RwLock<HashMap<Uuid, ApprovalRequest>>>,
}

impl ApprovalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, request: ApprovalRequest) -> ApprovalRequest {
        let mut requests = self.requests.write().await;
        requests.insert(request.id, request.clone());
        request
    }

    pub async fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.requests.read().await.get(&id).cloned()
    }

    pub async fn pending_for_execution(&self, execution_id: ExecutionId) -> Vec<ApprovalRequest> {
        self.requests
            .read()
            .await
            .values()
            .filter(|r| r.execution_id == execution_id && !r.is_resolved())
            .cloned()
            .collect()
    }

    /// Terminate a request exactly once. A second resolution fails with a
    /// conflict error instead of overwriting the recorded decision.
    pub async fn resolve(
        &self,
        id: Uuid,
        responder: &str,
        approved: bool,
        message: Option<String>,
    ) -> Result<ApprovalRequest, EngineError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&id)
            .ok_or(EngineError::ApprovalNotFound(id))?;
        if request.is_resolved() {
            return Err(EngineError::ApprovalAlreadyResolved {
                approval_id: id,
                status: request.status,
            });
        }
        request.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.responded_at = Some(Utc::now());
        request.responded_by = Some(responder.to_string());
        request.response_message = message;
        Ok(request.clone())
    }
}
