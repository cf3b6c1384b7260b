//! Change event types and the publisher port

use crate::plan::models::Plan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The mutation that produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOperation {
    Create,
    Patch,
    Delete,
}

impl PlanOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanOperation::Create => "create",
            PlanOperation::Patch => "patch",
            PlanOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for PlanOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue envelope: the operation plus the full post-operation aggregate
/// (for deletes, the aggregate as it was before removal).
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMessage {
    pub operation: PlanOperation,
    pub plan: Plan,
}

impl PlanMessage {
    pub fn new(operation: PlanOperation, plan: Plan) -> Self {
        Self { operation, plan }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish to {subject}: {reason}")]
    Transport { subject: String, reason: String },

    #[error("no subscribers, message dropped")]
    NoSubscribers,
}

/// Best-effort notification port.
///
/// At-most-once, no retry: callers log failures and move on. The store write
/// that preceded a publish is never rolled back because of it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: &PlanMessage) -> Result<(), PublishError>;
}
