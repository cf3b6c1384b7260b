//! In-process broadcast of plan change messages
//!
//! Stands in for the queue when no NATS server is configured or reachable,
//! and lets an in-process projector follow the write path in tests.

use super::types::{EventPublisher, PlanMessage, PublishError};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus that distributes PlanMessages via `tokio::sync::broadcast`
///
/// Publishing never blocks. If no subscribers are connected, the message is
/// dropped and `PublishError::NoSubscribers` is returned.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlanMessage>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlanMessage> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, message: &PlanMessage) -> Result<(), PublishError> {
        let subscribers = self
            .sender
            .send(message.clone())
            .map_err(|_| PublishError::NoSubscribers)?;
        debug!(
            operation = %message.operation,
            plan_id = %message.plan.object_id,
            subscribers,
            "PlanMessage broadcast"
        );
        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
