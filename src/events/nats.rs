//! NATS transport for plan change messages
//!
//! One client is opened at process start and cloned per publish; the
//! consumer side joins a queue group so several indexer instances share one
//! logical subscription.

use super::types::{EventPublisher, PlanMessage, PublishError};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Publishes `PlanMessage` envelopes as JSON on a single subject.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    subject: String,
}

impl NatsPublisher {
    /// Create a publisher over an already connected client.
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }

    /// Push buffered messages to the server. Called on shutdown so that
    /// publishes accepted just before exit are not lost in the client buffer.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to flush NATS client: {}", e))?;
        debug!(subject = %self.subject, "NATS client flushed");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, message: &PlanMessage) -> Result<(), PublishError> {
        let payload = encode(message)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| {
                warn!(
                    subject = %self.subject,
                    operation = %message.operation,
                    plan_id = %message.plan.object_id,
                    "Failed to publish message to NATS: {}",
                    e
                );
                PublishError::Transport {
                    subject: self.subject.clone(),
                    reason: e.to_string(),
                }
            })?;
        debug!(
            subject = %self.subject,
            operation = %message.operation,
            plan_id = %message.plan.object_id,
            "PlanMessage published to NATS"
        );
        Ok(())
    }
}

/// Serialize an envelope to its wire form
pub fn encode(message: &PlanMessage) -> Result<Vec<u8>, PublishError> {
    Ok(serde_json::to_vec(message)?)
}

/// Connect to a NATS server.
pub async fn connect_nats(url: &str) -> anyhow::Result<async_nats::Client> {
    let client = async_nats::connect(url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to NATS at {}: {}", url, e))?;
    tracing::info!("Connected to NATS at {}", url);
    Ok(client)
}

/// Join `group` on `subject`: each message is delivered to exactly one
/// member of the group.
pub async fn subscribe_queue(
    client: &async_nats::Client,
    subject: &str,
    group: &str,
) -> anyhow::Result<async_nats::Subscriber> {
    let subscriber = client
        .queue_subscribe(subject.to_string(), group.to_string())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to subscribe to NATS subject {}: {}", subject, e))?;
    debug!(subject = %subject, group = %group, "Joined NATS queue group");
    Ok(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlanOperation;
    use crate::test_helpers::sample_plan;

    #[test]
    fn test_encoded_payload_decodes() {
        let message = PlanMessage::new(
            PlanOperation::Delete,
            sample_plan("P1", "C1", &[("L1", "S1", "SC1")]),
        );
        let payload = encode(&message).unwrap();
        let decoded: PlanMessage = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, message);
    }
}
