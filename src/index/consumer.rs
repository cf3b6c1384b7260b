//! Index projection consumer
//!
//! Applies queued plan messages to the search index, one message at a time in
//! delivery order. Failures are logged per document and never retried: a
//! drifted index is repaired by re-driving from the primary store.

use super::documents::{decompose, delete_targets};
use super::traits::{IndexWriteError, SearchIndex};
use crate::events::{PlanMessage, PlanOperation};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of projecting one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionReport {
    pub operation: PlanOperation,
    pub attempted: usize,
    pub failed: usize,
}

pub struct IndexProjector {
    index: Arc<dyn SearchIndex>,
    route_deletes: bool,
}

impl IndexProjector {
    /// `route_deletes = false` sends deletes by id only, which misses any
    /// document stored under a routing value other than its own id.
    pub fn new(index: Arc<dyn SearchIndex>, route_deletes: bool) -> Self {
        Self {
            index,
            route_deletes,
        }
    }

    /// Project one decoded message.
    ///
    /// `create` and `patch` both upsert the full decomposition of the
    /// aggregate; `delete` removes every document the aggregate owns.
    pub async fn handle(&self, message: &PlanMessage) -> ProjectionReport {
        let plan_id = &message.plan.object_id;
        let (attempted, failed) = match message.operation {
            PlanOperation::Create | PlanOperation::Patch => match decompose(&message.plan) {
                Ok(docs) => {
                    let mut failed = 0;
                    for doc in &docs {
                        if let Err(e) = self.index.upsert(doc).await {
                            log_failure(plan_id.as_str(), message.operation, &e);
                            failed += 1;
                        }
                    }
                    (docs.len(), failed)
                }
                Err(e) => {
                    log_failure(plan_id.as_str(), message.operation, &e);
                    (0, 1)
                }
            },
            PlanOperation::Delete => {
                let targets = delete_targets(&message.plan, self.route_deletes);
                let mut failed = 0;
                for target in &targets {
                    if let Err(e) = self.index.delete(target).await {
                        log_failure(plan_id.as_str(), message.operation, &e);
                        failed += 1;
                    }
                }
                (targets.len(), failed)
            }
        };

        info!(
            plan_id = %plan_id,
            operation = %message.operation,
            attempted,
            failed,
            "Message projected"
        );
        ProjectionReport {
            operation: message.operation,
            attempted,
            failed,
        }
    }

    /// Decode and project a raw queue payload. Undecodable payloads and
    /// unknown operations are logged and skipped (`None`).
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<ProjectionReport> {
        match serde_json::from_slice::<PlanMessage>(payload) {
            Ok(message) => Some(self.handle(&message).await),
            Err(e) => {
                let operation = serde_json::from_slice::<Value>(payload)
                    .ok()
                    .and_then(|v| v.get("operation").and_then(Value::as_str).map(str::to_owned));
                warn!(operation = ?operation, error = %e, "Skipping undecodable message");
                None
            }
        }
    }

    /// Drain a stream of raw payloads sequentially. Returns how many messages
    /// were projected once the stream ends.
    pub async fn run<S, P>(&self, payloads: S) -> usize
    where
        S: Stream<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut payloads = std::pin::pin!(payloads);
        let mut projected = 0;
        while let Some(payload) = payloads.next().await {
            debug!(bytes = payload.as_ref().len(), "Received message");
            if self.handle_payload(payload.as_ref()).await.is_some() {
                projected += 1;
            }
        }
        info!(projected, "Message stream ended");
        projected
    }

    /// Make sure the target index exists with the join mapping.
    pub async fn prepare(&self) -> Result<(), IndexWriteError> {
        self.index.ensure_index().await
    }
}

fn log_failure(plan_id: &str, operation: PlanOperation, error: &IndexWriteError) {
    warn!(
        plan_id = %plan_id,
        operation = %operation,
        error = %error,
        "Index write failed, continuing"
    );
}
