//! SearchIndex trait definition

use super::documents::{DeleteTarget, IndexDocument};
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single index write. Never fatal to the consumer: the primary
/// store stays the source of truth.
#[derive(Debug, Error)]
pub enum IndexWriteError {
    #[error("failed to encode {doc}: {source}")]
    Encode {
        doc: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request for {doc} failed: {reason}")]
    Request { doc: String, reason: String },

    #[error("{doc} rejected with status {status}: {body}")]
    Rejected {
        doc: String,
        status: u16,
        body: String,
    },

    #[error("{doc} not found in index")]
    Missing { doc: String },
}

/// Write side of the search index holding all five join document kinds.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with the join mapping if it does not exist yet
    async fn ensure_index(&self) -> Result<(), IndexWriteError>;

    /// Index (create or overwrite) one document with its routing
    async fn upsert(&self, doc: &IndexDocument) -> Result<(), IndexWriteError>;

    /// Remove one document, with routing if the target carries one
    async fn delete(&self, target: &DeleteTarget) -> Result<(), IndexWriteError>;
}
