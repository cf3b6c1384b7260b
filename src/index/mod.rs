//! Search-index projection
//!
//! Decomposes plans into parent/child join documents and applies them to an
//! Elasticsearch index from queued change messages.

pub mod client;
pub mod consumer;
pub mod documents;
pub mod traits;

pub use client::ElasticClient;
pub use consumer::{IndexProjector, ProjectionReport};
pub use documents::{decompose, delete_targets, DeleteTarget, IndexDocument};
pub use traits::{IndexWriteError, SearchIndex};

#[cfg(test)]
pub(crate) mod mock;
