//! In-memory mock implementation of SearchIndex for testing without Elasticsearch.

use super::documents::{DeleteTarget, IndexDocument};
use super::traits::{IndexWriteError, SearchIndex};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// A stored document and the routing it was written with
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub routing: Option<String>,
    pub body: Value,
}

/// Mock index that models shard placement: a document is located by its
/// routing value, or by its own id when no routing is given. A delete whose
/// effective routing differs from the one the document was written with
/// misses it, like a delete sent to the wrong shard.
pub struct MockSearchIndex {
    pub documents: RwLock<BTreeMap<String, StoredDocument>>,
    /// Every upsert in arrival order, as `relation:id`
    pub upserts: RwLock<Vec<String>>,
    rejected_ids: RwLock<HashSet<String>>,
}

impl MockSearchIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            upserts: RwLock::new(Vec::new()),
            rejected_ids: RwLock::new(HashSet::new()),
        }
    }

    /// Make upserts of `id` fail
    pub async fn reject(&self, id: &str) {
        self.rejected_ids.write().await.insert(id.to_string());
    }

    pub async fn ids(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<StoredDocument> {
        self.documents.read().await.get(id).cloned()
    }
}

impl Default for MockSearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn shard_key<'a>(id: &'a str, routing: Option<&'a str>) -> &'a str {
    routing.unwrap_or(id)
}

#[async_trait]
impl SearchIndex for MockSearchIndex {
    async fn ensure_index(&self) -> Result<(), IndexWriteError> {
        Ok(())
    }

    async fn upsert(&self, doc: &IndexDocument) -> Result<(), IndexWriteError> {
        if self.rejected_ids.read().await.contains(&doc.id) {
            return Err(IndexWriteError::Rejected {
                doc: doc.label(),
                status: 400,
                body: "mock rejection".into(),
            });
        }
        self.upserts.write().await.push(doc.label());
        self.documents.write().await.insert(
            doc.id.clone(),
            StoredDocument {
                routing: doc.routing.clone(),
                body: doc.body.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<(), IndexWriteError> {
        let mut documents = self.documents.write().await;
        let located = documents.get(&target.id).is_some_and(|stored| {
            shard_key(&target.id, stored.routing.as_deref())
                == shard_key(&target.id, target.routing.as_deref())
        });
        if !located {
            return Err(IndexWriteError::Missing { doc: target.label() });
        }
        documents.remove(&target.id);
        Ok(())
    }
}
