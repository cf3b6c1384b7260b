//! Aggregate persistence over a flat key space
//!
//! A Plan is stored flattened: the root key holds the full serialized
//! aggregate, and every owned entity is written again under its own id. Each
//! key has a `<id>:etag` side-key holding the content ETag of that value.

use super::etag::ETag;
use super::traits::KeyValueStore;
use crate::plan::error::PlanError;
use crate::plan::models::{ObjectId, Plan, ETAG_KEY_SUFFIX};
use crate::plan::tree::EntityKind;
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Keys requested per SCAN step
const SCAN_BATCH: usize = 100;

/// A plan as read back from the store, with its current ETag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlan {
    pub plan: Plan,
    pub etag: ETag,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct PlanPage {
    pub plans: Vec<Plan>,
    /// Token to resume from, `None` once the scan is complete
    pub next_cursor: Option<String>,
}

/// Flattened plan persistence on top of a `KeyValueStore`
#[derive(Clone)]
pub struct AggregateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl AggregateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Whether any entity (of any kind) is stored under `id`
    pub async fn exists(&self, id: &ObjectId) -> Result<bool, PlanError> {
        Ok(self.kv.exists(&id.key()).await?)
    }

    /// Stored ETag of `id`, if any
    pub async fn etag(&self, id: &ObjectId) -> Result<Option<ETag>, PlanError> {
        let raw = self.kv.get(&id.etag_key()).await?;
        Ok(raw.map(|bytes| ETag::parse(&String::from_utf8_lossy(&bytes))))
    }

    /// Read a plan and its ETag.
    ///
    /// Ids of non-plan entities resolve to `NotFound`: only roots are
    /// addressable as aggregates.
    pub async fn get(&self, id: &ObjectId) -> Result<StoredPlan, PlanError> {
        let keys = [id.key(), id.etag_key()];
        let mut values = self.kv.get_many(&keys).await?.into_iter();
        let (Some(Some(body)), Some(Some(tag))) = (values.next(), values.next()) else {
            return Err(PlanError::NotFound(id.to_string()));
        };

        let plan = decode_plan(&body)
            .map_err(PlanError::StoreIo)?
            .ok_or_else(|| PlanError::NotFound(id.to_string()))?;
        Ok(StoredPlan {
            plan,
            etag: ETag::parse(&String::from_utf8_lossy(&tag)),
        })
    }

    /// Write the whole aggregate unconditionally; returns the root ETag
    pub async fn put(&self, plan: &Plan) -> Result<ETag, PlanError> {
        let (entries, etag) = flatten(plan)?;
        self.kv.set_many(&entries).await?;
        tracing::debug!(plan_id = %plan.object_id, etag = %etag, keys = entries.len(), "Stored plan");
        Ok(etag)
    }

    /// Write the whole aggregate only if the stored root ETag still equals
    /// `expected`. Returns `None` when another writer got there first.
    pub async fn put_if_current(
        &self,
        plan: &Plan,
        expected: &ETag,
    ) -> Result<Option<ETag>, PlanError> {
        let (entries, etag) = flatten(plan)?;
        let applied = self
            .kv
            .set_many_if(
                &plan.object_id.etag_key(),
                expected.as_str().as_bytes(),
                &entries,
            )
            .await?;
        if !applied {
            tracing::debug!(plan_id = %plan.object_id, expected = %expected, "Guarded write rejected");
            return Ok(None);
        }
        tracing::debug!(plan_id = %plan.object_id, etag = %etag, "Stored plan (guarded)");
        Ok(Some(etag))
    }

    /// Remove keys as one pipelined batch. Returns how many existed.
    pub async fn delete(&self, keys: &[String]) -> Result<u64, PlanError> {
        Ok(self.kv.delete_many(keys).await?)
    }

    /// One page of plans starting at `cursor` (`None` = from the beginning).
    ///
    /// ETag keys and non-plan records are skipped, as are keys deleted between
    /// the scan and the read. A page may be empty while `next_cursor` is set.
    pub async fn scan_page(&self, cursor: Option<&str>) -> Result<PlanPage, PlanError> {
        let position = match cursor {
            None => 0,
            Some(token) => token
                .parse::<u64>()
                .map_err(|_| PlanError::validation("cursor", format!("invalid cursor {}", token)))?,
        };

        let (next, keys) = self.kv.scan(position, SCAN_BATCH).await?;
        let keys: Vec<String> = keys
            .into_iter()
            .filter(|k| !k.ends_with(ETAG_KEY_SUFFIX))
            .collect();
        let values = self.kv.get_many(&keys).await?;

        let mut plans = Vec::new();
        for (key, value) in keys.iter().zip(values) {
            let Some(bytes) = value else {
                tracing::debug!(key = %key, "Key vanished during scan, skipping");
                continue;
            };
            match decode_plan(&bytes) {
                Ok(Some(plan)) => plans.push(plan),
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable record"),
            }
        }

        Ok(PlanPage {
            plans,
            next_cursor: (next != 0).then(|| next.to_string()),
        })
    }

    /// Lazily list every stored plan.
    ///
    /// Plans surfacing twice (the store may move keys between scan steps) are
    /// yielded once.
    pub fn list_all(&self) -> impl Stream<Item = Result<Plan, PlanError>> + Send + '_ {
        enum Position {
            Start,
            At(String),
            Done,
        }

        stream::try_unfold(
            (Position::Start, HashSet::new()),
            move |(position, mut seen)| async move {
                let cursor = match position {
                    Position::Done => return Ok::<_, PlanError>(None),
                    Position::Start => None,
                    Position::At(token) => Some(token),
                };
                let page = self.scan_page(cursor.as_deref()).await?;
                let fresh: Vec<Plan> = page
                    .plans
                    .into_iter()
                    .filter(|plan| seen.insert(plan.object_id.clone()))
                    .collect();
                let next = match page.next_cursor {
                    Some(token) => Position::At(token),
                    None => Position::Done,
                };
                Ok::<_, PlanError>(Some((fresh, (next, seen))))
            },
        )
        .map_ok(|plans| stream::iter(plans.into_iter().map(Ok::<Plan, PlanError>)))
        .try_flatten()
    }
}

/// Serialize every node of the aggregate into `(key, value)` pairs plus ETag
/// side-keys. Leaves are encoded first so a failure names the innermost entity.
fn flatten(plan: &Plan) -> Result<(Vec<(String, Vec<u8>)>, ETag), PlanError> {
    let nodes = plan.entities();
    let mut entries = Vec::with_capacity(nodes.len() * 2);
    let mut root_etag = None;

    for node in nodes.iter().rev() {
        let bytes = serde_json::to_vec(&node.body).map_err(|source| {
            PlanError::SerializationFailed {
                entity: node.label(),
                source,
            }
        })?;
        let etag = ETag::of_bytes(&bytes);
        entries.push((node.id.key(), bytes));
        entries.push((node.id.etag_key(), etag.as_str().as_bytes().to_vec()));
        if node.kind == EntityKind::Plan {
            root_etag = Some(etag);
        }
    }

    let etag = root_etag.unwrap_or_else(|| ETag::of_bytes(b""));
    Ok((entries, etag))
}

/// Decode a stored value as a plan. `Ok(None)` for records of other entity
/// kinds (they lack the `linkedPlanServices` member).
fn decode_plan(bytes: &[u8]) -> anyhow::Result<Option<Plan>> {
    let value: Value = serde_json::from_slice(bytes)?;
    if value.get("linkedPlanServices").is_none() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}
