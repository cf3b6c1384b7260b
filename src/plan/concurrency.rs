//! Optimistic concurrency over stored aggregates
//!
//! Reads honour `If-None-Match`, writes require `If-Match`. The precondition
//! is checked up front for a clean error and enforced again by a guarded
//! store write, so a writer that slips in between loses with
//! `PreconditionFailed` instead of being overwritten.

use super::error::PlanError;
use super::models::{ObjectId, Plan};
use crate::store::{AggregateStore, ETag, StoredPlan};

/// Outcome of a conditional read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalRead {
    /// The caller's copy is stale (or it had none)
    Modified(StoredPlan),
    /// The caller's tag equals the stored tag; no payload
    NotModified,
}

/// Verify an `If-Match` value against the current tag.
///
/// Missing or blank tags fail with `PreconditionRequired`, any other mismatch
/// with `PreconditionFailed`.
pub fn check_precondition(current: &ETag, if_match: Option<&str>) -> Result<(), PlanError> {
    let candidate = if_match
        .filter(|tag| !tag.trim().is_empty())
        .ok_or(PlanError::PreconditionRequired)?;
    if !current.matches(candidate) {
        return Err(PlanError::PreconditionFailed);
    }
    Ok(())
}

#[derive(Clone)]
pub struct ConcurrencyControl {
    store: AggregateStore,
}

impl ConcurrencyControl {
    pub fn new(store: AggregateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    pub async fn conditional_get(
        &self,
        id: &ObjectId,
        if_none_match: Option<&str>,
    ) -> Result<ConditionalRead, PlanError> {
        let stored = self.store.get(id).await?;
        if let Some(tag) = if_none_match {
            if stored.etag.matches(tag) {
                tracing::debug!(plan_id = %id, etag = %stored.etag, "Not modified");
                return Ok(ConditionalRead::NotModified);
            }
        }
        Ok(ConditionalRead::Modified(stored))
    }

    /// Replace the stored aggregate `plan.object_id` if `if_match` is current.
    ///
    /// Checks run in order: existence, tag presence, tag equality, then the
    /// guarded write itself.
    pub async fn conditional_put(
        &self,
        plan: &Plan,
        if_match: Option<&str>,
    ) -> Result<ETag, PlanError> {
        let current = self
            .store
            .etag(&plan.object_id)
            .await?
            .ok_or_else(|| PlanError::NotFound(plan.object_id.to_string()))?;
        check_precondition(&current, if_match)?;

        match self.store.put_if_current(plan, &current).await? {
            Some(etag) => Ok(etag),
            None => {
                tracing::warn!(plan_id = %plan.object_id, "Concurrent write detected, update aborted");
                Err(PlanError::PreconditionFailed)
            }
        }
    }

    /// Store a new aggregate, failing if any of its entity ids is taken.
    ///
    /// The existence checks and the write are separate round trips: two
    /// concurrent creates of the same id can both succeed.
    pub async fn create_exclusive(&self, plan: &Plan) -> Result<ETag, PlanError> {
        for id in plan.entity_ids() {
            if self.store.exists(id).await? {
                return Err(PlanError::AlreadyExists(id.to_string()));
            }
        }
        self.store.put(plan).await
    }
}
