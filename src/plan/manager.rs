//! Plan write-path operations
//!
//! Ties the aggregate store, concurrency control, merge-patch and cascade
//! planning together, then hands every committed mutation to the publisher.

use super::cascade::{orphaned_keys, owned_keys};
use super::concurrency::{check_precondition, ConcurrencyControl, ConditionalRead};
use super::error::PlanError;
use super::merge::merge_patch;
use super::models::*;
use crate::events::{EventPublisher, PlanMessage, PlanOperation};
use crate::store::{AggregateStore, ETag, StoredPlan};
use futures::{Stream, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;

/// Manager for plan operations
#[derive(Clone)]
pub struct PlanManager {
    concurrency: ConcurrencyControl,
    publisher: Arc<dyn EventPublisher>,
}

impl PlanManager {
    pub fn new(store: AggregateStore, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            concurrency: ConcurrencyControl::new(store),
            publisher,
        }
    }

    fn store(&self) -> &AggregateStore {
        self.concurrency.store()
    }

    /// Validate and store a new plan. Returns its ETag.
    pub async fn create(&self, plan: Plan) -> Result<ETag, PlanError> {
        plan.validate()?;
        let etag = self.concurrency.create_exclusive(&plan).await?;
        tracing::info!(plan_id = %plan.object_id, etag = %etag, "Plan created");
        self.notify(PlanOperation::Create, plan).await;
        Ok(etag)
    }

    /// Read a plan, honouring `If-None-Match`
    pub async fn get(
        &self,
        id: &ObjectId,
        if_none_match: Option<&str>,
    ) -> Result<ConditionalRead, PlanError> {
        self.concurrency.conditional_get(id, if_none_match).await
    }

    /// Merge `patch` into the stored plan under an `If-Match` precondition.
    pub async fn patch(
        &self,
        id: &ObjectId,
        patch: PlanPatch,
        if_match: Option<&str>,
    ) -> Result<StoredPlan, PlanError> {
        let existing = self.store().get(id).await?;
        check_precondition(&existing.etag, if_match)?;

        let merged = merge_patch(&existing.plan, patch)?;
        merged.validate()?;
        self.ensure_new_ids_free(&existing.plan, &merged).await?;

        let etag = self.concurrency.conditional_put(&merged, if_match).await?;

        let orphans = orphaned_keys(&existing.plan, &merged);
        if !orphans.is_empty() {
            let removed = self.store().delete(&orphans).await?;
            tracing::debug!(plan_id = %id, removed, "Swept keys of replaced entities");
        }

        tracing::info!(plan_id = %id, etag = %etag, "Plan patched");
        self.notify(PlanOperation::Patch, merged.clone()).await;
        Ok(StoredPlan { plan: merged, etag })
    }

    /// Cascade-delete a plan. Returns every key that was targeted.
    ///
    /// No precondition: concurrent deletes are idempotent at the key level.
    pub async fn delete(&self, id: &ObjectId) -> Result<Vec<String>, PlanError> {
        let existing = self.store().get(id).await?;
        let keys = owned_keys(&existing.plan);
        let removed = self.store().delete(&keys).await?;
        tracing::info!(plan_id = %id, keys = keys.len(), removed, "Plan deleted");
        self.notify(PlanOperation::Delete, existing.plan).await;
        Ok(keys)
    }

    /// Lazily list all stored plans
    pub fn plans(&self) -> impl Stream<Item = Result<Plan, PlanError>> + Send + '_ {
        self.store().list_all()
    }

    pub async fn list_all(&self) -> Result<Vec<Plan>, PlanError> {
        self.plans().try_collect().await
    }

    /// Re-publish every stored plan as a `patch` so the index converges on the
    /// primary store. Returns how many plans were published.
    pub async fn reindex(&self) -> Result<usize, PlanError> {
        let mut count = 0;
        let mut plans = std::pin::pin!(self.plans());
        while let Some(plan) = plans.try_next().await? {
            self.notify(PlanOperation::Patch, plan).await;
            count += 1;
        }
        tracing::info!(count, "Re-published stored plans");
        Ok(count)
    }

    /// Entities introduced by a patch must not collide with ids already in
    /// the store.
    async fn ensure_new_ids_free(&self, before: &Plan, after: &Plan) -> Result<(), PlanError> {
        let known: HashSet<&ObjectId> = before.entity_ids().collect();
        for id in after.entity_ids().filter(|id| !known.contains(id)) {
            if self.store().exists(id).await? {
                return Err(PlanError::AlreadyExists(id.to_string()));
            }
        }
        Ok(())
    }

    /// Best-effort publish; failures are logged and swallowed.
    async fn notify(&self, operation: PlanOperation, plan: Plan) {
        let plan_id = plan.object_id.clone();
        let message = PlanMessage::new(operation, plan);
        if let Err(e) = self.publisher.publish(&message).await {
            tracing::warn!(
                plan_id = %plan_id,
                operation = %operation,
                error = %e,
                "Failed to publish plan change, index may lag"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::store::mock::MockKeyValueStore;
    use crate::store::KeyValueStore;
    use crate::test_helpers::{sample_plan, sample_service, FailingPublisher};

    struct Harness {
        kv: Arc<MockKeyValueStore>,
        bus: EventBus,
        manager: PlanManager,
    }

    fn harness() -> Harness {
        let kv = Arc::new(MockKeyValueStore::new());
        let bus = EventBus::default();
        let manager = PlanManager::new(AggregateStore::new(kv.clone()), Arc::new(bus.clone()));
        Harness { kv, bus, manager }
    }

    fn p1() -> Plan {
        sample_plan("P1", "C1", &[("L1", "S1", "SC1")])
    }

    #[tokio::test]
    async fn test_create_publishes_after_write() {
        let h = harness();
        let mut rx = h.bus.subscribe();
        h.manager.create(p1()).await.unwrap();

        let message = rx.try_recv().unwrap();
        assert_eq!(message.operation, PlanOperation::Create);
        assert_eq!(message.plan, p1());
        assert_eq!(h.kv.keys().await.len(), 10);
    }

    #[tokio::test]
    async fn test_create_validation_and_conflict() {
        let h = harness();
        let mut invalid = p1();
        invalid.linked_plan_services[0].object_id = ObjectId::default();
        assert!(matches!(
            h.manager.create(invalid).await,
            Err(PlanError::ValidationFailed { .. })
        ));
        assert!(h.kv.keys().await.is_empty());

        h.manager.create(p1()).await.unwrap();
        assert!(matches!(
            h.manager.create(p1()).await,
            Err(PlanError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_etag_shaped_ids_cannot_reach_another_plan() {
        let h = harness();
        assert!(matches!(
            h.manager
                .create(sample_plan("A", "CA", &[("LA", "B:etag", "SCA")]))
                .await,
            Err(PlanError::ValidationFailed { .. })
        ));
        assert!(h.kv.keys().await.is_empty());

        h.manager
            .create(sample_plan("A", "CA", &[("LA", "SA", "SCA")]))
            .await
            .unwrap();
        let b0 = h
            .manager
            .create(sample_plan("B", "CB", &[("LB", "SB", "SCB")]))
            .await
            .unwrap();
        let ConditionalRead::Modified(a) = h.manager.get(&"A".into(), None).await.unwrap() else {
            panic!("expected a stored plan");
        };
        let patch = PlanPatch {
            linked_plan_services: Some(vec![sample_service("LA2", "SA2", "B:etag")]),
            ..Default::default()
        };
        assert!(matches!(
            h.manager.patch(&"A".into(), patch, Some(a.etag.as_str())).await,
            Err(PlanError::ValidationFailed { .. })
        ));

        let deleted = h.manager.delete(&"A".into()).await.unwrap();
        assert!(!deleted.contains(&"B:etag".to_string()));
        match h.manager.get(&"B".into(), None).await.unwrap() {
            ConditionalRead::Modified(b) => assert_eq!(b.etag, b0),
            ConditionalRead::NotModified => panic!("expected a stored plan"),
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let kv = Arc::new(MockKeyValueStore::new());
        let manager = PlanManager::new(AggregateStore::new(kv), Arc::new(FailingPublisher));
        let etag = manager.create(p1()).await.unwrap();
        assert!(matches!(
            manager.get(&"P1".into(), None).await.unwrap(),
            ConditionalRead::Modified(stored) if stored.etag == etag
        ));
        assert_eq!(manager.delete(&"P1".into()).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_patch_flow() {
        let h = harness();
        let e0 = h.manager.create(p1()).await.unwrap();
        let mut rx = h.bus.subscribe();

        let patch: PlanPatch =
            serde_json::from_str(r#"{"planCostShares":{"objectId":"C1","copay":50}}"#).unwrap();

        assert!(matches!(
            h.manager.patch(&"P1".into(), patch.clone(), None).await,
            Err(PlanError::PreconditionRequired)
        ));
        assert!(matches!(
            h.manager
                .patch(&"P1".into(), patch.clone(), Some("\"nope\""))
                .await,
            Err(PlanError::PreconditionFailed)
        ));
        assert!(rx.try_recv().is_err());

        let stored = h
            .manager
            .patch(&"P1".into(), patch, Some(&e0.header_value()))
            .await
            .unwrap();
        assert_ne!(stored.etag, e0);
        let shares = stored.plan.plan_cost_shares.as_ref().unwrap();
        assert_eq!(shares.copay, 50);
        assert_eq!(shares.deductible, p1().plan_cost_shares.unwrap().deductible);

        let message = rx.try_recv().unwrap();
        assert_eq!(message.operation, PlanOperation::Patch);
        assert_eq!(message.plan, stored.plan);

        // the child record was rewritten too
        let child = h.kv.get("C1").await.unwrap().unwrap();
        let child: serde_json::Value = serde_json::from_slice(&child).unwrap();
        assert_eq!(child["copay"], 50);
    }

    #[tokio::test]
    async fn test_patch_missing_plan() {
        let h = harness();
        assert!(matches!(
            h.manager
                .patch(&"P9".into(), PlanPatch::default(), Some("x"))
                .await,
            Err(PlanError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_sweeps_replaced_entities() {
        let h = harness();
        let e0 = h.manager.create(p1()).await.unwrap();
        let patch = PlanPatch {
            linked_plan_services: Some(vec![sample_service("L1", "S2", "SC2")]),
            ..Default::default()
        };
        h.manager
            .patch(&"P1".into(), patch, Some(e0.as_str()))
            .await
            .unwrap();

        let keys = h.kv.keys().await;
        assert!(!keys.contains(&"S1".to_string()));
        assert!(!keys.contains(&"SC1:etag".to_string()));
        assert!(keys.contains(&"S2".to_string()));
        assert_eq!(keys.len(), 10);
    }

    #[tokio::test]
    async fn test_patch_rejects_ids_owned_elsewhere() {
        let h = harness();
        let e0 = h.manager.create(p1()).await.unwrap();
        h.manager
            .create(sample_plan("P2", "C2", &[("L2", "S2", "SC2")]))
            .await
            .unwrap();

        let patch = PlanPatch {
            linked_plan_services: Some(vec![sample_service("L3", "S2", "SC3")]),
            ..Default::default()
        };
        assert!(matches!(
            h.manager.patch(&"P1".into(), patch, Some(e0.as_str())).await,
            Err(PlanError::AlreadyExists(id)) if id == "S2"
        ));
    }

    #[tokio::test]
    async fn test_patch_identity_mismatch_leaves_store_untouched() {
        let h = harness();
        let e0 = h.manager.create(p1()).await.unwrap();
        let patch = PlanPatch {
            object_id: Some("P2".into()),
            org: Some("other".into()),
            ..Default::default()
        };
        assert!(matches!(
            h.manager.patch(&"P1".into(), patch, Some(e0.as_str())).await,
            Err(PlanError::IdentityMismatch { .. })
        ));
        assert!(matches!(
            h.manager.get(&"P1".into(), Some(e0.as_str())).await.unwrap(),
            ConditionalRead::NotModified
        ));
    }

    #[tokio::test]
    async fn test_delete_returns_cascade_keys() {
        let h = harness();
        let plan = sample_plan("P1", "C1", &[("L1", "S1", "SC1"), ("L2", "S2", "SC2")]);
        h.manager.create(plan.clone()).await.unwrap();
        let mut rx = h.bus.subscribe();

        let keys = h.manager.delete(&"P1".into()).await.unwrap();
        assert_eq!(keys, owned_keys(&plan));
        assert_eq!(keys.len(), 16);
        assert!(h.kv.keys().await.is_empty());

        let message = rx.try_recv().unwrap();
        assert_eq!(message.operation, PlanOperation::Delete);
        assert_eq!(message.plan, plan);

        assert!(matches!(
            h.manager.delete(&"P1".into()).await,
            Err(PlanError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let h = harness();
        let mut rx = h.bus.subscribe();
        h.kv.fail_writes(true);
        assert!(matches!(
            h.manager.create(p1()).await,
            Err(PlanError::StoreIo(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_list_and_reindex() {
        let h = harness();
        h.manager.create(p1()).await.unwrap();
        h.manager
            .create(sample_plan("P2", "C2", &[("L2", "S2", "SC2")]))
            .await
            .unwrap();

        let plans = h.manager.list_all().await.unwrap();
        assert_eq!(plans.len(), 2);

        let mut rx = h.bus.subscribe();
        assert_eq!(h.manager.reindex().await.unwrap(), 2);
        for _ in 0..2 {
            assert_eq!(rx.try_recv().unwrap().operation, PlanOperation::Patch);
        }
    }
}
