//! Test helper factories and mock state builders
//!
//! Provides convenience functions for creating plans with sensible defaults,
//! and helpers for building mock server state.
#![allow(dead_code)]

use crate::api::handlers::{PlanState, ServerState};
use crate::events::{EventBus, EventPublisher, PlanMessage, PublishError};
use crate::plan::models::*;
use crate::plan::PlanManager;
use crate::store::mock::MockKeyValueStore;
use crate::store::AggregateStore;
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// Mock state builders
// ============================================================================

/// Server state over an empty in-memory store, publishing to a local bus.
///
/// Returns the store and bus as well so tests can inspect them.
pub fn mock_plan_state() -> (PlanState, Arc<MockKeyValueStore>, EventBus) {
    let kv = Arc::new(MockKeyValueStore::new());
    let bus = EventBus::default();
    let plans = PlanManager::new(AggregateStore::new(kv.clone()), Arc::new(bus.clone()));
    let state = Arc::new(ServerState {
        plans,
        store: kv.clone(),
    });
    (state, kv, bus)
}

/// Publisher whose transport is always down
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _message: &PlanMessage) -> Result<(), PublishError> {
        Err(PublishError::Transport {
            subject: "plans".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

// ============================================================================
// Test data factories
// ============================================================================

const ORG: &str = "example.com";

fn cost_shares(id: &str, deductible: u64, copay: u64) -> CostShares {
    CostShares {
        object_id: ObjectId::from(id),
        object_type: "membercostshare".to_string(),
        org: ORG.to_string(),
        deductible,
        copay,
    }
}

/// A linked plan service `lps_id` wrapping service `service_id` and cost
/// shares `shares_id`
pub fn sample_service(lps_id: &str, service_id: &str, shares_id: &str) -> LinkedPlanService {
    LinkedPlanService {
        object_id: ObjectId::from(lps_id),
        object_type: "planservice".to_string(),
        org: ORG.to_string(),
        linked_service: LinkedService {
            object_id: ObjectId::from(service_id),
            object_type: "service".to_string(),
            org: ORG.to_string(),
            name: format!("Service {service_id}"),
        },
        plan_service_cost_shares: cost_shares(shares_id, 10, 175),
    }
}

/// A complete plan: `(lps, service, cost shares)` ids per linked service
pub fn sample_plan(plan_id: &str, cost_id: &str, services: &[(&str, &str, &str)]) -> Plan {
    Plan {
        object_id: ObjectId::from(plan_id),
        object_type: "plan".to_string(),
        org: ORG.to_string(),
        creation_date: "12-12-2017".to_string(),
        plan_cost_shares: Some(cost_shares(cost_id, 2000, 23)),
        linked_plan_services: services
            .iter()
            .map(|(lps, service, shares)| sample_service(lps, service, shares))
            .collect(),
    }
}

/// Plan `P-{i}` whose child ids are unique to `i`
pub fn numbered_plan(i: usize) -> Plan {
    let plan_id = format!("P-{i}");
    let cost_id = format!("C-{i}");
    let lps = format!("L-{i}");
    let service = format!("S-{i}");
    let shares = format!("SC-{i}");
    sample_plan(&plan_id, &cost_id, &[(&lps, &service, &shares)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_produce_valid_plans() {
        assert!(sample_plan("P1", "C1", &[("L1", "S1", "SC1")]).validate().is_ok());
        let plan = numbered_plan(3);
        assert!(plan.validate().is_ok());
        assert_eq!(plan.object_id.as_str(), "P-3");
    }

    #[tokio::test]
    async fn test_mock_state_health() {
        let (state, _, _) = mock_plan_state();
        assert!(state.store.health_check().await.unwrap());
    }
}
