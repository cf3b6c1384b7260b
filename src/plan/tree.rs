//! Explicit ownership tree of a Plan aggregate
//!
//! Every consumer of the aggregate's structure (flattened persistence, cascade
//! delete, index projection) walks the same typed node list instead of poking
//! at nested fields on its own.

use super::models::{CostShares, LinkedPlanService, LinkedService, ObjectId, Plan};
use serde::Serialize;

/// Kind of an entity inside the aggregate.
///
/// The relation names double as join relation names in the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Plan,
    PlanCostShares,
    LinkedPlanService,
    LinkedService,
    PlanServiceCostShares,
}

impl EntityKind {
    /// Join relation name
    pub fn relation(&self) -> &'static str {
        match self {
            EntityKind::Plan => "plan",
            EntityKind::PlanCostShares => "planCostShares",
            EntityKind::LinkedPlanService => "linkedPlanServices",
            EntityKind::LinkedService => "linkedService",
            EntityKind::PlanServiceCostShares => "planserviceCostShares",
        }
    }
}

/// Borrowed view of an entity's content
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum EntityBody<'a> {
    Plan(&'a Plan),
    CostShares(&'a CostShares),
    LinkedPlanService(&'a LinkedPlanService),
    LinkedService(&'a LinkedService),
}

/// One node of the ownership tree
#[derive(Debug, Clone, Copy)]
pub struct EntityNode<'a> {
    pub kind: EntityKind,
    pub id: &'a ObjectId,
    /// Immediate owner; `None` for the root
    pub parent: Option<&'a ObjectId>,
    pub body: EntityBody<'a>,
}

impl EntityNode<'_> {
    /// Diagnostic label used in serialization errors, e.g. `linkedService S1`
    pub fn label(&self) -> String {
        format!("{} {}", self.kind.relation(), self.id)
    }
}

impl Plan {
    /// Walk the aggregate depth-first, root first.
    ///
    /// Order: plan, planCostShares, then for each linked plan service the
    /// service itself, its linkedService and its planserviceCostShares.
    pub fn entities(&self) -> Vec<EntityNode<'_>> {
        let mut nodes = Vec::with_capacity(2 + self.linked_plan_services.len() * 3);
        nodes.push(EntityNode {
            kind: EntityKind::Plan,
            id: &self.object_id,
            parent: None,
            body: EntityBody::Plan(self),
        });

        if let Some(shares) = &self.plan_cost_shares {
            nodes.push(EntityNode {
                kind: EntityKind::PlanCostShares,
                id: &shares.object_id,
                parent: Some(&self.object_id),
                body: EntityBody::CostShares(shares),
            });
        }

        for service in &self.linked_plan_services {
            nodes.push(EntityNode {
                kind: EntityKind::LinkedPlanService,
                id: &service.object_id,
                parent: Some(&self.object_id),
                body: EntityBody::LinkedPlanService(service),
            });
            nodes.push(EntityNode {
                kind: EntityKind::LinkedService,
                id: &service.linked_service.object_id,
                parent: Some(&service.object_id),
                body: EntityBody::LinkedService(&service.linked_service),
            });
            nodes.push(EntityNode {
                kind: EntityKind::PlanServiceCostShares,
                id: &service.plan_service_cost_shares.object_id,
                parent: Some(&service.object_id),
                body: EntityBody::CostShares(&service.plan_service_cost_shares),
            });
        }

        nodes
    }
}
