//! Merge-patch engine
//!
//! Overlays a sparse `PlanPatch` onto a full existing aggregate. Absent or
//! empty values never clear anything: there is no tombstone.

use super::error::PlanError;
use super::models::*;
use std::collections::HashMap;

/// Compute the next aggregate state from `existing` and `patch`.
///
/// Pure: the caller is responsible for validating, re-hashing and storing the
/// result.
pub fn merge_patch(existing: &Plan, patch: PlanPatch) -> Result<Plan, PlanError> {
    let mut merged = existing.clone();

    if let Some(id) = patch.object_id.filter(|id| !id.is_empty()) {
        if id != existing.object_id {
            return Err(PlanError::IdentityMismatch {
                entity: "plan",
                expected: existing.object_id.to_string(),
                actual: id.to_string(),
            });
        }
    }

    overwrite_if_present(&mut merged.creation_date, patch.creation_date);
    overwrite_if_present(&mut merged.object_type, patch.object_type);
    overwrite_if_present(&mut merged.org, patch.org);

    if let Some(shares_patch) = patch.plan_cost_shares {
        merged.plan_cost_shares = Some(match merged.plan_cost_shares.take() {
            Some(current) => merge_cost_shares(current, shares_patch)?,
            None => adopt_cost_shares(shares_patch)?,
        });
    }

    if let Some(services) = patch.linked_plan_services {
        reconcile_services(&mut merged.linked_plan_services, services);
    }

    Ok(merged)
}

fn overwrite_if_present(target: &mut String, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *target = v;
    }
}

fn merge_cost_shares(
    mut current: CostShares,
    patch: CostSharesPatch,
) -> Result<CostShares, PlanError> {
    let patch_id = patch.object_id.unwrap_or_default();
    if patch_id != current.object_id {
        return Err(PlanError::IdentityMismatch {
            entity: "planCostShares",
            expected: current.object_id.to_string(),
            actual: patch_id.to_string(),
        });
    }

    overwrite_if_present(&mut current.object_type, patch.object_type);
    overwrite_if_present(&mut current.org, patch.org);
    if let Some(deductible) = patch.deductible {
        current.deductible = deductible;
    }
    if let Some(copay) = patch.copay {
        current.copay = copay;
    }
    Ok(current)
}

fn adopt_cost_shares(patch: CostSharesPatch) -> Result<CostShares, PlanError> {
    let object_id = patch
        .object_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            PlanError::validation("planCostShares.objectId", "PlanCostShares ObjectId is required")
        })?;
    Ok(CostShares {
        object_id,
        object_type: patch.object_type.unwrap_or_default(),
        org: patch.org.unwrap_or_default(),
        deductible: patch.deductible.unwrap_or_default(),
        copay: patch.copay.unwrap_or_default(),
    })
}

/// Replace matching entries wholesale, append unknown ones in patch order.
///
/// Existing entries absent from the patch are left alone; nothing is removed.
fn reconcile_services(existing: &mut Vec<LinkedPlanService>, patch: Vec<LinkedPlanService>) {
    let mut order: Vec<ObjectId> = Vec::with_capacity(patch.len());
    let mut pending: HashMap<ObjectId, LinkedPlanService> = HashMap::with_capacity(patch.len());
    for service in patch {
        if !pending.contains_key(&service.object_id) {
            order.push(service.object_id.clone());
        }
        pending.insert(service.object_id.clone(), service);
    }

    for slot in existing.iter_mut() {
        if let Some(replacement) = pending.remove(&slot.object_id) {
            *slot = replacement;
        }
    }

    for id in order {
        if let Some(service) = pending.remove(&id) {
            existing.push(service);
        }
    }
}
