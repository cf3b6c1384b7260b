//! Cascade delete planner

use super::models::Plan;
use std::collections::HashSet;

/// Every storage key owned by `plan`: each entity's own key followed by its
/// ETag key, in tree-walk order.
///
/// A plan with cost shares and N linked plan services yields `4 + 6 * N` keys.
pub fn owned_keys(plan: &Plan) -> Vec<String> {
    plan.entities()
        .into_iter()
        .flat_map(|node| [node.id.key(), node.id.etag_key()])
        .collect()
}

/// Keys owned by `before` that `after` no longer owns.
///
/// Used after a patch replaced a linked plan service whose nested ids changed.
pub fn orphaned_keys(before: &Plan, after: &Plan) -> Vec<String> {
    let kept: HashSet<String> = owned_keys(after).into_iter().collect();
    owned_keys(before)
        .into_iter()
        .filter(|key| !kept.contains(key))
        .collect()
}
