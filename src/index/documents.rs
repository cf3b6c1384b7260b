//! Join-document decomposition
//!
//! A plan becomes one search document per entity. Every document carries a
//! `plan_join` field naming its relation and parent, and every child carries a
//! routing value so a join family lands on one shard.

use super::IndexWriteError;
use crate::plan::models::Plan;
use crate::plan::tree::EntityKind;
use serde_json::{json, Map, Value};

/// Name of the join field in every document
pub const JOIN_FIELD: &str = "plan_join";

/// A document to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub relation: &'static str,
    /// `None` for the root `plan` document
    pub routing: Option<String>,
    pub body: Value,
}

impl IndexDocument {
    /// `relation:id`, used in logs and errors
    pub fn label(&self) -> String {
        format!("{}:{}", self.relation, self.id)
    }
}

/// A document to remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub id: String,
    pub relation: &'static str,
    pub routing: Option<String>,
}

impl DeleteTarget {
    pub fn label(&self) -> String {
        format!("{}:{}", self.relation, self.id)
    }
}

/// Decompose a plan into its join documents, root first.
///
/// Children of the plan route by the plan id; `linkedService` and
/// `planserviceCostShares` route by their `linkedPlanServices` parent, which
/// is what the join field's parent points at.
pub fn decompose(plan: &Plan) -> Result<Vec<IndexDocument>, IndexWriteError> {
    plan.entities()
        .into_iter()
        .map(|node| {
            let relation = node.kind.relation();
            let label = format!("{}:{}", relation, node.id);
            let mut body = match serde_json::to_value(node.body) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(source) => return Err(IndexWriteError::Encode { doc: label, source }),
            };

            let mut join = Map::new();
            join.insert("name".into(), Value::from(relation));
            if let Some(parent) = node.parent {
                join.insert("parent".into(), Value::from(parent.as_str()));
            }
            body.insert(JOIN_FIELD.into(), Value::Object(join));

            Ok(IndexDocument {
                id: node.id.to_string(),
                relation,
                routing: routing_for(node.kind, node.parent.map(|p| p.as_str())),
                body: Value::Object(body),
            })
        })
        .collect()
}

/// Every document id owned by `plan`, root first.
///
/// With `routed = false` no routing is sent, so documents whose routing
/// differs from their own id may not be found on delete.
pub fn delete_targets(plan: &Plan, routed: bool) -> Vec<DeleteTarget> {
    plan.entities()
        .into_iter()
        .map(|node| DeleteTarget {
            id: node.id.to_string(),
            relation: node.kind.relation(),
            routing: if routed {
                routing_for(node.kind, node.parent.map(|p| p.as_str()))
            } else {
                None
            },
        })
        .collect()
}

fn routing_for(kind: EntityKind, parent: Option<&str>) -> Option<String> {
    match kind {
        EntityKind::Plan => None,
        _ => parent.map(str::to_string),
    }
}

/// Index mapping: the join relations plus field types per entity kind
pub fn index_mapping() -> Value {
    let identity = json!({
        "_org": { "type": "text" },
        "objectId": { "type": "keyword" },
        "objectType": { "type": "text" }
    });
    let with = |extra: Value| {
        let mut props = identity.clone();
        if let (Some(props), Value::Object(extra)) = (props.as_object_mut(), extra) {
            props.extend(extra);
        }
        json!({ "properties": props })
    };
    let amounts = json!({
        "copay": { "type": "long" },
        "deductible": { "type": "long" }
    });

    json!({
        "properties": {
            "plan": with(json!({
                "creationDate": { "type": "date", "format": "MM-dd-yyyy" }
            })),
            "planCostShares": with(amounts.clone()),
            "linkedPlanServices": with(json!({})),
            "linkedService": with(json!({ "name": { "type": "text" } })),
            "planserviceCostShares": with(amounts),
            JOIN_FIELD: {
                "type": "join",
                "eager_global_ordinals": true,
                "relations": {
                    "plan": ["planCostShares", "linkedPlanServices"],
                    "linkedPlanServices": ["linkedService", "planserviceCostShares"]
                }
            }
        }
    })
}
