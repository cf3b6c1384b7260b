//! Plan aggregate models
//!
//! The wire/storage shape of the Plan aggregate and its owned entities, plus
//! the sparse `PlanPatch` shape accepted by merge-patch.

use super::error::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Suffix of the side-key holding an entity's ETag.
pub const ETAG_KEY_SUFFIX: &str = ":etag";

/// Globally unique entity identifier (flat key space shared by all entity kinds)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Storage key of the entity itself
    pub fn key(&self) -> String {
        self.0.clone()
    }

    /// Whether this id has the shape of an ETag side-key. Such ids would share
    /// a storage key with another entity's ETag.
    pub fn is_etag_key(&self) -> bool {
        self.0.ends_with(ETAG_KEY_SUFFIX)
    }

    /// Storage key of the entity's ETag
    pub fn etag_key(&self) -> String {
        format!("{}{}", self.0, ETAG_KEY_SUFFIX)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Root aggregate
///
/// Field order is the serialization order and must stay stable: the ETag is a
/// hash of the serialized bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub object_id: ObjectId,
    #[serde(default)]
    pub object_type: String,
    #[serde(rename = "_org", default)]
    pub org: String,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_cost_shares: Option<CostShares>,
    #[serde(default)]
    pub linked_plan_services: Vec<LinkedPlanService>,
}

/// Cost shares, used both as `planCostShares` and `planserviceCostShares`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostShares {
    #[serde(default)]
    pub object_id: ObjectId,
    #[serde(default)]
    pub object_type: String,
    #[serde(rename = "_org", default)]
    pub org: String,
    #[serde(default)]
    pub deductible: u64,
    #[serde(default)]
    pub copay: u64,
}

/// A service linked into a plan together with its own cost shares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPlanService {
    #[serde(default)]
    pub object_id: ObjectId,
    #[serde(default)]
    pub object_type: String,
    #[serde(rename = "_org", default)]
    pub org: String,
    #[serde(default)]
    pub linked_service: LinkedService,
    #[serde(rename = "planserviceCostShares", default)]
    pub plan_service_cost_shares: CostShares,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedService {
    #[serde(default)]
    pub object_id: ObjectId,
    #[serde(default)]
    pub object_type: String,
    #[serde(rename = "_org", default)]
    pub org: String,
    #[serde(default)]
    pub name: String,
}

impl Plan {
    /// Validate a full aggregate before it is stored.
    ///
    /// Reports the first offending field path.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.object_id.is_empty() {
            return Err(PlanError::validation("objectId", "ObjectId is required"));
        }
        match &self.plan_cost_shares {
            Some(shares) if !shares.object_id.is_empty() => {}
            _ => {
                return Err(PlanError::validation(
                    "planCostShares.objectId",
                    "PlanCostShares and its ObjectId are required",
                ))
            }
        }
        if self.linked_plan_services.is_empty() {
            return Err(PlanError::validation(
                "linkedPlanServices",
                "At least one LinkedPlanService is required",
            ));
        }
        for (i, service) in self.linked_plan_services.iter().enumerate() {
            service.validate(&format!("linkedPlanServices[{}]", i))?;
        }

        let mut seen = HashSet::new();
        for id in self.entity_ids() {
            if id.is_etag_key() {
                return Err(PlanError::validation(
                    "objectId",
                    format!("objectId {} collides with an ETag key", id),
                ));
            }
            if !seen.insert(id) {
                return Err(PlanError::validation(
                    "objectId",
                    format!("duplicate objectId {} inside plan", id),
                ));
            }
        }
        Ok(())
    }

    /// Every entity id owned by this aggregate, root first
    pub fn entity_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.entities().into_iter().map(|node| node.id)
    }
}

impl LinkedPlanService {
    /// Validate a single linked plan service, reporting paths under `path`
    pub fn validate(&self, path: &str) -> Result<(), PlanError> {
        if self.object_id.is_empty() {
            return Err(PlanError::validation(
                format!("{}.objectId", path),
                "LinkedPlanService ObjectId is required",
            ));
        }
        if self.linked_service.object_id.is_empty() {
            return Err(PlanError::validation(
                format!("{}.linkedService.objectId", path),
                "LinkedService ObjectId is required",
            ));
        }
        if self.plan_service_cost_shares.object_id.is_empty() {
            return Err(PlanError::validation(
                format!("{}.planserviceCostShares.objectId", path),
                "PlanServiceCostShares ObjectId is required",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Patch shapes
// ============================================================================

/// Sparse update body for merge-patch.
///
/// Absent (or empty string) fields mean "do not change". Numeric fields track
/// presence explicitly, so an explicit `0` is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatch {
    #[serde(default)]
    pub object_id: Option<ObjectId>,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(rename = "_org", default)]
    pub org: Option<String>,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub plan_cost_shares: Option<CostSharesPatch>,
    #[serde(default)]
    pub linked_plan_services: Option<Vec<LinkedPlanService>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSharesPatch {
    #[serde(default)]
    pub object_id: Option<ObjectId>,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(rename = "_org", default)]
    pub org: Option<String>,
    #[serde(default)]
    pub deductible: Option<u64>,
    #[serde(default)]
    pub copay: Option<u64>,
}
