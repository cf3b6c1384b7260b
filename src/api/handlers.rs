//! API request handlers
//!
//! Thin translation between HTTP and `PlanManager`: headers in, status codes
//! and ETag headers out.

use crate::plan::{ConditionalRead, ObjectId, Plan, PlanError, PlanManager, PlanPatch};
use crate::store::{ETag, KeyValueStore};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub plans: PlanManager,
    /// Primary store handle, for health reporting
    pub store: Arc<dyn KeyValueStore>,
}

pub type PlanState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// 200 + `"ok"` when the primary store answers, 503 + `"unhealthy"` otherwise.
pub async fn health(State(state): State<PlanState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = state.store.health_check().await.unwrap_or(false);
    let (status, label) = if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub message: String,
    pub object_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub message: String,
    pub deleted_keys: Vec<String>,
}

/// List every stored plan
pub async fn list_plans(State(state): State<PlanState>) -> Result<Json<Vec<Plan>>, AppError> {
    Ok(Json(state.plans.list_all().await?))
}

/// Create a plan: 201 with ETag, 409 if any of its ids exists
pub async fn create_plan(
    State(state): State<PlanState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let plan: Plan = parse_body(&body)?;
    let object_id = plan.object_id.to_string();
    let etag = state.plans.create(plan).await?;

    Ok((
        StatusCode::CREATED,
        [(header::ETAG, etag_header(&etag)?)],
        Json(CreatedResponse {
            message: "Plan created successfully".to_string(),
            object_id,
        }),
    ))
}

/// Get a plan: 200 with ETag, 304 when `If-None-Match` is current
pub async fn get_plan(
    State(state): State<PlanState>,
    Path(plan_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let if_none_match = header_str(&headers, header::IF_NONE_MATCH);
    match state
        .plans
        .get(&ObjectId::new(plan_id), if_none_match)
        .await?
    {
        ConditionalRead::Modified(stored) => Ok((
            [(header::ETAG, etag_header(&stored.etag)?)],
            Json(stored.plan),
        )
            .into_response()),
        ConditionalRead::NotModified => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            if let Some(tag) = if_none_match {
                response
                    .headers_mut()
                    .insert(header::ETAG, etag_header(&ETag::parse(tag))?);
            }
            Ok(response)
        }
    }
}

/// Merge-patch a plan: requires `If-Match`; 200 with the merged plan and its new ETag
pub async fn patch_plan(
    State(state): State<PlanState>,
    Path(plan_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let patch: PlanPatch = parse_body(&body)?;
    let if_match = header_str(&headers, header::IF_MATCH);
    let stored = state
        .plans
        .patch(&ObjectId::new(plan_id), patch, if_match)
        .await?;

    Ok((
        [(header::ETAG, etag_header(&stored.etag)?)],
        Json(stored.plan),
    ))
}

/// Cascade-delete a plan: 200 with every key removed
pub async fn delete_plan(
    State(state): State<PlanState>,
    Path(plan_id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted_keys = state.plans.delete(&ObjectId::new(plan_id)).await?;
    Ok(Json(DeletedResponse {
        message: "Plan deleted successfully".to_string(),
        deleted_keys,
    }))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn etag_header(etag: &ETag) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&etag.header_value())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid ETag header: {}", e)))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PreconditionRequired(String),
    PreconditionFailed(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PreconditionRequired(msg) => (StatusCode::PRECONDITION_REQUIRED, msg),
            AppError::PreconditionFailed(msg) => (StatusCode::PRECONDITION_FAILED, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let message = err.to_string();
        match err {
            PlanError::NotFound(_) => AppError::NotFound(message),
            PlanError::AlreadyExists(_) => AppError::Conflict(message),
            PlanError::IdentityMismatch { .. }
            | PlanError::ValidationFailed { .. }
            | PlanError::SerializationFailed { .. } => AppError::BadRequest(message),
            PlanError::PreconditionRequired => AppError::PreconditionRequired(message),
            PlanError::PreconditionFailed => AppError::PreconditionFailed(message),
            PlanError::StoreIo(e) => AppError::Internal(e),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
