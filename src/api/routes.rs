//! API route definitions

use super::handlers::{self, PlanState};
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: PlanState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::header::ETAG]);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Plans
        // ====================================================================
        .route(
            "/api/v1/plans",
            get(handlers::list_plans).post(handlers::create_plan),
        )
        .route(
            "/api/v1/plans/{plan_id}",
            get(handlers::get_plan)
                .patch(handlers::patch_plan)
                .delete(handlers::delete_plan),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
