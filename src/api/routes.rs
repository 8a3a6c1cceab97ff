//! API Routes
//!
//! Configures the Axum router with all endpoints.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::guard::{route_guard, RouteTable};
use super::handlers::*;

/// Creates the main router guarded by the default route table.
pub fn create_router(state: AppState) -> Router {
    create_router_with_table(state, RouteTable::api_default())
}

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - Route guard: cookie-based access control per `table`
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router_with_table(state: AppState, table: RouteTable) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/documents/:collection", post(create_document_handler))
        .route(
            "/documents/:collection/:id",
            get(get_document_handler)
                .patch(update_document_handler)
                .delete(delete_document_handler),
        )
        .route("/query/:collection", post(query_documents_handler))
        .route("/batch", post(batch_handler))
        .route("/cache", delete(clear_cache_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/:collection", delete(invalidate_collection_handler))
        .route("/selection", get(selection_handler))
        .route("/selection/project", put(select_project_handler))
        .route("/selection/requirement", put(select_requirement_handler))
        .route("/analysis", post(start_analysis_handler))
        .route(
            "/analysis/:id",
            get(analysis_status_handler).delete(cancel_analysis_handler),
        )
        .route(
            "/errors/last",
            get(last_error_handler).delete(clear_error_handler),
        )
        .layer(from_fn_with_state(Arc::new(table), route_guard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
