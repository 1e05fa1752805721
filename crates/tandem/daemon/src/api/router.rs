//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, true, 16 * 1024 * 1024)
}

/// Create the router with explicit middleware settings
pub fn create_router_with(state: AppState, enable_cors: bool, max_body_size: usize) -> Router {
    let api_routes = Router::new()
        // System
        .route("/health", get(handlers::health_check))
        // Identities
        .route("/identities", post(handlers::register_identity))
        .route(
            "/identities/:user_id/endpoint",
            get(handlers::resolve_identity),
        )
        // Protocols
        .route("/protocols", post(handlers::declare_protocol))
        // Tasks
        .route("/tasks", post(handlers::run_task))
        .route("/tasks/:task_id", get(handlers::get_task))
        .route("/tasks/:task_id/wait", post(handlers::wait_task))
        .route("/tasks/:task_id/status", post(handlers::report_status))
        .route("/tasks/:task_id/heartbeat", post(handlers::heartbeat))
        .route("/tasks/:task_id/entries", get(handlers::list_entries))
        // Assignments
        .route("/assignments/next", get(handlers::claim_assignment))
        // Entries
        .route(
            "/entries/:key",
            get(handlers::read_entry).put(handlers::write_entry),
        );

    // Build router with middleware
    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
