//! API Router configuration

use super::handlers;
use crate::config::ServerConfig;
use crate::state::ServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn build_router(state: ServiceState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Contracts
        .route("/contracts", post(handlers::create_contract))
        .route("/contracts/:document_id", get(handlers::get_contract))
        .route(
            "/contracts/:document_id/signatures",
            get(handlers::list_signatures),
        )
        // Signing
        .route(
            "/contracts/:document_id/sign/customer",
            post(handlers::sign_customer),
        )
        .route(
            "/contracts/:document_id/sign/company",
            post(handlers::sign_company),
        )
        .route(
            "/contracts/:document_id/finalize",
            post(handlers::finalize_contract),
        );

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    if server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
