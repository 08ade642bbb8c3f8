//! Router configuration for the API.
//!
//! Two listeners are built here: the public HTTP API and the internal raft
//! transport. Both verify request signatures.

use axum::{Router, extract::DefaultBodyLimit, middleware, routing::post};
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::doc::ApiDoc;
use crate::api::handlers;
use crate::api::middleware::{
    SignSecret, leader_guard_middleware, logging_middleware, request_id_middleware,
    signature_middleware,
};
use crate::cluster::raft::Raft;
use crate::cluster::raft::network::{APPEND_PATH, SNAPSHOT_PATH, VOTE_PATH};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// # Middleware Order
/// Middleware is applied in reverse order of declaration (last added runs first):
/// 1. Request ID middleware - generates/propagates request IDs
/// 2. Logging middleware - logs requests with request IDs
/// 3. Signature verification on `/api` and `/cluster`
/// 4. Leader guard on the resources that accept writes
///
/// # Routes
/// - `/api/jobs`, `/api/users`, `/api/alarm`, `/api/traces` - writes need the leader
/// - `/api/cron`, `/api/runtime`, `/api/datasources`, `/api/login` - any node
/// - `/cluster/*` - membership, signed by peers
/// - `/health`, `/health/live` - unsigned
/// - `/swagger-ui`, `/api-docs/openapi.json` - API documentation
pub fn create_router(state: AppState) -> Router {
    let secret = SignSecret::new(&state.sign_secret);

    let writable = OpenApiRouter::new()
        .nest("/api/jobs", handlers::jobs::job_routes())
        .nest("/api/users", handlers::users::user_routes())
        .nest("/api/alarm", handlers::alarm::alarm_routes())
        .nest("/api/traces", handlers::traces::trace_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            leader_guard_middleware,
        ));

    let signed = OpenApiRouter::new()
        .merge(writable)
        .nest("/api/cron", handlers::cron::cron_routes())
        .nest("/api/runtime", handlers::runtime::runtime_routes())
        .nest("/api/datasources", handlers::traces::datasource_routes())
        .nest("/api/login", handlers::users::login_routes())
        .nest("/cluster", handlers::cluster::cluster_routes())
        .layer(middleware::from_fn_with_state(secret, signature_middleware));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(signed)
        .merge(handlers::health::health_routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        // Middleware is applied in reverse order - last added runs first
        // So logging runs after request_id has set the ID
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Raft RPC endpoints served on the node's consensus transport address.
pub fn transport_router(raft: Raft, secret: String) -> Router {
    Router::new()
        .route(APPEND_PATH, post(handlers::raft::append))
        .route(VOTE_PATH, post(handlers::raft::vote))
        .route(SNAPSHOT_PATH, post(handlers::raft::snapshot))
        .layer(middleware::from_fn_with_state(
            SignSecret::new(secret),
            signature_middleware,
        ))
        // snapshots carry the whole replicated state
        .layer(DefaultBodyLimit::disable())
        .with_state(raft)
}
