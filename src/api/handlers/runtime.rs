use axum::{Json, extract::State};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::RUNTIME_TAG;
use crate::error::AppResult;
use crate::services::RuntimeStats;
use crate::state::AppState;

pub fn runtime_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(runtime_stats))
}

/// GET /api/runtime - Counts of jobs, executors, nodes and datasources
#[utoipa::path(
    get,
    path = "/",
    tag = RUNTIME_TAG,
    responses(
        (status = 200, description = "Runtime overview", body = RuntimeStats)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn runtime_stats(State(state): State<AppState>) -> AppResult<Json<RuntimeStats>> {
    Ok(Json(state.services.runtime.stats().await?))
}
