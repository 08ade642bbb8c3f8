//! Execution history handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::TRACE_TAG;
use crate::api::dto::{CleanResponse, PagedResponse, TraceFilter};
use crate::error::{AppError, AppResult};
use crate::models::{CleanScope, Trace, TraceStatistic};
use crate::repositories::DataSourceHealth;
use crate::state::AppState;
use crate::utils::time::now_secs;
use crate::utils::validate::ValidatedQuery;

/// Statistics cover this many trailing days.
const STATISTICS_WINDOW_DAYS: i64 = 7;

pub fn trace_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_traces))
        .routes(routes!(trace_statistics))
        .routes(routes!(clean_traces))
        .routes(routes!(get_trace))
}

pub fn datasource_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(datasource_health))
}

/// GET /api/traces - Page through history, newest first
#[utoipa::path(
    get,
    path = "/",
    tag = TRACE_TAG,
    params(TraceFilter),
    responses(
        (status = 200, description = "One page of traces", body = PagedResponse<Trace>)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn list_traces(
    State(state): State<AppState>,
    ValidatedQuery(filter): ValidatedQuery<TraceFilter>,
) -> AppResult<Json<PagedResponse<Trace>>> {
    let page = state.services.traces.page(&filter.to_query()).await?;
    Ok(Json(PagedResponse::new(
        page.items,
        filter.page,
        filter.page_size,
        page.total.max(0) as u64,
    )))
}

/// GET /api/traces/{id} - Get one trace
#[utoipa::path(
    get,
    path = "/{id}",
    tag = TRACE_TAG,
    params(
        ("id" = i64, Path, description = "Trace ID")
    ),
    responses(
        (status = 200, description = "Trace found", body = Trace),
        (status = 404, description = "Trace not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn get_trace(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Trace>> {
    state
        .services
        .traces
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("trace", "id", id))
}

/// GET /api/traces/statistics - Jobs with the worst failure rate this week
#[utoipa::path(
    get,
    path = "/statistics",
    tag = TRACE_TAG,
    responses(
        (status = 200, description = "Top 20 jobs by failure rate", body = Vec<TraceStatistic>)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn trace_statistics(State(state): State<AppState>) -> AppResult<Json<Vec<TraceStatistic>>> {
    let since = now_secs() - STATISTICS_WINDOW_DAYS * 86_400;
    Ok(Json(state.services.traces.statistics(since).await?))
}

/// DELETE /api/traces/clean/{scope} - Delete history older than the scope
#[utoipa::path(
    delete,
    path = "/clean/{scope}",
    tag = TRACE_TAG,
    params(
        ("scope" = CleanScope, Path, description = "all, week_ago, month_ago, two_months_ago, three_months_ago, six_months_ago or year_ago")
    ),
    responses(
        (status = 200, description = "Rows deleted", body = CleanResponse)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn clean_traces(
    State(state): State<AppState>,
    Path(scope): Path<CleanScope>,
) -> AppResult<Json<CleanResponse>> {
    let deleted = state.services.traces.clean(scope, now_secs()).await?;
    tracing::info!(?scope, deleted, "trace history cleaned");
    Ok(Json(CleanResponse { deleted }))
}

/// GET /api/datasources - Reachability of every history database
#[utoipa::path(
    get,
    path = "/",
    tag = TRACE_TAG,
    responses(
        (status = 200, description = "Datasource health", body = Vec<DataSourceHealth>)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn datasource_health(State(state): State<AppState>) -> Json<Vec<DataSourceHealth>> {
    Json(state.services.traces.ping_all().await)
}
