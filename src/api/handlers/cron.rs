//! Cron expression helpers.

use axum::{Json, extract::State};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::CRON_TAG;
use crate::api::dto::{CronQuery, CronValidation};
use crate::error::AppResult;
use crate::state::AppState;
use crate::utils::validate::ValidatedQuery;

/// How many upcoming fire times a validation returns.
const PREVIEW_COUNT: usize = 5;

pub fn cron_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(validate_cron))
}

/// GET /api/cron/validate - Check an expression and preview its next fires
#[utoipa::path(
    get,
    path = "/validate",
    tag = CRON_TAG,
    params(CronQuery),
    responses(
        (status = 200, description = "Validity and the next five fire times", body = CronValidation)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn validate_cron(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<CronQuery>,
) -> AppResult<Json<CronValidation>> {
    let jobs = &state.services.jobs;
    if !jobs.validate_cron(&query.cron) {
        return Ok(Json(CronValidation::invalid()));
    }
    let times = jobs.next_fire_times(&query.cron, PREVIEW_COUNT)?;
    Ok(Json(CronValidation::from_secs(times)))
}
