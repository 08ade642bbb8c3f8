//! Job scheduling request handlers.

use crate::api::doc::JOB_TAG;
use crate::api::dto::{JobRequest, JobStatusRequest, JobView};
use crate::error::AppResult;
use crate::models::Job;
use crate::state::AppState;
use crate::utils::validate::ValidatedJson;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

/// Creates job-related routes.
pub fn job_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_jobs, create_job))
        .routes(routes!(get_job, update_job, delete_job))
        .routes(routes!(update_job_status))
        .routes(routes!(launch_job))
}

async fn view(state: &AppState, job: Job) -> JobView {
    let jobs = &state.services.jobs;
    let triggered = jobs.get_triggered(job.id).ok();
    let next_fire_time = jobs.next_fire_time(job.id).await;
    JobView {
        job,
        triggered,
        next_fire_time,
    }
}

/// GET /api/jobs - List all jobs
#[utoipa::path(
    get,
    path = "/",
    tag = JOB_TAG,
    responses(
        (status = 200, description = "All jobs", body = Vec<Job>)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn list_jobs(State(state): State<AppState>) -> AppResult<Json<Vec<Job>>> {
    Ok(Json(state.services.jobs.list_jobs()?))
}

/// POST /api/jobs - Create a job and start its timer
#[utoipa::path(
    post,
    path = "/",
    tag = JOB_TAG,
    request_body = JobRequest,
    responses(
        (status = 201, description = "Job created", body = JobView),
        (status = 400, description = "Invalid request or cron expression"),
        (status = 503, description = "Not the leader")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn create_job(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<JobRequest>,
) -> AppResult<(StatusCode, Json<JobView>)> {
    let job = state.services.jobs.insert_job(req.into_job(0)).await?;
    Ok((StatusCode::CREATED, Json(view(&state, job).await)))
}

/// GET /api/jobs/{id} - Get a job with its schedule cursor
#[utoipa::path(
    get,
    path = "/{id}",
    tag = JOB_TAG,
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job found", body = JobView),
        (status = 404, description = "Job not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn get_job(State(state): State<AppState>, Path(id): Path<u64>) -> AppResult<Json<JobView>> {
    let job = state.services.jobs.get_job(id)?;
    Ok(Json(view(&state, job).await))
}

/// PUT /api/jobs/{id} - Replace a job's definition
#[utoipa::path(
    put,
    path = "/{id}",
    tag = JOB_TAG,
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    request_body = JobRequest,
    responses(
        (status = 200, description = "Job updated", body = JobView),
        (status = 404, description = "Job not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ValidatedJson(req): ValidatedJson<JobRequest>,
) -> AppResult<Json<JobView>> {
    let job = state.services.jobs.update_job(req.into_job(id)).await?;
    Ok(Json(view(&state, job).await))
}

/// DELETE /api/jobs/{id} - Delete a job and its cursor
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = JOB_TAG,
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn delete_job(State(state): State<AppState>, Path(id): Path<u64>) -> AppResult<StatusCode> {
    state.services.jobs.delete_job(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/jobs/{id}/status - Pause or resume a job
#[utoipa::path(
    put,
    path = "/{id}/status",
    tag = JOB_TAG,
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    request_body = JobStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = JobView),
        (status = 404, description = "Job not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn update_job_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<JobStatusRequest>,
) -> AppResult<Json<JobView>> {
    let job = state.services.jobs.update_job_status(id, req.status).await?;
    Ok(Json(view(&state, job).await))
}

/// POST /api/jobs/{id}/launch - Fire a job once now
#[utoipa::path(
    post,
    path = "/{id}/launch",
    tag = JOB_TAG,
    params(
        ("id" = u64, Path, description = "Job ID")
    ),
    responses(
        (status = 202, description = "Firing started"),
        (status = 404, description = "Job not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn launch_job(State(state): State<AppState>, Path(id): Path<u64>) -> AppResult<StatusCode> {
    state.services.jobs.launch_job(id).await?;
    Ok(StatusCode::ACCEPTED)
}
