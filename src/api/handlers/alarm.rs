//! Replicated alarm settings.

use axum::{Json, extract::State};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::ALARM_TAG;
use crate::error::{AppError, AppResult};
use crate::models::AlarmConfig;
use crate::state::AppState;

pub fn alarm_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(get_alarm, update_alarm))
}

/// GET /api/alarm - Current alarm config
#[utoipa::path(
    get,
    path = "/",
    tag = ALARM_TAG,
    responses(
        (status = 200, description = "Alarm config", body = AlarmConfig)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn get_alarm(State(state): State<AppState>) -> AppResult<Json<AlarmConfig>> {
    Ok(Json(state.services.alarm.get()?))
}

/// PUT /api/alarm - Replace the alarm config
///
/// An empty `sys_alarm_email` turns system alarms off; an empty
/// `webhook_url` falls back to the configured alert webhook.
#[utoipa::path(
    put,
    path = "/",
    tag = ALARM_TAG,
    request_body = AlarmConfig,
    responses(
        (status = 200, description = "Alarm config saved", body = AlarmConfig),
        (status = 400, description = "Webhook is not an http(s) URL")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn update_alarm(
    State(state): State<AppState>,
    Json(config): Json<AlarmConfig>,
) -> AppResult<Json<AlarmConfig>> {
    if !config.webhook_url.is_empty()
        && !(config.webhook_url.starts_with("http://") || config.webhook_url.starts_with("https://"))
    {
        return Err(AppError::Validation {
            field: "webhook_url".to_string(),
            reason: "webhook_url must start with http:// or https://".to_string(),
        });
    }
    Ok(Json(state.services.alarm.update(config).await?))
}
