//! Health check endpoint handlers.
//!
//! Unsigned, for load balancers and orchestrators. The overall status is
//! unhealthy when no history datasource answers and degraded when some do
//! not, or when a cluster node knows no leader.

use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::HEALTH_TAG;
use crate::api::dto::{ComponentHealth, HealthResponse, HealthStatus};
use crate::repositories::DataSourceHealth;
use crate::state::AppState;

/// Creates health check routes.
///
/// # Routes
/// - `GET /health` - Component health
/// - `GET /health/live` - Liveness probe
pub fn health_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(health_check))
        .routes(routes!(liveness_check))
}

/// Basic health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    ),
    tag = HEALTH_TAG
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();

    let sources = state.services.traces.ping_all().await;
    let datasource_status = datasource_status(&sources);
    for source in sources {
        checks.insert(
            format!("history:{}", source.name),
            ComponentHealth {
                status: if source.usable {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy
                },
                message: Some(if source.usable { "Reachable" } else { "Unreachable" }.to_string()),
            },
        );
    }

    let mut status = datasource_status;
    let role = if state.role.is_cluster() {
        let leader = state.services.nodes.leader_id();
        let leader_health = if leader.is_empty() {
            ComponentHealth {
                status: HealthStatus::Degraded,
                message: Some("No leader known".to_string()),
            }
        } else {
            ComponentHealth {
                status: HealthStatus::Healthy,
                message: Some(format!("Leader is {}", leader)),
            }
        };
        if leader_health.status == HealthStatus::Degraded && status == HealthStatus::Healthy {
            status = HealthStatus::Degraded;
        }
        checks.insert("cluster".to_string(), leader_health);
        if state.role.is_leader() { "leader" } else { "follower" }
    } else {
        "standalone"
    };

    let response = HealthResponse {
        status,
        version: crate::pkg_version().to_string(),
        node: state.node_name.clone(),
        role: role.to_string(),
        timestamp: jiff::Timestamp::now().to_string(),
        checks,
    };
    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (code, Json(response))
}

fn datasource_status(sources: &[DataSourceHealth]) -> HealthStatus {
    let usable = sources.iter().filter(|s| s.usable).count();
    if usable == 0 {
        HealthStatus::Unhealthy
    } else if usable < sources.len() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Liveness probe endpoint.
#[utoipa::path(
    get,
    path = "/health/live",
    responses(
        (status = 200, description = "Service is alive")
    ),
    tag = HEALTH_TAG
)]
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
