//! Cluster membership endpoints.
//!
//! Peers call these during bootstrap and the monitor probes `leader_id`,
//! so every route is signed like the admin API.

use axum::{
    Json,
    extract::{Path, State},
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::CLUSTER_TAG;
use crate::error::{AppError, AppResult};
use crate::models::Node;
use crate::services::NodeDetail;
use crate::state::AppState;

pub fn cluster_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(leader_id))
        .routes(routes!(join))
        .routes(routes!(remove))
        .routes(routes!(nodes))
}

fn require_leader(state: &AppState) -> AppResult<()> {
    if state.role.is_leader() {
        return Ok(());
    }
    let leader = state.services.nodes.leader_id();
    Err(AppError::cluster(if leader.is_empty() {
        "membership changes need a leader and none is known".to_string()
    } else {
        format!("membership changes go through leader '{}'", leader)
    }))
}

/// GET /cluster/leader_id - Name of the current leader, empty when unknown
#[utoipa::path(
    get,
    path = "/leader_id",
    tag = CLUSTER_TAG,
    responses(
        (status = 200, description = "Leader name as plain text", body = String, content_type = "text/plain")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn leader_id(State(state): State<AppState>) -> String {
    state.services.nodes.leader_id()
}

/// GET /cluster/join/{name}/{http_addr}/{tcp_addr} - Admit a node as voter
#[utoipa::path(
    get,
    path = "/join/{name}/{http_addr}/{tcp_addr}",
    tag = CLUSTER_TAG,
    params(
        ("name" = String, Path, description = "Node name"),
        ("http_addr" = String, Path, description = "HTTP API address, host:port"),
        ("tcp_addr" = String, Path, description = "Consensus transport address, host:port")
    ),
    responses(
        (status = 200, description = "Node registered and added as voter", body = Node),
        (status = 503, description = "This node is not the leader")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn join(
    State(state): State<AppState>,
    Path((name, http_addr, tcp_addr)): Path<(String, String, String)>,
) -> AppResult<Json<Node>> {
    require_leader(&state)?;
    let node = state.services.nodes.join(&name, &http_addr, &tcp_addr).await?;
    Ok(Json(node))
}

/// GET /cluster/remove/{name} - Drop a member from the raft group
#[utoipa::path(
    get,
    path = "/remove/{name}",
    tag = CLUSTER_TAG,
    params(
        ("name" = String, Path, description = "Node name")
    ),
    responses(
        (status = 200, description = "Member removed"),
        (status = 503, description = "This node is not the leader")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn remove(State(state): State<AppState>, Path(name): Path<String>) -> AppResult<()> {
    require_leader(&state)?;
    state.services.nodes.remove(&name).await
}

/// GET /cluster/nodes - Raft members with their registry records
#[utoipa::path(
    get,
    path = "/nodes",
    tag = CLUSTER_TAG,
    responses(
        (status = 200, description = "Cluster members", body = Vec<NodeDetail>)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn nodes(State(state): State<AppState>) -> AppResult<Json<Vec<NodeDetail>>> {
    Ok(Json(state.services.nodes.details()?))
}
