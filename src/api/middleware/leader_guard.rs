//! Refuses writes on a cluster follower.
//!
//! Reads are served by any node from its replicated copy. A mutating method
//! reaching a follower gets 503 naming the leader the caller should use.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::state::AppState;

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

pub async fn leader_guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if is_read(request.method()) || state.role.is_standalone_or_leader() {
        return next.run(request).await;
    }

    let leader = state.services.nodes.leader_id();
    let message = if leader.is_empty() {
        "this node is a follower and no leader is known".to_string()
    } else {
        format!("this node is a follower, send writes to leader '{}'", leader)
    };
    tracing::debug!(method = %request.method(), uri = %request.uri(), %leader, "write refused on follower");
    AppError::cluster(message).into_response()
}
