//! Console account handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::USER_TAG;
use crate::api::dto::{CreateUserRequest, LoginRequest, UpdateUserRequest, UserResponse};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::validate::ValidatedJson;

/// Creates user-related routes.
///
/// Routes:
/// - GET /        - List all users
/// - POST /       - Create a new user
/// - GET /{id}    - Get user by ID
/// - PUT /{id}    - Update password and/or email
/// - DELETE /{id} - Delete user by ID
pub fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_users, create_user))
        .routes(routes!(get_user, update_user, delete_user))
}

/// Credential check, served by any node.
pub fn login_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(login))
}

/// GET /api/users - List all users
#[utoipa::path(
    get,
    path = "/",
    tag = USER_TAG,
    responses(
        (status = 200, description = "All users", body = Vec<UserResponse>)
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.services.users.list_users()?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/users/{id} - Get user by ID
#[utoipa::path(
    get,
    path = "/{id}",
    tag = USER_TAG,
    params(
        ("id" = u64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> AppResult<Json<UserResponse>> {
    let user = state.services.users.get_user(id)?;
    Ok(Json(UserResponse::from(user)))
}

/// POST /api/users - Create new user
#[utoipa::path(
    post,
    path = "/",
    tag = USER_TAG,
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Name already taken")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state.services.users.insert_user(payload.into_new_user()).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// PUT /api/users/{id} - Update user
#[utoipa::path(
    put,
    path = "/{id}",
    tag = USER_TAG,
    params(
        ("id" = u64, Path, description = "User ID")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .services
        .users
        .update_user(id, payload.into_changes())
        .await?;
    Ok(Json(UserResponse::from(user)))
}

/// DELETE /api/users/{id} - Delete user
///
/// The built-in admin account is refused with 400.
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = USER_TAG,
    params(
        ("id" = u64, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "The admin account cannot be deleted"),
        (status = 404, description = "User not found")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn delete_user(State(state): State<AppState>, Path(id): Path<u64>) -> AppResult<StatusCode> {
    state.services.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/login - Check a console user's credentials
#[utoipa::path(
    post,
    path = "/",
    tag = USER_TAG,
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Credentials accepted"),
        (status = 401, description = "Unknown user or wrong password")
    ),
    security(("timestamp" = [], "signature" = []))
)]
async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<StatusCode> {
    if state
        .services
        .users
        .verify_credentials(&payload.name, &payload.password)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        tracing::info!(user = %payload.name, "login rejected");
        Err(AppError::Unauthorized {
            message: "invalid username or password".to_string(),
        })
    }
}
