use service_core::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        users::{
            ChangePasswordRequest, CreateUserRequest, ListUsersQuery, UpdateUserRequest,
            UserResponse,
        },
        ErrorResponse, MessageResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// List users, active ones by default
#[utoipa::path(
    get,
    path = "/api/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users", body = Vec<UserResponse>),
        (status = 403, description = "Missing admin:users", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.users.list_users(query).await?;
    Ok(Json(
        users.into_iter().map(UserResponse::from).collect::<Vec<_>>(),
    ))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.get_user(&id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Username already exists", body = ErrorResponse),
        (status = 422, description = "Validation failed", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.create_user(req).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Update a user's username, role claim or status
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "Subject id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Username already exists", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.update_user(&id, req).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Archive a user
#[utoipa::path(
    put,
    path = "/api/users/{id}/archive",
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "User archived", body = UserResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn archive_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.archive_user(&id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.users.delete_user(&id).await?;
    Ok(Json(MessageResponse::new("User deleted")))
}

/// Profile of the calling user
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Client token", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let subject = state.users.get_user(user.subject_id()?).await?;
    Ok(Json(UserResponse::from(subject)))
}

/// Change the calling user's password
#[utoipa::path(
    post,
    path = "/api/me/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password is incorrect", body = ErrorResponse),
        (status = 403, description = "Client token", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.users.change_password(user.subject_id()?, req).await?;
    Ok(Json(MessageResponse::new("Password changed")))
}
