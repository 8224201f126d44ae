use service_core::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{
            CreateRoleRequest, RoleDetailResponse, RolePermissionRequest, RoleResponse,
            UpdateRoleRequest,
        },
        ErrorResponse, MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// List every role
#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "All roles", body = Vec<RoleResponse>),
        (status = 403, description = "Missing admin:permissions", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let roles = state.admin.list_roles().await?;
    Ok(Json(
        roles.into_iter().map(RoleResponse::from).collect::<Vec<_>>(),
    ))
}

/// Get a role, with its permission records, by id
#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = RoleDetailResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.admin.get_role(&id).await?))
}

/// Get a role, with its permission records, by name
#[utoipa::path(
    get,
    path = "/api/roles/name/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Role", body = RoleDetailResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn get_role_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.admin.get_role_by_name(&name).await?))
}

/// Create a role
#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 400, description = "Unknown permission code", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.admin.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

/// Update a role's name or description
#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 403, description = "System role", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.admin.update_role(&id, req).await?;
    Ok(Json(RoleResponse::from(role)))
}

/// Delete a role
#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted", body = MessageResponse),
        (status = 403, description = "System role", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.delete_role(&id).await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}

/// Add a permission code to a role
#[utoipa::path(
    post,
    path = "/api/roles/{id}/permissions",
    params(("id" = String, Path, description = "Role id")),
    request_body = RolePermissionRequest,
    responses(
        (status = 200, description = "Permission added", body = RoleResponse),
        (status = 400, description = "Unknown permission code", body = ErrorResponse),
        (status = 403, description = "System role", body = ErrorResponse),
        (status = 409, description = "Role already holds the permission", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn add_role_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<RolePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.admin.add_role_permission(&id, &req.permission_code).await?;
    Ok(Json(RoleResponse::from(role)))
}

/// Remove a permission code from a role
#[utoipa::path(
    delete,
    path = "/api/roles/{id}/permissions/{permission_code}",
    params(
        ("id" = String, Path, description = "Role id"),
        ("permission_code" = String, Path, description = "Permission code")
    ),
    responses(
        (status = 200, description = "Permission removed", body = RoleResponse),
        (status = 403, description = "System role", body = ErrorResponse),
        (status = 404, description = "Role or permission not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn remove_role_permission(
    State(state): State<AppState>,
    Path((id, permission_code)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let role = state
        .admin
        .remove_role_permission(&id, &permission_code)
        .await?;
    Ok(Json(RoleResponse::from(role)))
}
