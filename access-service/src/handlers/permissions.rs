use service_core::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{CreatePermissionRequest, PermissionResponse, UpdatePermissionRequest},
        ErrorResponse, MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

fn responses(permissions: Vec<crate::models::Permission>) -> Vec<PermissionResponse> {
    permissions.into_iter().map(PermissionResponse::from).collect()
}

/// List every permission
#[utoipa::path(
    get,
    path = "/api/permissions",
    responses(
        (status = 200, description = "All permissions", body = Vec<PermissionResponse>),
        (status = 403, description = "Missing admin:permissions", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let permissions = state.admin.list_permissions().await?;
    Ok(Json(responses(permissions)))
}

/// Get a permission by id
#[utoipa::path(
    get,
    path = "/api/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission", body = PermissionResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let permission = state.admin.get_permission(&id).await?;
    Ok(Json(PermissionResponse::from(permission)))
}

/// Get a permission by code
#[utoipa::path(
    get,
    path = "/api/permissions/code/{code}",
    params(("code" = String, Path, description = "Permission code, e.g. finanzas:read")),
    responses(
        (status = 200, description = "Permission", body = PermissionResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn get_permission_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let permission = state.admin.get_permission_by_code(&code).await?;
    Ok(Json(PermissionResponse::from(permission)))
}

/// List permissions of one module
#[utoipa::path(
    get,
    path = "/api/permissions/module/{module}",
    params(("module" = String, Path, description = "Module name, e.g. finanzas")),
    responses(
        (status = 200, description = "Module permissions", body = Vec<PermissionResponse>)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn list_permissions_by_module(
    State(state): State<AppState>,
    Path(module): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state.admin.list_permissions_by_module(&module).await?;
    Ok(Json(responses(permissions)))
}

/// Create a permission
#[utoipa::path(
    post,
    path = "/api/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = PermissionResponse),
        (status = 409, description = "Code already exists", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let permission = state.admin.create_permission(req).await?;
    Ok((StatusCode::CREATED, Json(PermissionResponse::from(permission))))
}

/// Update a permission's name or description
#[utoipa::path(
    put,
    path = "/api/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated", body = PermissionResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let permission = state.admin.update_permission(&id, req).await?;
    Ok(Json(PermissionResponse::from(permission)))
}

/// Delete a permission
#[utoipa::path(
    delete,
    path = "/api/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.delete_permission(&id).await?;
    Ok(Json(MessageResponse::new("Permission deleted")))
}
