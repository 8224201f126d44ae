use service_core::axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{
            AssignPermissionRequest, AssignRoleRequest, EffectivePermissionsResponse,
            HasPermissionResponse, UserRolesResponse,
        },
        ErrorResponse, MessageResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Roles and direct permissions assigned to a user
#[utoipa::path(
    get,
    path = "/api/user-roles/{user_id}",
    params(("user_id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Assignments", body = UserRolesResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.admin.get_user_roles(&user_id).await?))
}

/// Assign a role to a user
#[utoipa::path(
    post,
    path = "/api/user-roles/assign-role",
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = MessageResponse),
        (status = 400, description = "Unknown role", body = ErrorResponse),
        (status = 409, description = "Already assigned", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AssignRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.assign_role(req).await?;
    Ok(Json(MessageResponse::new("Role assigned")))
}

/// Remove a role from a user
#[utoipa::path(
    delete,
    path = "/api/user-roles/remove-role",
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role removed", body = MessageResponse),
        (status = 404, description = "Not assigned", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn remove_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AssignRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.remove_role(req).await?;
    Ok(Json(MessageResponse::new("Role removed")))
}

/// Grant a permission directly to a user
#[utoipa::path(
    post,
    path = "/api/user-roles/assign-permission",
    request_body = AssignPermissionRequest,
    responses(
        (status = 200, description = "Permission assigned", body = MessageResponse),
        (status = 400, description = "Unknown permission", body = ErrorResponse),
        (status = 409, description = "Already assigned", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn assign_permission(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AssignPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.assign_permission(req).await?;
    Ok(Json(MessageResponse::new("Permission assigned")))
}

/// Remove a directly granted permission from a user
#[utoipa::path(
    delete,
    path = "/api/user-roles/remove-permission",
    request_body = AssignPermissionRequest,
    responses(
        (status = 200, description = "Permission removed", body = MessageResponse),
        (status = 404, description = "Not assigned", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn remove_permission(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AssignPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.remove_permission(req).await?;
    Ok(Json(MessageResponse::new("Permission removed")))
}

/// Effective permission codes of a user
#[utoipa::path(
    get,
    path = "/api/user-roles/{user_id}/permissions",
    params(("user_id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissionsResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn get_user_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state.resolver.effective_permissions(&user_id).await?;
    Ok(Json(EffectivePermissionsResponse {
        user_id,
        permissions: permissions.codes(),
    }))
}

/// Whether a user holds a permission, wildcards included
#[utoipa::path(
    get,
    path = "/api/user-roles/{user_id}/has-permission/{permission_code}",
    params(
        ("user_id" = String, Path, description = "Subject id"),
        ("permission_code" = String, Path, description = "Permission code")
    ),
    responses(
        (status = 200, description = "Decision", body = HasPermissionResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn has_permission(
    State(state): State<AppState>,
    Path((user_id, permission_code)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let granted = state
        .resolver
        .has_permission(&user_id, &permission_code)
        .await?;
    Ok(Json(HasPermissionResponse {
        user_id,
        permission_code,
        granted,
    }))
}

/// Effective permission codes of the caller
#[utoipa::path(
    get,
    path = "/api/me/permissions",
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissionsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Token has no subject", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.subject_id()?.to_string();
    let permissions = state.resolver.effective_permissions(&user_id).await?;
    Ok(Json(EffectivePermissionsResponse {
        user_id,
        permissions: permissions.codes(),
    }))
}
