use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Client, GrantType, Permission, Role};

// Permissions

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 128, message = "code must be 1-128 characters"))]
    #[schema(example = "finanzas:reports:export")]
    pub code: String,
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePermissionRequest {
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionResponse {
    pub id: String,
    pub code: String,
    pub module: String,
    pub action: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            code: p.code,
            module: p.module,
            action: p.action,
            name: p.name,
            description: p.description,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

// Roles

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    #[schema(example = "Analista Financiero")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RolePermissionRequest {
    #[validate(length(min = 1, message = "permission_code is required"))]
    pub permission_code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            permissions: r.permissions,
            is_system: r.is_system,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// A role together with the permission records its codes resolve to.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleDetailResponse {
    #[serde(flatten)]
    pub role: RoleResponse,
    pub permission_details: Vec<PermissionResponse>,
}

// Assignments

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignRoleRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "role_id is required"))]
    pub role_id: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignPermissionRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "permission_code is required"))]
    pub permission_code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserRolesResponse {
    pub user_id: String,
    pub roles: Vec<RoleResponse>,
    /// Codes granted directly, outside of any role
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EffectivePermissionsResponse {
    pub user_id: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HasPermissionResponse {
    pub user_id: String,
    pub permission_code: String,
    pub granted: bool,
}

// Clients

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    pub name: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[validate(length(min = 1, message = "at least one grant type is required"))]
    pub grant_types: Vec<GrantType>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Returned once, at registration. The secret is not recoverable afterwards.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateClientResponse {
    pub client_id: String,
    pub client_secret: String,
    pub name: String,
    pub grant_types: Vec<GrantType>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientResponse {
    pub client_id: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<GrantType>,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Client> for ClientResponse {
    fn from(c: Client) -> Self {
        Self {
            client_id: c.client_id,
            name: c.name,
            redirect_uris: c.redirect_uris,
            grant_types: c.grant_types,
            scopes: c.scopes,
            created_at: c.created_at,
        }
    }
}
