use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{Subject, SubjectStatus};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 128, message = "username must be 1-128 characters"))]
    #[schema(example = "ana@empresa.com")]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "password must be 6-128 characters"))]
    pub password: String,
    /// Legacy role claim carried in access tokens. Defaults to `user`.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 128, message = "username must be 1-128 characters"))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 64, message = "role must be 1-64 characters"))]
    pub role: Option<String>,
    pub status: Option<SubjectStatus>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "old_password is required"))]
    pub old_password: String,
    #[validate(length(min = 6, max = 128, message = "new_password must be 6-128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Only users in this status. Defaults to `active`.
    pub status: Option<SubjectStatus>,
    /// List every status, ignoring `status`.
    #[serde(default)]
    pub include_archived: bool,
}

/// A subject without its password hash or refresh token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub role: Option<String>,
    pub status: SubjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl From<Subject> for UserResponse {
    fn from(s: Subject) -> Self {
        Self {
            id: s.id,
            username: s.username,
            role: s.role,
            status: s.status,
            created_at: s.created_at,
            updated_at: s.updated_at,
            archived_at: s.archived_at,
        }
    }
}
