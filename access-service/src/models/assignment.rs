use serde::{Deserialize, Serialize};

/// Roles and direct permissions held by one subject. Created lazily the first
/// time the subject is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleAssignment {
    pub user_id: String,
    /// Role ids.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission codes granted outside of any role.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UserRoleAssignment {
    pub fn empty(user_id: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            user_id: user_id.to_string(),
            roles: Vec::new(),
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
