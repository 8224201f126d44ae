use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubjectStatus {
    Active,
    Inactive,
    Archived,
}

/// A user account as seen by the authorization service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub status: SubjectStatus,
    #[serde(default)]
    pub role: Option<String>,
    /// The single live refresh token issued to this subject.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::optional_chrono_datetime_as_bson_datetime"
    )]
    pub archived_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Subject {
    pub fn new(username: String, password_hash: String, role: Option<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            password_hash,
            status: SubjectStatus::Active,
            role,
            refresh_token: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubjectStatus::Active
    }
}
