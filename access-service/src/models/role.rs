use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Permission codes; order carries no meaning.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// System roles reject every mutation and deletion.
    #[serde(default)]
    pub is_system: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Role {
    pub fn new(name: String, description: String, permissions: Vec<String>, is_system: bool) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            permissions,
            is_system,
            created_at: now,
            updated_at: now,
        }
    }
}
