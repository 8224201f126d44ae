use serde::{Deserialize, Serialize};

/// A grantable capability, keyed by its hierarchical code (`module:action`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "_id")]
    pub id: String,
    pub code: String,
    pub module: String,
    pub action: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Permission {
    /// Module and action default to the segments either side of the first `:`.
    pub fn new(
        code: String,
        name: String,
        description: String,
        module: Option<String>,
        action: Option<String>,
    ) -> Self {
        let (default_module, default_action) = match code.split_once(':') {
            Some((module, action)) => (module.to_string(), action.to_string()),
            None => (code.clone(), String::new()),
        };
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            module: module.unwrap_or(default_module),
            action: action.unwrap_or(default_action),
            code,
            name,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_and_action_derived_from_code() {
        let perm = Permission::new(
            "finanzas:reports:export".to_string(),
            "Export reports".to_string(),
            String::new(),
            None,
            None,
        );
        assert_eq!(perm.module, "finanzas");
        assert_eq!(perm.action, "reports:export");
    }

    #[test]
    fn test_explicit_module_wins() {
        let perm = Permission::new(
            "dashboard".to_string(),
            "Dashboard".to_string(),
            String::new(),
            Some("admin".to_string()),
            None,
        );
        assert_eq!(perm.module, "admin");
        assert_eq!(perm.action, "");
    }
}
