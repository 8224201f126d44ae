use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One issued access token and, for user grants, its paired refresh token.
///
/// The pair is the unit of revocation: deleting it invalidates both tokens
/// regardless of what the signed access token itself claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    /// Absent for client-credentials grants. Omitted rather than stored as
    /// null so the sparse unique index ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub client_id: String,
    pub scopes: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub access_expires_at: DateTime<Utc>,
    #[serde(
        default,
        with = "super::optional_chrono_datetime_as_bson_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_expires_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub issued_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.access_expires_at
    }

    /// A pair without a refresh expiry cannot be refreshed at all.
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at.map_or(true, |expiry| now > expiry)
    }
}
