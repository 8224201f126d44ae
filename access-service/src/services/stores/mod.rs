//! Persistence seams used by the token engine and the permission resolver.
//!
//! Each collaborator is a trait with a MongoDB implementation
//! ([`crate::services::MongoDb`]) and an in-memory one ([`InMemoryStore`]) for
//! tests. Implementations report failures as [`StoreError`]; driver error
//! types never cross this boundary.

mod memory;
mod mongo;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    Client, Permission, Role, Subject, SubjectStatus, TokenPair, UserRoleAssignment,
};
use crate::services::error::AccessError;
use crate::utils::{verify_password, Password, PasswordHashString};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AccessError::StoreUnavailable(msg),
            StoreError::Duplicate(msg) => AccessError::Conflict(msg),
        }
    }
}

/// Run one store operation under `limit`; elapsing maps to `Timeout`.
pub async fn with_deadline<T, F>(limit: Duration, op: F) -> Result<T, AccessError>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result.map_err(AccessError::from),
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Store operation timed out");
            Err(AccessError::Timeout(limit))
        }
    }
}

/// Name and description edits for a permission or role. `None` keeps the
/// stored value; fields not listed here are never written.
#[derive(Debug, Clone, Default)]
pub struct LabelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Field-level edits to a subject. Setting `status` to `Archived` stamps
/// `archived_at`; any other status clears it.
#[derive(Debug, Clone, Default)]
pub struct SubjectUpdate {
    pub username: Option<String>,
    pub role: Option<String>,
    pub status: Option<SubjectStatus>,
    pub password_hash: Option<String>,
}

/// Checks a plaintext secret against a stored Argon2 hash. A malformed hash
/// is treated as a mismatch.
fn secret_matches(secret: &str, hash: &str) -> bool {
    match verify_password(
        &Password::new(secret),
        &PasswordHashString::new(hash.to_string()),
    ) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(error = %e, "Stored secret hash is malformed");
            false
        }
    }
}

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn find_client(&self, client_id: &str) -> StoreResult<Option<Client>>;
    async fn insert_client(&self, client: Client) -> StoreResult<()>;
    async fn list_clients(&self) -> StoreResult<Vec<Client>>;
    async fn delete_client(&self, client_id: &str) -> StoreResult<bool>;

    /// The client, if it exists and `secret` matches its stored hash.
    async fn authenticate(&self, client_id: &str, secret: &str) -> StoreResult<Option<Client>> {
        Ok(self
            .find_client(client_id)
            .await?
            .filter(|client| secret_matches(secret, &client.client_secret_hash)))
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_pair(&self, pair: TokenPair) -> StoreResult<()>;
    async fn find_by_access_token(&self, access_token: &str) -> StoreResult<Option<TokenPair>>;
    async fn find_by_refresh_token(&self, refresh_token: &str) -> StoreResult<Option<TokenPair>>;

    /// Atomic single-document delete. Returns `true` only to the caller that
    /// actually removed the pair; concurrent callers observe `false`.
    async fn delete_by_refresh_token(&self, refresh_token: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn find_subject(&self, subject_id: &str) -> StoreResult<Option<Subject>>;
    async fn find_subject_by_username(&self, username: &str) -> StoreResult<Option<Subject>>;
    async fn insert_subject(&self, subject: Subject) -> StoreResult<()>;
    /// Sorted by username. `None` lists every status.
    async fn list_subjects(&self, status: Option<SubjectStatus>) -> StoreResult<Vec<Subject>>;
    /// The subject as stored after the update; `None` when it does not exist.
    async fn update_subject(
        &self,
        subject_id: &str,
        update: SubjectUpdate,
    ) -> StoreResult<Option<Subject>>;
    async fn delete_subject(&self, subject_id: &str) -> StoreResult<bool>;

    /// Point the subject at `refresh_token`, returning the previous value.
    async fn swap_refresh_token(
        &self,
        subject_id: &str,
        refresh_token: Option<&str>,
    ) -> StoreResult<Option<String>>;

    /// Clear the pointer of whichever subject currently holds `refresh_token`.
    async fn clear_refresh_token(&self, refresh_token: &str) -> StoreResult<()>;

    /// The subject, if it exists and `password` matches. Status is not
    /// checked here.
    async fn verify(&self, username: &str, password: &Password) -> StoreResult<Option<Subject>> {
        Ok(self
            .find_subject_by_username(username)
            .await?
            .filter(|subject| secret_matches(password.as_str(), &subject.password_hash)))
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn insert_permission(&self, permission: Permission) -> StoreResult<()>;
    async fn find_permission(&self, id: &str) -> StoreResult<Option<Permission>>;
    async fn find_permission_by_code(&self, code: &str) -> StoreResult<Option<Permission>>;
    async fn find_permissions_by_codes(&self, codes: &[String]) -> StoreResult<Vec<Permission>>;
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    async fn list_permissions_by_module(&self, module: &str) -> StoreResult<Vec<Permission>>;
    async fn update_permission(
        &self,
        id: &str,
        update: LabelUpdate,
    ) -> StoreResult<Option<Permission>>;
    async fn delete_permission(&self, id: &str) -> StoreResult<bool>;

    async fn insert_role(&self, role: Role) -> StoreResult<()>;
    async fn find_role(&self, id: &str) -> StoreResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    /// Roles among `ids` that exist; unknown ids are skipped.
    async fn find_roles(&self, ids: &[String]) -> StoreResult<Vec<Role>>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    /// Only non-system roles match; the permission list is left alone.
    async fn update_role(&self, id: &str, update: LabelUpdate) -> StoreResult<Option<Role>>;
    async fn delete_role(&self, id: &str) -> StoreResult<bool>;
    /// `false` when the role already holds the code.
    async fn add_role_permission(&self, role_id: &str, code: &str) -> StoreResult<bool>;
    async fn remove_role_permission(&self, role_id: &str, code: &str) -> StoreResult<bool>;

    /// Fetch the subject's assignment, creating an empty one atomically.
    async fn find_or_create_assignment(&self, user_id: &str) -> StoreResult<UserRoleAssignment>;
    /// `false` when the subject already holds the role.
    async fn add_assignment_role(&self, user_id: &str, role_id: &str) -> StoreResult<bool>;
    async fn remove_assignment_role(&self, user_id: &str, role_id: &str) -> StoreResult<bool>;
    /// `false` when the subject already holds the permission directly.
    async fn add_assignment_permission(&self, user_id: &str, code: &str) -> StoreResult<bool>;
    async fn remove_assignment_permission(&self, user_id: &str, code: &str) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;
}
