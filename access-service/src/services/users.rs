use std::sync::Arc;
use std::time::Duration;

use crate::{
    dtos::users::{ChangePasswordRequest, CreateUserRequest, ListUsersQuery, UpdateUserRequest},
    models::{Subject, SubjectStatus},
    services::{
        error::AccessError,
        stores::{with_deadline, CredentialVerifier, StoreResult, SubjectUpdate},
    },
    utils::{hash_password, verify_password, Password, PasswordHashString},
};

/// Role claim given to users created without one.
pub const DEFAULT_USER_ROLE: &str = "user";

/// Account administration over the credential store: creation, edits,
/// archival and password changes.
#[derive(Clone)]
pub struct UserService {
    subjects: Arc<dyn CredentialVerifier>,
    deadline: Duration,
}

impl UserService {
    pub fn new(subjects: Arc<dyn CredentialVerifier>, deadline: Duration) -> Self {
        Self { subjects, deadline }
    }

    async fn within<T>(
        &self,
        op: impl std::future::Future<Output = StoreResult<T>>,
    ) -> Result<T, AccessError> {
        with_deadline(self.deadline, op).await
    }

    fn hash(password: &str) -> Result<String, AccessError> {
        hash_password(&Password::new(password))
            .map(PasswordHashString::into_string)
            .map_err(AccessError::Internal)
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<Subject, AccessError> {
        let password_hash = Self::hash(&req.password)?;
        let role = req
            .role
            .filter(|role| !role.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ROLE.to_string());

        let subject = Subject::new(req.username, password_hash, Some(role));
        self.within(self.subjects.insert_subject(subject.clone()))
            .await
            .map_err(|e| match e {
                AccessError::Conflict(_) => {
                    AccessError::Conflict(format!("Username '{}' already exists", subject.username))
                }
                other => other,
            })?;

        tracing::info!(subject_id = %subject.id, "User created");
        Ok(subject)
    }

    pub async fn get_user(&self, id: &str) -> Result<Subject, AccessError> {
        self.within(self.subjects.find_subject(id))
            .await?
            .ok_or_else(|| AccessError::NotFound("User".to_string()))
    }

    /// Active users unless a status is asked for; `include_archived` lists all.
    pub async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<Subject>, AccessError> {
        let status = if query.include_archived {
            None
        } else {
            Some(query.status.unwrap_or(SubjectStatus::Active))
        };
        self.within(self.subjects.list_subjects(status)).await
    }

    pub async fn update_user(
        &self,
        id: &str,
        req: UpdateUserRequest,
    ) -> Result<Subject, AccessError> {
        let username = req.username.clone();
        let update = SubjectUpdate {
            username: req.username,
            role: req.role,
            status: req.status,
            password_hash: None,
        };
        self.apply(id, update).await.map_err(|e| match (e, username) {
            (AccessError::Conflict(_), Some(username)) => {
                AccessError::Conflict(format!("Username '{}' already exists", username))
            }
            (other, _) => other,
        })
    }

    /// Archived users keep their record but can neither log in nor refresh.
    pub async fn archive_user(&self, id: &str) -> Result<Subject, AccessError> {
        let update = SubjectUpdate {
            status: Some(SubjectStatus::Archived),
            ..Default::default()
        };
        let subject = self.apply(id, update).await?;
        tracing::info!(subject_id = %id, "User archived");
        Ok(subject)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), AccessError> {
        if !self.within(self.subjects.delete_subject(id)).await? {
            return Err(AccessError::NotFound("User".to_string()));
        }
        tracing::info!(subject_id = %id, "User deleted");
        Ok(())
    }

    pub async fn change_password(
        &self,
        subject_id: &str,
        req: ChangePasswordRequest,
    ) -> Result<(), AccessError> {
        let subject = self.get_user(subject_id).await?;
        let matches = verify_password(
            &Password::new(req.old_password),
            &PasswordHashString::new(subject.password_hash),
        )
        .map_err(AccessError::Internal)?;
        if !matches {
            return Err(AccessError::InvalidRequest(
                "Current password is incorrect".to_string(),
            ));
        }

        let update = SubjectUpdate {
            password_hash: Some(Self::hash(&req.new_password)?),
            ..Default::default()
        };
        self.apply(subject_id, update).await?;
        tracing::info!(subject_id = %subject_id, "Password changed");
        Ok(())
    }

    async fn apply(&self, id: &str, update: SubjectUpdate) -> Result<Subject, AccessError> {
        self.within(self.subjects.update_subject(id, update))
            .await?
            .ok_or_else(|| AccessError::NotFound("User".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stores::InMemoryStore;

    fn service() -> (Arc<InMemoryStore>, UserService) {
        let store = Arc::new(InMemoryStore::new());
        let users = UserService::new(store.clone(), Duration::from_secs(5));
        (store, users)
    }

    fn create(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            password: "secreto1".to_string(),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_hashes_password_and_defaults_role() {
        let (store, users) = service();
        let created = users.create_user(create("ana")).await.unwrap();

        assert_eq!(created.role.as_deref(), Some(DEFAULT_USER_ROLE));
        assert_ne!(created.password_hash, "secreto1");
        assert!(store
            .verify("ana", &Password::new("secreto1"))
            .await
            .unwrap()
            .is_some());

        let duplicate = users.create_user(create("ana")).await;
        assert!(matches!(duplicate, Err(AccessError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_hides_archived_by_default() {
        let (_, users) = service();
        let ana = users.create_user(create("ana")).await.unwrap();
        users.create_user(create("luis")).await.unwrap();

        let archived = users.archive_user(&ana.id).await.unwrap();
        assert_eq!(archived.status, SubjectStatus::Archived);
        assert!(archived.archived_at.is_some());

        let active = users.list_users(ListUsersQuery::default()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username, "luis");

        let only_archived = users
            .list_users(ListUsersQuery {
                status: Some(SubjectStatus::Archived),
                include_archived: false,
            })
            .await
            .unwrap();
        assert_eq!(only_archived.len(), 1);

        let all = users
            .list_users(ListUsersQuery {
                status: None,
                include_archived: true,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_user_fields() {
        let (_, users) = service();
        let ana = users.create_user(create("ana")).await.unwrap();
        users.create_user(create("luis")).await.unwrap();

        let updated = users
            .update_user(
                &ana.id,
                UpdateUserRequest {
                    username: None,
                    role: Some("admin".to_string()),
                    status: Some(SubjectStatus::Inactive),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "ana");
        assert_eq!(updated.role.as_deref(), Some("admin"));
        assert_eq!(updated.status, SubjectStatus::Inactive);

        let taken = users
            .update_user(
                &ana.id,
                UpdateUserRequest {
                    username: Some("luis".to_string()),
                    role: None,
                    status: None,
                },
            )
            .await;
        assert!(matches!(taken, Err(AccessError::Conflict(_))));

        let missing = users
            .update_user(
                "missing",
                UpdateUserRequest {
                    username: None,
                    role: None,
                    status: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(AccessError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_change_password_requires_current_password() {
        let (store, users) = service();
        let ana = users.create_user(create("ana")).await.unwrap();

        let wrong = users
            .change_password(
                &ana.id,
                ChangePasswordRequest {
                    old_password: "otro".to_string(),
                    new_password: "nuevo-secreto".to_string(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(AccessError::InvalidRequest(_))));

        users
            .change_password(
                &ana.id,
                ChangePasswordRequest {
                    old_password: "secreto1".to_string(),
                    new_password: "nuevo-secreto".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(store
            .verify("ana", &Password::new("secreto1"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .verify("ana", &Password::new("nuevo-secreto"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (_, users) = service();
        let ana = users.create_user(create("ana")).await.unwrap();

        users.delete_user(&ana.id).await.unwrap();
        assert!(matches!(
            users.get_user(&ana.id).await,
            Err(AccessError::NotFound(_))
        ));
        assert!(matches!(
            users.delete_user(&ana.id).await,
            Err(AccessError::NotFound(_))
        ));
    }
}
