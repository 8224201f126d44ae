use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{
    ClientRegistry, CredentialVerifier, LabelUpdate, PermissionStore, StoreError, StoreResult,
    SubjectUpdate, TokenStore,
};
use crate::models::{
    Client, Permission, Role, Subject, SubjectStatus, TokenPair, UserRoleAssignment,
};

#[derive(Default)]
struct Inner {
    clients: HashMap<String, Client>,
    /// Keyed by access token.
    tokens: HashMap<String, TokenPair>,
    /// Refresh token -> access token.
    refresh_index: HashMap<String, String>,
    subjects: HashMap<String, Subject>,
    permissions: HashMap<String, Permission>,
    roles: HashMap<String, Role>,
    assignments: HashMap<String, UserRoleAssignment>,
}

/// Mutex-guarded implementation of every store trait. Each operation runs
/// under one lock acquisition, which gives the same per-document atomicity
/// the MongoDB implementation relies on.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent operation, to exercise deadlines.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn token_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.tokens.len()).unwrap_or(0)
    }

    async fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("In-memory store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl ClientRegistry for InMemoryStore {
    async fn find_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self.lock().await?.clients.get(client_id).cloned())
    }

    async fn insert_client(&self, client: Client) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        if inner.clients.contains_key(&client.client_id) {
            return Err(StoreError::Duplicate(format!(
                "client_id {}",
                client.client_id
            )));
        }
        inner.clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let inner = self.lock().await?;
        let mut clients: Vec<Client> = inner.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(clients)
    }

    async fn delete_client(&self, client_id: &str) -> StoreResult<bool> {
        Ok(self.lock().await?.clients.remove(client_id).is_some())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert_pair(&self, pair: TokenPair) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        if inner.tokens.contains_key(&pair.access_token) {
            return Err(StoreError::Duplicate("access_token".to_string()));
        }
        if let Some(refresh_token) = &pair.refresh_token {
            if inner.refresh_index.contains_key(refresh_token) {
                return Err(StoreError::Duplicate("refresh_token".to_string()));
            }
            inner
                .refresh_index
                .insert(refresh_token.clone(), pair.access_token.clone());
        }
        inner.tokens.insert(pair.access_token.clone(), pair);
        Ok(())
    }

    async fn find_by_access_token(&self, access_token: &str) -> StoreResult<Option<TokenPair>> {
        Ok(self.lock().await?.tokens.get(access_token).cloned())
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> StoreResult<Option<TokenPair>> {
        let inner = self.lock().await?;
        Ok(inner
            .refresh_index
            .get(refresh_token)
            .and_then(|access_token| inner.tokens.get(access_token))
            .cloned())
    }

    async fn delete_by_refresh_token(&self, refresh_token: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        match inner.refresh_index.remove(refresh_token) {
            Some(access_token) => Ok(inner.tokens.remove(&access_token).is_some()),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryStore {
    async fn find_subject(&self, subject_id: &str) -> StoreResult<Option<Subject>> {
        Ok(self.lock().await?.subjects.get(subject_id).cloned())
    }

    async fn find_subject_by_username(&self, username: &str) -> StoreResult<Option<Subject>> {
        Ok(self
            .lock()
            .await?
            .subjects
            .values()
            .find(|s| s.username == username)
            .cloned())
    }

    async fn insert_subject(&self, subject: Subject) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        if inner
            .subjects
            .values()
            .any(|s| s.username == subject.username || s.id == subject.id)
        {
            return Err(StoreError::Duplicate(format!("username {}", subject.username)));
        }
        inner.subjects.insert(subject.id.clone(), subject);
        Ok(())
    }

    async fn list_subjects(&self, status: Option<SubjectStatus>) -> StoreResult<Vec<Subject>> {
        let inner = self.lock().await?;
        let mut subjects: Vec<Subject> = inner
            .subjects
            .values()
            .filter(|s| status.map_or(true, |status| s.status == status))
            .cloned()
            .collect();
        subjects.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(subjects)
    }

    async fn update_subject(
        &self,
        subject_id: &str,
        update: SubjectUpdate,
    ) -> StoreResult<Option<Subject>> {
        let mut inner = self.lock().await?;
        if let Some(username) = &update.username {
            if inner
                .subjects
                .values()
                .any(|s| &s.username == username && s.id != subject_id)
            {
                return Err(StoreError::Duplicate(format!("username {}", username)));
            }
        }

        let Some(subject) = inner.subjects.get_mut(subject_id) else {
            return Ok(None);
        };
        let now = chrono::Utc::now();
        if let Some(username) = update.username {
            subject.username = username;
        }
        if let Some(role) = update.role {
            subject.role = Some(role);
        }
        if let Some(status) = update.status {
            subject.status = status;
            subject.archived_at = (status == SubjectStatus::Archived).then_some(now);
        }
        if let Some(password_hash) = update.password_hash {
            subject.password_hash = password_hash;
        }
        subject.updated_at = now;
        Ok(Some(subject.clone()))
    }

    async fn delete_subject(&self, subject_id: &str) -> StoreResult<bool> {
        Ok(self.lock().await?.subjects.remove(subject_id).is_some())
    }

    async fn swap_refresh_token(
        &self,
        subject_id: &str,
        refresh_token: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let mut inner = self.lock().await?;
        match inner.subjects.get_mut(subject_id) {
            Some(subject) => {
                subject.updated_at = chrono::Utc::now();
                Ok(std::mem::replace(
                    &mut subject.refresh_token,
                    refresh_token.map(str::to_string),
                ))
            }
            None => Ok(None),
        }
    }

    async fn clear_refresh_token(&self, refresh_token: &str) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        for subject in inner.subjects.values_mut() {
            if subject.refresh_token.as_deref() == Some(refresh_token) {
                subject.refresh_token = None;
                subject.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }
}

fn sorted_by_code(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort_by(|a, b| a.code.cmp(&b.code));
    permissions
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn insert_permission(&self, permission: Permission) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        if inner.permissions.values().any(|p| p.code == permission.code) {
            return Err(StoreError::Duplicate(format!(
                "permission code {}",
                permission.code
            )));
        }
        inner.permissions.insert(permission.id.clone(), permission);
        Ok(())
    }

    async fn find_permission(&self, id: &str) -> StoreResult<Option<Permission>> {
        Ok(self.lock().await?.permissions.get(id).cloned())
    }

    async fn find_permission_by_code(&self, code: &str) -> StoreResult<Option<Permission>> {
        Ok(self
            .lock()
            .await?
            .permissions
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn find_permissions_by_codes(&self, codes: &[String]) -> StoreResult<Vec<Permission>> {
        let inner = self.lock().await?;
        Ok(sorted_by_code(
            inner
                .permissions
                .values()
                .filter(|p| codes.contains(&p.code))
                .cloned()
                .collect(),
        ))
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let inner = self.lock().await?;
        Ok(sorted_by_code(inner.permissions.values().cloned().collect()))
    }

    async fn list_permissions_by_module(&self, module: &str) -> StoreResult<Vec<Permission>> {
        let inner = self.lock().await?;
        Ok(sorted_by_code(
            inner
                .permissions
                .values()
                .filter(|p| p.module == module)
                .cloned()
                .collect(),
        ))
    }

    async fn update_permission(
        &self,
        id: &str,
        update: LabelUpdate,
    ) -> StoreResult<Option<Permission>> {
        let mut inner = self.lock().await?;
        Ok(inner.permissions.get_mut(id).map(|permission| {
            if let Some(name) = update.name {
                permission.name = name;
            }
            if let Some(description) = update.description {
                permission.description = description;
            }
            permission.updated_at = chrono::Utc::now();
            permission.clone()
        }))
    }

    async fn delete_permission(&self, id: &str) -> StoreResult<bool> {
        Ok(self.lock().await?.permissions.remove(id).is_some())
    }

    async fn insert_role(&self, role: Role) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        if inner.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Duplicate(format!("role name {}", role.name)));
        }
        inner.roles.insert(role.id.clone(), role);
        Ok(())
    }

    async fn find_role(&self, id: &str) -> StoreResult<Option<Role>> {
        Ok(self.lock().await?.roles.get(id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .lock()
            .await?
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn find_roles(&self, ids: &[String]) -> StoreResult<Vec<Role>> {
        let inner = self.lock().await?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.roles.get(id))
            .cloned()
            .collect())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let inner = self.lock().await?;
        let mut roles: Vec<Role> = inner.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update_role(&self, id: &str, update: LabelUpdate) -> StoreResult<Option<Role>> {
        let mut inner = self.lock().await?;
        if let Some(name) = &update.name {
            if inner.roles.values().any(|r| &r.name == name && r.id != id) {
                return Err(StoreError::Duplicate(format!("role name {}", name)));
            }
        }

        Ok(inner
            .roles
            .get_mut(id)
            .filter(|role| !role.is_system)
            .map(|role| {
                if let Some(name) = update.name {
                    role.name = name;
                }
                if let Some(description) = update.description {
                    role.description = description;
                }
                role.updated_at = chrono::Utc::now();
                role.clone()
            }))
    }

    async fn delete_role(&self, id: &str) -> StoreResult<bool> {
        Ok(self.lock().await?.roles.remove(id).is_some())
    }

    async fn add_role_permission(&self, role_id: &str, code: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        match inner.roles.get_mut(role_id) {
            Some(role) if !role.permissions.iter().any(|p| p == code) => {
                role.permissions.push(code.to_string());
                role.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_role_permission(&self, role_id: &str, code: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        match inner.roles.get_mut(role_id) {
            Some(role) => {
                let before = role.permissions.len();
                role.permissions.retain(|p| p != code);
                role.updated_at = chrono::Utc::now();
                Ok(role.permissions.len() != before)
            }
            None => Ok(false),
        }
    }

    async fn find_or_create_assignment(&self, user_id: &str) -> StoreResult<UserRoleAssignment> {
        let mut inner = self.lock().await?;
        Ok(inner
            .assignments
            .entry(user_id.to_string())
            .or_insert_with(|| UserRoleAssignment::empty(user_id))
            .clone())
    }

    async fn add_assignment_role(&self, user_id: &str, role_id: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        let assignment = inner
            .assignments
            .entry(user_id.to_string())
            .or_insert_with(|| UserRoleAssignment::empty(user_id));
        if assignment.roles.iter().any(|r| r == role_id) {
            return Ok(false);
        }
        assignment.roles.push(role_id.to_string());
        assignment.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn remove_assignment_role(&self, user_id: &str, role_id: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        match inner.assignments.get_mut(user_id) {
            Some(assignment) => {
                let before = assignment.roles.len();
                assignment.roles.retain(|r| r != role_id);
                assignment.updated_at = chrono::Utc::now();
                Ok(assignment.roles.len() != before)
            }
            None => Ok(false),
        }
    }

    async fn add_assignment_permission(&self, user_id: &str, code: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        let assignment = inner
            .assignments
            .entry(user_id.to_string())
            .or_insert_with(|| UserRoleAssignment::empty(user_id));
        if assignment.permissions.iter().any(|p| p == code) {
            return Ok(false);
        }
        assignment.permissions.push(code.to_string());
        assignment.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn remove_assignment_permission(&self, user_id: &str, code: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        match inner.assignments.get_mut(user_id) {
            Some(assignment) => {
                let before = assignment.permissions.len();
                assignment.permissions.retain(|p| p != code);
                assignment.updated_at = chrono::Utc::now();
                Ok(assignment.permissions.len() != before)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().await.map(|_| ())
    }
}
