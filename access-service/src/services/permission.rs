//! Role-based permission resolution with prefix wildcards.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::services::error::AccessError;
use crate::services::stores::{with_deadline, PermissionStore};

/// Shortest prefix a trailing `*` may extend. Keeps `*` and `a*` from acting
/// as near-universal grants; such codes still match literally.
pub const MIN_WILDCARD_PREFIX_LEN: usize = 2;

/// The prefix a wildcard code grants, or `None` if the code is not an active
/// wildcard.
pub fn wildcard_prefix(code: &str) -> Option<&str> {
    code.strip_suffix('*')
        .filter(|prefix| prefix.len() >= MIN_WILDCARD_PREFIX_LEN)
}

/// Union of a subject's direct and role-derived permission codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePermissions {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl EffectivePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        let code = code.into();
        if let Some(prefix) = wildcard_prefix(&code) {
            if !self.prefixes.iter().any(|p| p == prefix) {
                self.prefixes.push(prefix.to_string());
            }
        }
        self.exact.insert(code);
    }

    /// Literal membership, then prefix match. Case-sensitive.
    pub fn contains(&self, code: &str) -> bool {
        self.exact.contains(code) || self.prefixes.iter().any(|prefix| code.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Sorted codes, wildcards included as written.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.exact.iter().cloned().collect();
        codes.sort();
        codes
    }
}

impl<S: Into<String>> Extend<S> for EffectivePermissions {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for code in iter {
            self.insert(code);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for EffectivePermissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut permissions = Self::new();
        permissions.extend(iter);
        permissions
    }
}

/// Answers permission questions for subjects. Store failures are returned as
/// errors and never collapse into a denial or a grant.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn PermissionStore>,
    deadline: Duration,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn PermissionStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    #[tracing::instrument(skip(self))]
    pub async fn effective_permissions(
        &self,
        subject_id: &str,
    ) -> Result<EffectivePermissions, AccessError> {
        let assignment = with_deadline(
            self.deadline,
            self.store.find_or_create_assignment(subject_id),
        )
        .await?;

        let mut permissions: EffectivePermissions = assignment.permissions.iter().cloned().collect();

        if !assignment.roles.is_empty() {
            let roles = with_deadline(self.deadline, self.store.find_roles(&assignment.roles)).await?;
            if roles.len() < assignment.roles.len() {
                tracing::debug!(
                    subject_id = %subject_id,
                    assigned = assignment.roles.len(),
                    resolved = roles.len(),
                    "Skipping unresolved role assignments"
                );
            }
            for role in roles {
                permissions.extend(role.permissions);
            }
        }

        Ok(permissions)
    }

    pub async fn has_permission(&self, subject_id: &str, code: &str) -> Result<bool, AccessError> {
        let result = self
            .effective_permissions(subject_id)
            .await
            .map(|permissions| permissions.contains(code));
        record_check(&result);
        result
    }

    /// True when at least one of `codes` is held. An empty list grants nothing.
    pub async fn has_any(&self, subject_id: &str, codes: &[String]) -> Result<bool, AccessError> {
        let result = self
            .effective_permissions(subject_id)
            .await
            .map(|permissions| codes.iter().any(|code| permissions.contains(code)));
        record_check(&result);
        result
    }

    pub async fn has_all(&self, subject_id: &str, codes: &[String]) -> Result<bool, AccessError> {
        let result = self
            .effective_permissions(subject_id)
            .await
            .map(|permissions| codes.iter().all(|code| permissions.contains(code)));
        record_check(&result);
        result
    }
}

fn record_check(result: &Result<bool, AccessError>) {
    let outcome = match result {
        Ok(true) => "granted",
        Ok(false) => "denied",
        Err(_) => "error",
    };
    metrics::counter!("permission_checks_total", "outcome" => outcome).increment(1);
}
