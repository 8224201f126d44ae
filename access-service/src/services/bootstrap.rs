//! Idempotent seeding of default permissions, roles, an OAuth client and an
//! administrator. Safe to run on every start.

use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BootstrapAdmin, BootstrapClient, BootstrapConfig};
use crate::models::{Client, GrantType, Permission, Role, Subject};
use crate::services::error::AccessError;
use crate::services::stores::{
    with_deadline, ClientRegistry, CredentialVerifier, PermissionStore, StoreResult,
};
use crate::utils::{hash_password, Password};

pub const ADMIN_ROLE: &str = "Administrador";

/// (code, name, description)
const DEFAULT_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("admin:permissions", "Administrar permisos", "Permite administrar permisos y roles"),
    ("admin:users", "Administrar usuarios", "Permite administrar usuarios"),
    ("admin:clients", "Administrar clientes", "Permite registrar y eliminar clientes OAuth"),
    ("admin:dashboard", "Dashboard administrativo", "Acceso al dashboard administrativo"),
    ("finanzas:read", "Ver finanzas", "Acceso de lectura al módulo financiero"),
    ("finanzas:write", "Editar finanzas", "Permite crear y editar datos financieros"),
    ("finanzas:reports:read", "Ver reportes financieros", "Acceso a reportes financieros"),
    ("finanzas:reports:export", "Exportar reportes", "Permite exportar reportes financieros"),
    ("finanzas:transactions:write", "Crear transacciones", "Permite crear transacciones financieras"),
    ("finanzas:dashboard", "Dashboard financiero", "Acceso al dashboard financiero"),
    ("inventario:read", "Ver inventario", "Acceso de lectura al módulo de inventario"),
    ("inventario:write", "Editar inventario", "Permite crear y editar elementos del inventario"),
    ("inventario:reports", "Reportes de inventario", "Acceso a reportes de inventario"),
    ("inventario:dashboard", "Dashboard inventario", "Acceso al dashboard de inventario"),
];

/// (name, description, permission codes, system)
const DEFAULT_ROLES: &[(&str, &str, &[&str], bool)] = &[
    (
        ADMIN_ROLE,
        "Acceso completo al sistema",
        &["admin:*", "finanzas:*", "inventario:*"],
        true,
    ),
    (
        "Gerente Financiero",
        "Gestión del módulo financiero",
        &[
            "finanzas:read",
            "finanzas:write",
            "finanzas:reports:read",
            "finanzas:reports:export",
            "finanzas:transactions:write",
            "finanzas:dashboard",
        ],
        false,
    ),
    (
        "Analista Financiero",
        "Visualización de datos financieros",
        &["finanzas:read", "finanzas:reports:read", "finanzas:dashboard"],
        false,
    ),
    (
        "Gerente de Inventario",
        "Gestión del inventario",
        &[
            "inventario:read",
            "inventario:write",
            "inventario:reports",
            "inventario:dashboard",
        ],
        false,
    ),
];

const DEFAULT_CLIENT_SCOPES: &[&str] = &["read", "write"];

pub struct Bootstrap {
    clients: Arc<dyn ClientRegistry>,
    subjects: Arc<dyn CredentialVerifier>,
    permissions: Arc<dyn PermissionStore>,
    deadline: Duration,
}

impl Bootstrap {
    pub fn new(
        clients: Arc<dyn ClientRegistry>,
        subjects: Arc<dyn CredentialVerifier>,
        permissions: Arc<dyn PermissionStore>,
        deadline: Duration,
    ) -> Self {
        Self {
            clients,
            subjects,
            permissions,
            deadline,
        }
    }

    async fn within<T>(
        &self,
        op: impl std::future::Future<Output = StoreResult<T>>,
    ) -> Result<T, AccessError> {
        with_deadline(self.deadline, op).await
    }

    pub async fn run(&self, config: &BootstrapConfig) -> Result<(), AccessError> {
        if config.seed_defaults {
            self.seed_permissions_and_roles().await?;
        }
        if let Some(client) = &config.client {
            self.ensure_client(client).await?;
        }
        if let Some(admin) = &config.admin {
            self.ensure_admin(admin).await?;
        }
        Ok(())
    }

    pub async fn seed_permissions_and_roles(&self) -> Result<(), AccessError> {
        let mut created = 0usize;

        for (code, name, description) in DEFAULT_PERMISSIONS {
            if self
                .within(self.permissions.find_permission_by_code(code))
                .await?
                .is_some()
            {
                continue;
            }
            let permission = Permission::new(
                code.to_string(),
                name.to_string(),
                description.to_string(),
                None,
                None,
            );
            if insert_unless_present(self.within(self.permissions.insert_permission(permission)).await)? {
                created += 1;
            }
        }

        for (name, description, codes, is_system) in DEFAULT_ROLES {
            if self
                .within(self.permissions.find_role_by_name(name))
                .await?
                .is_some()
            {
                continue;
            }
            let role = Role::new(
                name.to_string(),
                description.to_string(),
                codes.iter().map(|c| c.to_string()).collect(),
                *is_system,
            );
            if insert_unless_present(self.within(self.permissions.insert_role(role)).await)? {
                created += 1;
            }
        }

        tracing::info!(created, "Default permissions and roles seeded");
        Ok(())
    }

    pub async fn ensure_client(&self, config: &BootstrapClient) -> Result<(), AccessError> {
        if self
            .within(self.clients.find_client(&config.client_id))
            .await?
            .is_some()
        {
            tracing::debug!(client_id = %config.client_id, "Bootstrap client already registered");
            return Ok(());
        }

        let secret_hash = hash_password(&Password::new(config.client_secret.expose_secret().as_str()))
            .map_err(|e| AccessError::Internal(anyhow::anyhow!("Failed to hash client secret: {}", e)))?;

        let client = Client::new(
            config.client_id.clone(),
            secret_hash.into_string(),
            "Default client".to_string(),
            vec![],
            vec![
                GrantType::Password,
                GrantType::RefreshToken,
                GrantType::ClientCredentials,
            ],
            DEFAULT_CLIENT_SCOPES.iter().map(|s| s.to_string()).collect(),
        );
        insert_unless_present(self.within(self.clients.insert_client(client)).await)?;

        tracing::info!(client_id = %config.client_id, "Bootstrap client registered");
        Ok(())
    }

    /// Creates the administrator if missing and makes sure it holds the
    /// administrator role.
    pub async fn ensure_admin(&self, config: &BootstrapAdmin) -> Result<(), AccessError> {
        let subject = match self
            .within(self.subjects.find_subject_by_username(&config.username))
            .await?
        {
            Some(subject) => subject,
            None => {
                let hash = hash_password(&Password::new(config.password.expose_secret().as_str()))
                    .map_err(|e| AccessError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))?;
                let subject = Subject::new(config.username.clone(), hash.into_string(), Some("admin".to_string()));
                self.within(self.subjects.insert_subject(subject.clone()))
                    .await?;
                tracing::info!(username = %config.username, "Bootstrap administrator created");
                subject
            }
        };

        let role = self
            .within(self.permissions.find_role_by_name(ADMIN_ROLE))
            .await?
            .ok_or_else(|| AccessError::InvalidRole(ADMIN_ROLE.to_string()))?;

        let assigned = self
            .within(self.permissions.add_assignment_role(&subject.id, &role.id))
            .await?;
        if assigned {
            tracing::info!(username = %config.username, "Administrator role assigned");
        }
        Ok(())
    }
}

/// A concurrent instance may have inserted the same record first.
fn insert_unless_present(result: Result<(), AccessError>) -> Result<bool, AccessError> {
    match result {
        Ok(()) => Ok(true),
        Err(AccessError::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::permission::PermissionResolver;
    use crate::services::stores::InMemoryStore;
    use secrecy::SecretString;

    fn bootstrap(store: &Arc<InMemoryStore>) -> Bootstrap {
        Bootstrap::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Duration::from_secs(5),
        )
    }

    fn full_config() -> BootstrapConfig {
        BootstrapConfig {
            seed_defaults: true,
            client: Some(BootstrapClient {
                client_id: "default-client".to_string(),
                client_secret: SecretString::new("default-secret".to_string()),
            }),
            admin: Some(BootstrapAdmin {
                username: "admin".to_string(),
                password: SecretString::new("AdminPass123!".to_string()),
            }),
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let seed = bootstrap(&store);

        seed.run(&full_config()).await.unwrap();
        seed.run(&full_config()).await.unwrap();

        assert_eq!(store.list_permissions().await.unwrap().len(), DEFAULT_PERMISSIONS.len());
        assert_eq!(store.list_roles().await.unwrap().len(), DEFAULT_ROLES.len());
        assert_eq!(store.list_clients().await.unwrap().len(), 1);

        let admin_role = store.find_role_by_name(ADMIN_ROLE).await.unwrap().unwrap();
        assert!(admin_role.is_system);
    }

    #[tokio::test]
    async fn test_admin_holds_every_module() {
        let store = Arc::new(InMemoryStore::new());
        bootstrap(&store).run(&full_config()).await.unwrap();

        let admin = store.find_subject_by_username("admin").await.unwrap().unwrap();
        let resolver = PermissionResolver::new(store.clone(), Duration::from_secs(5));

        for (code, _, _) in DEFAULT_PERMISSIONS {
            assert!(resolver.has_permission(&admin.id, code).await.unwrap(), "{}", code);
        }
    }

    #[tokio::test]
    async fn test_default_client_authenticates() {
        let store = Arc::new(InMemoryStore::new());
        bootstrap(&store).run(&full_config()).await.unwrap();

        let client = store
            .authenticate("default-client", "default-secret")
            .await
            .unwrap()
            .unwrap();
        assert!(client.allows_grant(GrantType::ClientCredentials));
        assert_eq!(client.scopes, vec!["read".to_string(), "write".to_string()]);
    }

    #[tokio::test]
    async fn test_admin_without_seeded_roles_fails() {
        let store = Arc::new(InMemoryStore::new());
        let config = BootstrapConfig {
            seed_defaults: false,
            client: None,
            ..full_config()
        };

        let result = bootstrap(&store).run(&config).await;
        assert!(matches!(result, Err(AccessError::InvalidRole(_))));
    }
}
