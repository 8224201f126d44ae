use std::sync::Arc;
use std::time::Duration;

use crate::{
    dtos::admin::{
        AssignPermissionRequest, AssignRoleRequest, ClientResponse, CreateClientRequest,
        CreateClientResponse, CreatePermissionRequest, CreateRoleRequest, PermissionResponse,
        RoleDetailResponse, RoleResponse, UpdatePermissionRequest, UpdateRoleRequest,
        UserRolesResponse,
    },
    models::{Client, Permission, Role},
    services::{
        error::AccessError,
        permission::wildcard_prefix,
        stores::{with_deadline, ClientRegistry, LabelUpdate, PermissionStore, StoreResult},
    },
    utils::{generate_client_secret, hash_password, Password},
};

/// Administrative plumbing over permissions, roles, subject assignments and
/// OAuth clients.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn PermissionStore>,
    clients: Arc<dyn ClientRegistry>,
    deadline: Duration,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        clients: Arc<dyn ClientRegistry>,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            clients,
            deadline,
        }
    }

    async fn within<T>(
        &self,
        op: impl std::future::Future<Output = StoreResult<T>>,
    ) -> Result<T, AccessError> {
        with_deadline(self.deadline, op).await
    }

    pub async fn ping(&self) -> Result<(), AccessError> {
        self.within(self.store.ping()).await
    }

    // Permissions

    pub async fn create_permission(
        &self,
        req: CreatePermissionRequest,
    ) -> Result<Permission, AccessError> {
        let permission = Permission::new(
            req.code,
            req.name,
            req.description.unwrap_or_default(),
            req.module,
            req.action,
        );

        self.within(self.store.insert_permission(permission.clone()))
            .await
            .map_err(|e| match e {
                AccessError::Conflict(_) => AccessError::Conflict(format!(
                    "Permission '{}' already exists",
                    permission.code
                )),
                other => other,
            })?;

        tracing::info!(code = %permission.code, "Permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, id: &str) -> Result<Permission, AccessError> {
        self.within(self.store.find_permission(id))
            .await?
            .ok_or_else(|| AccessError::NotFound("Permission".to_string()))
    }

    pub async fn get_permission_by_code(&self, code: &str) -> Result<Permission, AccessError> {
        self.within(self.store.find_permission_by_code(code))
            .await?
            .ok_or_else(|| AccessError::NotFound("Permission".to_string()))
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, AccessError> {
        self.within(self.store.list_permissions()).await
    }

    pub async fn list_permissions_by_module(
        &self,
        module: &str,
    ) -> Result<Vec<Permission>, AccessError> {
        self.within(self.store.list_permissions_by_module(module))
            .await
    }

    pub async fn update_permission(
        &self,
        id: &str,
        req: UpdatePermissionRequest,
    ) -> Result<Permission, AccessError> {
        let update = LabelUpdate {
            name: req.name,
            description: req.description,
        };
        self.within(self.store.update_permission(id, update))
            .await?
            .ok_or_else(|| AccessError::NotFound("Permission".to_string()))
    }

    /// Roles and assignments still naming the code keep it; it simply stops
    /// resolving to a record.
    pub async fn delete_permission(&self, id: &str) -> Result<(), AccessError> {
        if !self.within(self.store.delete_permission(id)).await? {
            return Err(AccessError::NotFound("Permission".to_string()));
        }
        tracing::info!(permission_id = %id, "Permission deleted");
        Ok(())
    }

    /// Every literal code must name a permission record; an active wildcard
    /// must cover at least one.
    async fn ensure_codes_exist(&self, codes: &[String]) -> Result<(), AccessError> {
        let (wildcards, literals): (Vec<&String>, Vec<&String>) = codes
            .iter()
            .partition(|code| wildcard_prefix(code).is_some());

        if !literals.is_empty() {
            let wanted: Vec<String> = literals.iter().map(|c| c.to_string()).collect();
            let found = self
                .within(self.store.find_permissions_by_codes(&wanted))
                .await?;
            if let Some(missing) = wanted
                .iter()
                .find(|code| !found.iter().any(|p| &p.code == *code))
            {
                return Err(AccessError::InvalidPermission(missing.clone()));
            }
        }

        if !wildcards.is_empty() {
            let all = self.within(self.store.list_permissions()).await?;
            for pattern in wildcards {
                let covered = wildcard_prefix(pattern)
                    .map(|prefix| all.iter().any(|p| p.code.starts_with(prefix)))
                    .unwrap_or(false);
                if !covered {
                    return Err(AccessError::InvalidPermission(pattern.clone()));
                }
            }
        }

        Ok(())
    }

    async fn permission_details(&self, codes: &[String]) -> Result<Vec<PermissionResponse>, AccessError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .within(self.store.find_permissions_by_codes(codes))
            .await?
            .into_iter()
            .map(PermissionResponse::from)
            .collect())
    }

    // Roles

    pub async fn create_role(&self, req: CreateRoleRequest) -> Result<Role, AccessError> {
        let mut codes: Vec<String> = Vec::new();
        for code in req.permissions {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        self.ensure_codes_exist(&codes).await?;

        let role = Role::new(req.name, req.description.unwrap_or_default(), codes, false);
        self.within(self.store.insert_role(role.clone()))
            .await
            .map_err(|e| match e {
                AccessError::Conflict(_) => {
                    AccessError::Conflict(format!("Role '{}' already exists", role.name))
                }
                other => other,
            })?;

        tracing::info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    async fn find_role(&self, id: &str) -> Result<Role, AccessError> {
        self.within(self.store.find_role(id))
            .await?
            .ok_or_else(|| AccessError::NotFound("Role".to_string()))
    }

    pub async fn get_role(&self, id: &str) -> Result<RoleDetailResponse, AccessError> {
        let role = self.find_role(id).await?;
        self.role_detail(role).await
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<RoleDetailResponse, AccessError> {
        let role = self
            .within(self.store.find_role_by_name(name))
            .await?
            .ok_or_else(|| AccessError::NotFound("Role".to_string()))?;
        self.role_detail(role).await
    }

    async fn role_detail(&self, role: Role) -> Result<RoleDetailResponse, AccessError> {
        let permission_details = self.permission_details(&role.permissions).await?;
        Ok(RoleDetailResponse {
            role: RoleResponse::from(role),
            permission_details,
        })
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AccessError> {
        self.within(self.store.list_roles()).await
    }

    /// Writes only the name and description, so permission edits running
    /// concurrently are never overwritten.
    pub async fn update_role(&self, id: &str, req: UpdateRoleRequest) -> Result<Role, AccessError> {
        let update = LabelUpdate {
            name: req.name,
            description: req.description,
        };
        let name = update.name.clone();

        match self
            .within(self.store.update_role(id, update))
            .await
            .map_err(|e| match (e, &name) {
                (AccessError::Conflict(_), Some(name)) => {
                    AccessError::Conflict(format!("Role '{}' already exists", name))
                }
                (other, _) => other,
            })? {
            Some(role) => Ok(role),
            // No match is either a missing role or a system role.
            None => {
                let role = self.find_role(id).await?;
                Err(AccessError::ImmutableRole(role.name))
            }
        }
    }

    pub async fn delete_role(&self, id: &str) -> Result<(), AccessError> {
        let role = self.find_role(id).await?;
        if role.is_system {
            return Err(AccessError::ImmutableRole(role.name));
        }

        if !self.within(self.store.delete_role(id)).await? {
            return Err(AccessError::NotFound("Role".to_string()));
        }
        tracing::info!(role_id = %id, name = %role.name, "Role deleted");
        Ok(())
    }

    pub async fn add_role_permission(&self, id: &str, code: &str) -> Result<Role, AccessError> {
        let role = self.find_role(id).await?;
        if role.is_system {
            return Err(AccessError::ImmutableRole(role.name));
        }
        self.ensure_codes_exist(&[code.to_string()]).await?;

        if !self.within(self.store.add_role_permission(id, code)).await? {
            return Err(AccessError::Conflict(format!(
                "Role '{}' already has permission '{}'",
                role.name, code
            )));
        }
        self.find_role(id).await
    }

    pub async fn remove_role_permission(&self, id: &str, code: &str) -> Result<Role, AccessError> {
        let role = self.find_role(id).await?;
        if role.is_system {
            return Err(AccessError::ImmutableRole(role.name));
        }

        if !self.within(self.store.remove_role_permission(id, code)).await? {
            return Err(AccessError::NotFound(format!("Permission '{}' on role", code)));
        }
        self.find_role(id).await
    }

    // Assignments

    pub async fn get_user_roles(&self, user_id: &str) -> Result<UserRolesResponse, AccessError> {
        let assignment = self
            .within(self.store.find_or_create_assignment(user_id))
            .await?;
        let roles = if assignment.roles.is_empty() {
            Vec::new()
        } else {
            self.within(self.store.find_roles(&assignment.roles)).await?
        };

        Ok(UserRolesResponse {
            user_id: assignment.user_id,
            roles: roles.into_iter().map(RoleResponse::from).collect(),
            permissions: assignment.permissions,
        })
    }

    pub async fn assign_role(&self, req: AssignRoleRequest) -> Result<(), AccessError> {
        let role = self
            .within(self.store.find_role(&req.role_id))
            .await?
            .ok_or_else(|| AccessError::InvalidRole(req.role_id.clone()))?;

        if !self
            .within(self.store.add_assignment_role(&req.user_id, &role.id))
            .await?
        {
            return Err(AccessError::Conflict(format!(
                "User already has role '{}'",
                role.name
            )));
        }

        tracing::info!(user_id = %req.user_id, role = %role.name, "Role assigned");
        Ok(())
    }

    pub async fn remove_role(&self, req: AssignRoleRequest) -> Result<(), AccessError> {
        if !self
            .within(self.store.remove_assignment_role(&req.user_id, &req.role_id))
            .await?
        {
            return Err(AccessError::NotFound("Role assignment".to_string()));
        }
        tracing::info!(user_id = %req.user_id, role_id = %req.role_id, "Role removed");
        Ok(())
    }

    pub async fn assign_permission(&self, req: AssignPermissionRequest) -> Result<(), AccessError> {
        self.ensure_codes_exist(std::slice::from_ref(&req.permission_code))
            .await?;

        if !self
            .within(
                self.store
                    .add_assignment_permission(&req.user_id, &req.permission_code),
            )
            .await?
        {
            return Err(AccessError::Conflict(format!(
                "User already has permission '{}'",
                req.permission_code
            )));
        }

        tracing::info!(user_id = %req.user_id, code = %req.permission_code, "Permission assigned");
        Ok(())
    }

    pub async fn remove_permission(&self, req: AssignPermissionRequest) -> Result<(), AccessError> {
        if !self
            .within(
                self.store
                    .remove_assignment_permission(&req.user_id, &req.permission_code),
            )
            .await?
        {
            return Err(AccessError::NotFound("Permission assignment".to_string()));
        }
        tracing::info!(user_id = %req.user_id, code = %req.permission_code, "Permission removed");
        Ok(())
    }

    // Clients

    pub async fn register_client(
        &self,
        req: CreateClientRequest,
    ) -> Result<CreateClientResponse, AccessError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let client_secret = generate_client_secret();

        let secret_hash = hash_password(&Password::new(client_secret.clone()))
            .map_err(|e| AccessError::Internal(anyhow::anyhow!("Failed to hash client secret: {}", e)))?;

        let mut grant_types = Vec::new();
        for grant in req.grant_types {
            if !grant_types.contains(&grant) {
                grant_types.push(grant);
            }
        }

        let client = Client::new(
            client_id.clone(),
            secret_hash.into_string(),
            req.name,
            req.redirect_uris,
            grant_types,
            req.scopes,
        );
        self.within(self.clients.insert_client(client.clone()))
            .await?;

        tracing::info!(client_id = %client.client_id, name = %client.name, "New client registered");

        Ok(CreateClientResponse {
            client_id,
            client_secret,
            name: client.name,
            grant_types: client.grant_types,
            scopes: client.scopes,
        })
    }

    pub async fn get_client(&self, client_id: &str) -> Result<ClientResponse, AccessError> {
        self.within(self.clients.find_client(client_id))
            .await?
            .map(ClientResponse::from)
            .ok_or_else(|| AccessError::NotFound("Client".to_string()))
    }

    pub async fn list_clients(&self) -> Result<Vec<ClientResponse>, AccessError> {
        Ok(self
            .within(self.clients.list_clients())
            .await?
            .into_iter()
            .map(ClientResponse::from)
            .collect())
    }

    pub async fn delete_client(&self, client_id: &str) -> Result<(), AccessError> {
        if !self.within(self.clients.delete_client(client_id)).await? {
            return Err(AccessError::NotFound("Client".to_string()));
        }
        tracing::info!(client_id = %client_id, "Client deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GrantType;
    use crate::services::stores::InMemoryStore;

    fn service() -> (Arc<InMemoryStore>, AdminService) {
        let store = Arc::new(InMemoryStore::new());
        let admin = AdminService::new(store.clone(), store.clone(), Duration::from_secs(5));
        (store, admin)
    }

    fn permission_request(code: &str) -> CreatePermissionRequest {
        CreatePermissionRequest {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            module: None,
            action: None,
        }
    }

    fn role_request(name: &str, permissions: &[&str]) -> CreateRoleRequest {
        CreateRoleRequest {
            name: name.to_string(),
            description: None,
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_permission_code_conflicts() {
        let (_, admin) = service();
        admin.create_permission(permission_request("finanzas:read")).await.unwrap();

        let result = admin.create_permission(permission_request("finanzas:read")).await;
        assert!(matches!(result, Err(AccessError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_role_requires_existing_permissions() {
        let (_, admin) = service();
        admin.create_permission(permission_request("finanzas:read")).await.unwrap();

        let missing = admin
            .create_role(role_request("Analista", &["finanzas:read", "finanzas:write"]))
            .await;
        assert!(matches!(missing, Err(AccessError::InvalidPermission(code)) if code == "finanzas:write"));

        let uncovered = admin.create_role(role_request("Ventas", &["ventas:*"])).await;
        assert!(matches!(uncovered, Err(AccessError::InvalidPermission(_))));

        let role = admin
            .create_role(role_request("Analista", &["finanzas:read", "finanzas:*"]))
            .await
            .unwrap();
        assert!(!role.is_system);

        let detail = admin.get_role_by_name("Analista").await.unwrap();
        assert_eq!(detail.permission_details.len(), 1);
    }

    #[tokio::test]
    async fn test_role_name_is_unique() {
        let (_, admin) = service();
        admin.create_role(role_request("Auditor", &[])).await.unwrap();

        let result = admin.create_role(role_request("Auditor", &[])).await;
        assert!(matches!(result, Err(AccessError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_system_role_is_immutable() {
        let (store, admin) = service();
        admin.create_permission(permission_request("admin:users")).await.unwrap();
        let system = Role::new("Administrador".to_string(), String::new(), vec![], true);
        let id = system.id.clone();
        store.insert_role(system).await.unwrap();

        let update = UpdateRoleRequest {
            name: Some("Root".to_string()),
            description: None,
        };
        assert!(matches!(
            admin.update_role(&id, update).await,
            Err(AccessError::ImmutableRole(_))
        ));
        assert!(matches!(
            admin.add_role_permission(&id, "admin:users").await,
            Err(AccessError::ImmutableRole(_))
        ));
        assert!(matches!(
            admin.remove_role_permission(&id, "admin:users").await,
            Err(AccessError::ImmutableRole(_))
        ));
        assert!(matches!(
            admin.delete_role(&id).await,
            Err(AccessError::ImmutableRole(_))
        ));
        assert!(admin.get_role(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_add_role_permission_rules() {
        let (_, admin) = service();
        admin.create_permission(permission_request("inventario:read")).await.unwrap();
        let role = admin.create_role(role_request("Bodega", &[])).await.unwrap();

        let updated = admin.add_role_permission(&role.id, "inventario:read").await.unwrap();
        assert_eq!(updated.permissions, vec!["inventario:read".to_string()]);

        assert!(matches!(
            admin.add_role_permission(&role.id, "inventario:read").await,
            Err(AccessError::Conflict(_))
        ));
        assert!(matches!(
            admin.add_role_permission(&role.id, "inventario:write").await,
            Err(AccessError::InvalidPermission(_))
        ));

        let updated = admin.remove_role_permission(&role.id, "inventario:read").await.unwrap();
        assert!(updated.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_role_update_keeps_concurrent_permission_edit() {
        let (store, admin) = service();
        admin.create_permission(permission_request("inventario:read")).await.unwrap();
        let role = admin.create_role(role_request("Bodega", &[])).await.unwrap();

        store.set_latency(Duration::from_millis(50));
        let add = admin.add_role_permission(&role.id, "inventario:read");
        let rename = async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            admin
                .update_role(
                    &role.id,
                    UpdateRoleRequest {
                        name: None,
                        description: Some("Operadores de bodega".to_string()),
                    },
                )
                .await
        };
        let (added, renamed) = tokio::join!(add, rename);
        added.unwrap();
        renamed.unwrap();
        store.set_latency(Duration::ZERO);

        let stored = admin.get_role(&role.id).await.unwrap().role;
        assert_eq!(stored.permissions, vec!["inventario:read".to_string()]);
        assert_eq!(stored.description, "Operadores de bodega");
    }

    #[tokio::test]
    async fn test_update_role_and_permission_labels() {
        let (_, admin) = service();
        let permission = admin
            .create_permission(permission_request("inventario:read"))
            .await
            .unwrap();
        admin.create_role(role_request("Auditor", &[])).await.unwrap();
        let role = admin
            .create_role(role_request("Bodega", &["inventario:read"]))
            .await
            .unwrap();

        let updated = admin
            .update_permission(
                &permission.id,
                UpdatePermissionRequest {
                    name: Some("Ver inventario".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ver inventario");
        assert_eq!(updated.code, "inventario:read");

        let renamed = admin
            .update_role(
                &role.id,
                UpdateRoleRequest {
                    name: Some("Almacén".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Almacén");
        assert_eq!(renamed.permissions, vec!["inventario:read".to_string()]);

        let clash = admin
            .update_role(
                &role.id,
                UpdateRoleRequest {
                    name: Some("Auditor".to_string()),
                    description: None,
                },
            )
            .await;
        assert!(matches!(clash, Err(AccessError::Conflict(_))));

        let missing = admin
            .update_role(
                "missing",
                UpdateRoleRequest {
                    name: None,
                    description: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(AccessError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_assignments() {
        let (_, admin) = service();
        admin.create_permission(permission_request("finanzas:read")).await.unwrap();
        let role = admin.create_role(role_request("Lector", &["finanzas:read"])).await.unwrap();

        let assign = |role_id: &str| AssignRoleRequest {
            user_id: "u1".to_string(),
            role_id: role_id.to_string(),
        };

        assert!(matches!(
            admin.assign_role(assign("missing")).await,
            Err(AccessError::InvalidRole(_))
        ));
        admin.assign_role(assign(&role.id)).await.unwrap();
        assert!(matches!(
            admin.assign_role(assign(&role.id)).await,
            Err(AccessError::Conflict(_))
        ));

        let direct = AssignPermissionRequest {
            user_id: "u1".to_string(),
            permission_code: "finanzas:read".to_string(),
        };
        admin.assign_permission(direct).await.unwrap();

        let unknown = AssignPermissionRequest {
            user_id: "u1".to_string(),
            permission_code: "nope:read".to_string(),
        };
        assert!(matches!(
            admin.assign_permission(unknown).await,
            Err(AccessError::InvalidPermission(_))
        ));

        let roles = admin.get_user_roles("u1").await.unwrap();
        assert_eq!(roles.roles.len(), 1);
        assert_eq!(roles.permissions, vec!["finanzas:read".to_string()]);

        admin.remove_role(assign(&role.id)).await.unwrap();
        assert!(admin.get_user_roles("u1").await.unwrap().roles.is_empty());
    }

    #[tokio::test]
    async fn test_registered_client_authenticates_with_returned_secret() {
        let (store, admin) = service();
        let created = admin
            .register_client(CreateClientRequest {
                name: "Reporting".to_string(),
                redirect_uris: vec![],
                grant_types: vec![GrantType::ClientCredentials, GrantType::ClientCredentials],
                scopes: vec!["read".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(created.grant_types, vec![GrantType::ClientCredentials]);
        let client = store
            .authenticate(&created.client_id, &created.client_secret)
            .await
            .unwrap();
        assert!(client.is_some());
        assert!(store
            .authenticate(&created.client_id, "wrong")
            .await
            .unwrap()
            .is_none());

        admin.delete_client(&created.client_id).await.unwrap();
        assert!(matches!(
            admin.get_client(&created.client_id).await,
            Err(AccessError::NotFound(_))
        ));
    }
}
