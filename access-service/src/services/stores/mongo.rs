use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde::de::DeserializeOwned;

use super::{
    ClientRegistry, CredentialVerifier, LabelUpdate, PermissionStore, StoreError, StoreResult,
    SubjectUpdate, TokenStore,
};
use crate::models::{
    Client, Permission, Role, Subject, SubjectStatus, TokenPair, UserRoleAssignment,
};
use crate::services::MongoDb;

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn store_error(operation: &str, err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        tracing::debug!(operation = %operation, "Duplicate key rejected");
        return StoreError::Duplicate(operation.to_string());
    }
    tracing::error!(operation = %operation, error = %err, "MongoDB operation failed");
    StoreError::Unavailable(err.to_string())
}

async fn collect<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Document,
    operation: &str,
) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder().sort(sort).build();
    collection
        .find(filter, options)
        .await
        .map_err(|e| store_error(operation, e))?
        .try_collect()
        .await
        .map_err(|e| store_error(operation, e))
}

fn touched() -> Document {
    doc! { "updated_at": BsonDateTime::now() }
}

fn return_after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn label_set(update: LabelUpdate) -> Document {
    let mut set = touched();
    if let Some(name) = update.name {
        set.insert("name", name);
    }
    if let Some(description) = update.description {
        set.insert("description", description);
    }
    set
}

fn subject_set(update: SubjectUpdate) -> StoreResult<Document> {
    let mut set = touched();
    if let Some(username) = update.username {
        set.insert("username", username);
    }
    if let Some(role) = update.role {
        set.insert("role", role);
    }
    if let Some(status) = update.status {
        let value =
            bson::to_bson(&status).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        set.insert("status", value);
        let archived_at = if status == SubjectStatus::Archived {
            Bson::DateTime(BsonDateTime::now())
        } else {
            Bson::Null
        };
        set.insert("archived_at", archived_at);
    }
    if let Some(password_hash) = update.password_hash {
        set.insert("password_hash", password_hash);
    }
    Ok(set)
}

#[async_trait]
impl ClientRegistry for MongoDb {
    async fn find_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        self.clients()
            .find_one(doc! { "client_id": client_id }, None)
            .await
            .map_err(|e| store_error("find_client", e))
    }

    async fn insert_client(&self, client: Client) -> StoreResult<()> {
        self.clients()
            .insert_one(&client, None)
            .await
            .map_err(|e| store_error("insert_client", e))?;
        Ok(())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        collect(&self.clients(), doc! {}, doc! { "client_id": 1 }, "list_clients").await
    }

    async fn delete_client(&self, client_id: &str) -> StoreResult<bool> {
        let result = self
            .clients()
            .delete_one(doc! { "client_id": client_id }, None)
            .await
            .map_err(|e| store_error("delete_client", e))?;
        Ok(result.deleted_count == 1)
    }
}

#[async_trait]
impl TokenStore for MongoDb {
    async fn insert_pair(&self, pair: TokenPair) -> StoreResult<()> {
        self.tokens()
            .insert_one(&pair, None)
            .await
            .map_err(|e| store_error("insert_pair", e))?;
        Ok(())
    }

    async fn find_by_access_token(&self, access_token: &str) -> StoreResult<Option<TokenPair>> {
        self.tokens()
            .find_one(doc! { "access_token": access_token }, None)
            .await
            .map_err(|e| store_error("find_by_access_token", e))
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> StoreResult<Option<TokenPair>> {
        self.tokens()
            .find_one(doc! { "refresh_token": refresh_token }, None)
            .await
            .map_err(|e| store_error("find_by_refresh_token", e))
    }

    async fn delete_by_refresh_token(&self, refresh_token: &str) -> StoreResult<bool> {
        // deleted_count is reported per operation, so of two racing deletes
        // only one observes 1.
        let result = self
            .tokens()
            .delete_one(doc! { "refresh_token": refresh_token }, None)
            .await
            .map_err(|e| store_error("delete_by_refresh_token", e))?;
        Ok(result.deleted_count == 1)
    }
}

#[async_trait]
impl CredentialVerifier for MongoDb {
    async fn find_subject(&self, subject_id: &str) -> StoreResult<Option<Subject>> {
        self.users()
            .find_one(doc! { "_id": subject_id }, None)
            .await
            .map_err(|e| store_error("find_subject", e))
    }

    async fn find_subject_by_username(&self, username: &str) -> StoreResult<Option<Subject>> {
        self.users()
            .find_one(doc! { "username": username }, None)
            .await
            .map_err(|e| store_error("find_subject_by_username", e))
    }

    async fn insert_subject(&self, subject: Subject) -> StoreResult<()> {
        self.users()
            .insert_one(&subject, None)
            .await
            .map_err(|e| store_error("insert_subject", e))?;
        Ok(())
    }

    async fn list_subjects(&self, status: Option<SubjectStatus>) -> StoreResult<Vec<Subject>> {
        let filter = match status {
            Some(status) => {
                let value =
                    bson::to_bson(&status).map_err(|e| StoreError::Unavailable(e.to_string()))?;
                doc! { "status": value }
            }
            None => doc! {},
        };
        collect(&self.users(), filter, doc! { "username": 1 }, "list_subjects").await
    }

    async fn update_subject(
        &self,
        subject_id: &str,
        update: SubjectUpdate,
    ) -> StoreResult<Option<Subject>> {
        let set = subject_set(update)?;
        self.users()
            .find_one_and_update(
                doc! { "_id": subject_id },
                doc! { "$set": set },
                return_after(),
            )
            .await
            .map_err(|e| store_error("update_subject", e))
    }

    async fn delete_subject(&self, subject_id: &str) -> StoreResult<bool> {
        let result = self
            .users()
            .delete_one(doc! { "_id": subject_id }, None)
            .await
            .map_err(|e| store_error("delete_subject", e))?;
        Ok(result.deleted_count == 1)
    }

    async fn swap_refresh_token(
        &self,
        subject_id: &str,
        refresh_token: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let value = refresh_token.map_or(Bson::Null, |rt| Bson::String(rt.to_string()));
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let previous = self
            .users()
            .find_one_and_update(
                doc! { "_id": subject_id },
                doc! { "$set": { "refresh_token": value, "updated_at": BsonDateTime::now() } },
                options,
            )
            .await
            .map_err(|e| store_error("swap_refresh_token", e))?;
        Ok(previous.and_then(|subject| subject.refresh_token))
    }

    async fn clear_refresh_token(&self, refresh_token: &str) -> StoreResult<()> {
        self.users()
            .update_many(
                doc! { "refresh_token": refresh_token },
                doc! { "$set": { "refresh_token": Bson::Null, "updated_at": BsonDateTime::now() } },
                None,
            )
            .await
            .map_err(|e| store_error("clear_refresh_token", e))?;
        Ok(())
    }
}

impl MongoDb {
    async fn push_unique(
        &self,
        collection: &str,
        filter: Document,
        field: &str,
        value: &str,
        operation: &str,
    ) -> StoreResult<bool> {
        let mut filter = filter;
        filter.insert(field, doc! { "$ne": value });
        let result = self
            .documents(collection)
            .update_one(
                filter,
                doc! { "$push": { field: value }, "$set": touched() },
                None,
            )
            .await
            .map_err(|e| store_error(operation, e))?;
        Ok(result.modified_count == 1)
    }

    async fn pull(
        &self,
        collection: &str,
        filter: Document,
        field: &str,
        value: &str,
        operation: &str,
    ) -> StoreResult<bool> {
        let mut filter = filter;
        filter.insert(field, value);
        let result = self
            .documents(collection)
            .update_one(
                filter,
                doc! { "$pull": { field: value }, "$set": touched() },
                None,
            )
            .await
            .map_err(|e| store_error(operation, e))?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl PermissionStore for MongoDb {
    async fn insert_permission(&self, permission: Permission) -> StoreResult<()> {
        self.permissions()
            .insert_one(&permission, None)
            .await
            .map_err(|e| store_error("insert_permission", e))?;
        Ok(())
    }

    async fn find_permission(&self, id: &str) -> StoreResult<Option<Permission>> {
        self.permissions()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| store_error("find_permission", e))
    }

    async fn find_permission_by_code(&self, code: &str) -> StoreResult<Option<Permission>> {
        self.permissions()
            .find_one(doc! { "code": code }, None)
            .await
            .map_err(|e| store_error("find_permission_by_code", e))
    }

    async fn find_permissions_by_codes(&self, codes: &[String]) -> StoreResult<Vec<Permission>> {
        collect(
            &self.permissions(),
            doc! { "code": { "$in": codes } },
            doc! { "code": 1 },
            "find_permissions_by_codes",
        )
        .await
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        collect(&self.permissions(), doc! {}, doc! { "code": 1 }, "list_permissions").await
    }

    async fn list_permissions_by_module(&self, module: &str) -> StoreResult<Vec<Permission>> {
        collect(
            &self.permissions(),
            doc! { "module": module },
            doc! { "code": 1 },
            "list_permissions_by_module",
        )
        .await
    }

    async fn update_permission(
        &self,
        id: &str,
        update: LabelUpdate,
    ) -> StoreResult<Option<Permission>> {
        self.permissions()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": label_set(update) },
                return_after(),
            )
            .await
            .map_err(|e| store_error("update_permission", e))
    }

    async fn delete_permission(&self, id: &str) -> StoreResult<bool> {
        let result = self
            .permissions()
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| store_error("delete_permission", e))?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_role(&self, role: Role) -> StoreResult<()> {
        self.roles()
            .insert_one(&role, None)
            .await
            .map_err(|e| store_error("insert_role", e))?;
        Ok(())
    }

    async fn find_role(&self, id: &str) -> StoreResult<Option<Role>> {
        self.roles()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| store_error("find_role", e))
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        self.roles()
            .find_one(doc! { "name": name }, None)
            .await
            .map_err(|e| store_error("find_role_by_name", e))
    }

    async fn find_roles(&self, ids: &[String]) -> StoreResult<Vec<Role>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        collect(
            &self.roles(),
            doc! { "_id": { "$in": ids } },
            doc! { "name": 1 },
            "find_roles",
        )
        .await
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        collect(&self.roles(), doc! {}, doc! { "name": 1 }, "list_roles").await
    }

    async fn update_role(&self, id: &str, update: LabelUpdate) -> StoreResult<Option<Role>> {
        self.roles()
            .find_one_and_update(
                doc! { "_id": id, "is_system": false },
                doc! { "$set": label_set(update) },
                return_after(),
            )
            .await
            .map_err(|e| store_error("update_role", e))
    }

    async fn delete_role(&self, id: &str) -> StoreResult<bool> {
        let result = self
            .roles()
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| store_error("delete_role", e))?;
        Ok(result.deleted_count == 1)
    }

    async fn add_role_permission(&self, role_id: &str, code: &str) -> StoreResult<bool> {
        self.push_unique(
            "roles",
            doc! { "_id": role_id },
            "permissions",
            code,
            "add_role_permission",
        )
        .await
    }

    async fn remove_role_permission(&self, role_id: &str, code: &str) -> StoreResult<bool> {
        self.pull(
            "roles",
            doc! { "_id": role_id },
            "permissions",
            code,
            "remove_role_permission",
        )
        .await
    }

    async fn find_or_create_assignment(&self, user_id: &str) -> StoreResult<UserRoleAssignment> {
        let mut defaults = bson::to_document(&UserRoleAssignment::empty(user_id))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        defaults.remove("user_id");

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let upserted = self
            .user_roles()
            .find_one_and_update(
                doc! { "user_id": user_id },
                doc! { "$setOnInsert": defaults },
                options,
            )
            .await;

        match upserted {
            Ok(Some(assignment)) => Ok(assignment),
            // Lost an upsert race to a concurrent creator; its document is there now.
            Err(e) if is_duplicate_key(&e) => self
                .user_roles()
                .find_one(doc! { "user_id": user_id }, None)
                .await
                .map_err(|e| store_error("find_or_create_assignment", e))?
                .ok_or_else(|| StoreError::Unavailable("assignment vanished after upsert".into())),
            Ok(None) => Err(StoreError::Unavailable(
                "upsert returned no assignment".to_string(),
            )),
            Err(e) => Err(store_error("find_or_create_assignment", e)),
        }
    }

    async fn add_assignment_role(&self, user_id: &str, role_id: &str) -> StoreResult<bool> {
        self.find_or_create_assignment(user_id).await?;
        self.push_unique(
            "user_roles",
            doc! { "user_id": user_id },
            "roles",
            role_id,
            "add_assignment_role",
        )
        .await
    }

    async fn remove_assignment_role(&self, user_id: &str, role_id: &str) -> StoreResult<bool> {
        self.pull(
            "user_roles",
            doc! { "user_id": user_id },
            "roles",
            role_id,
            "remove_assignment_role",
        )
        .await
    }

    async fn add_assignment_permission(&self, user_id: &str, code: &str) -> StoreResult<bool> {
        self.find_or_create_assignment(user_id).await?;
        self.push_unique(
            "user_roles",
            doc! { "user_id": user_id },
            "permissions",
            code,
            "add_assignment_permission",
        )
        .await
    }

    async fn remove_assignment_permission(&self, user_id: &str, code: &str) -> StoreResult<bool> {
        self.pull(
            "user_roles",
            doc! { "user_id": user_id },
            "permissions",
            code,
            "remove_assignment_permission",
        )
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.health_check()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
