use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use std::time::Duration;

use crate::models::{Client, Permission, Role, Subject, TokenPair, UserRoleAssignment};

/// Shared MongoDB handle. Implements every store trait (see `stores::mongo`).
#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    /// `timeout` bounds server selection and connection establishment so a
    /// missing server fails fast instead of hanging the caller.
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::ConfigError(anyhow::anyhow!(e.to_string()))
        })?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name = Some("access-service".to_string());

        let client = MongoClient::with_options(options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "MongoDB client ready");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for access-service");

        create_unique_index(&self.clients(), "client_id", "client_id_idx", false).await?;
        create_unique_index(&self.tokens(), "access_token", "access_token_idx", false).await?;
        // Client-credential pairs have no refresh token; the index skips them.
        create_unique_index(&self.tokens(), "refresh_token", "refresh_token_idx", true).await?;
        create_unique_index(&self.permissions(), "code", "permission_code_idx", false).await?;
        create_unique_index(&self.roles(), "name", "role_name_idx", false).await?;
        create_unique_index(&self.user_roles(), "user_id", "user_roles_user_id_idx", false).await?;
        create_unique_index(&self.users(), "username", "username_idx", false).await?;

        let module_index = IndexModel::builder()
            .keys(doc! { "module": 1 })
            .options(
                IndexOptions::builder()
                    .name("permission_module_idx".to_string())
                    .build(),
            )
            .build();
        self.permissions()
            .create_index(module_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create permission module index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    pub fn clients(&self) -> Collection<Client> {
        self.db.collection("oauth_clients")
    }

    pub fn tokens(&self) -> Collection<TokenPair> {
        self.db.collection("oauth_tokens")
    }

    pub fn users(&self) -> Collection<Subject> {
        self.db.collection("users")
    }

    pub fn permissions(&self) -> Collection<Permission> {
        self.db.collection("permissions")
    }

    pub fn roles(&self) -> Collection<Role> {
        self.db.collection("roles")
    }

    pub fn user_roles(&self) -> Collection<UserRoleAssignment> {
        self.db.collection("user_roles")
    }

    /// Untyped view of a collection, for partial array updates.
    pub(crate) fn documents(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

async fn create_unique_index<T>(
    collection: &Collection<T>,
    field: &str,
    name: &str,
    sparse: bool,
) -> Result<(), AppError>
where
    T: Send + Sync,
{
    let index = IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .sparse(sparse)
                .build(),
        )
        .build();

    collection.create_index(index, None).await.map_err(|e| {
        tracing::error!("Failed to create {} index: {}", name, e);
        AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
    })?;
    Ok(())
}
