//! Test helpers for access-service integration tests.
//!
//! Builds an `AppState` over the in-memory store so the router can be driven
//! with `oneshot` without any external services.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::{
        AccessConfig, BootstrapAdmin, BootstrapClient, BootstrapConfig, Environment, MongoConfig,
        OAuthConfig, SecurityConfig,
    },
    models::{Client, GrantType, Subject},
    services::{
        stores::{ClientRegistry, CredentialVerifier, InMemoryStore},
        AdminService, Bootstrap, JwtService, OAuthSettings, PermissionResolver, TokenEngine,
        UserService,
    },
    utils::{hash_password, Password},
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const CLIENT_ID: &str = "c1";
pub const CLIENT_SECRET: &str = "s1";
pub const USERNAME: &str = "u1";
pub const PASSWORD: &str = "p1";
pub const ADMIN_USERNAME: &str = "root";
pub const ADMIN_PASSWORD: &str = "root-password";

pub fn test_config() -> AccessConfig {
    AccessConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        mongodb: MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "unused".to_string(),
            timeout_seconds: 5,
        },
        oauth: OAuthConfig {
            jwt_secret: SecretString::new("integration-test-secret-with-32-bytes!".to_string()),
            access_token_expiry_minutes: 120,
            refresh_token_expiry_hours: 168,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        bootstrap: BootstrapConfig {
            seed_defaults: true,
            client: Some(BootstrapClient {
                client_id: "bootstrap-client".to_string(),
                client_secret: SecretString::new("bootstrap-secret".to_string()),
            }),
            admin: Some(BootstrapAdmin {
                username: ADMIN_USERNAME.to_string(),
                password: SecretString::new(ADMIN_PASSWORD.to_string()),
            }),
        },
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
    pub subject_id: String,
}

impl TestApp {
    /// Seeded with the default catalogue, an administrator, client `c1`/`s1`
    /// allowed every grant with scopes `read write`, and subject `u1`/`p1`
    /// holding no roles.
    pub async fn new() -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryStore::new());
        let deadline = Duration::from_secs(config.mongodb.timeout_seconds);

        Bootstrap::new(store.clone(), store.clone(), store.clone(), deadline)
            .run(&config.bootstrap)
            .await
            .expect("Failed to bootstrap store");

        let secret_hash = hash_password(&Password::new(CLIENT_SECRET)).unwrap();
        store
            .insert_client(Client::new(
                CLIENT_ID.to_string(),
                secret_hash.into_string(),
                "Test client".to_string(),
                vec![],
                vec![
                    GrantType::Password,
                    GrantType::RefreshToken,
                    GrantType::ClientCredentials,
                ],
                vec!["read".to_string(), "write".to_string()],
            ))
            .await
            .unwrap();

        let password_hash = hash_password(&Password::new(PASSWORD)).unwrap();
        let subject = Subject::new(
            USERNAME.to_string(),
            password_hash.into_string(),
            Some("user".to_string()),
        );
        let subject_id = subject.id.clone();
        store.insert_subject(subject).await.unwrap();

        let engine = TokenEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            JwtService::new(&config.oauth.jwt_secret),
            OAuthSettings::from_config(&config.oauth, &config.mongodb).unwrap(),
        );

        let state = AppState {
            config,
            engine: Arc::new(engine),
            resolver: Arc::new(PermissionResolver::new(store.clone(), deadline)),
            admin: Arc::new(AdminService::new(store.clone(), store.clone(), deadline)),
            users: Arc::new(UserService::new(store.clone(), deadline)),
        };

        Self {
            store,
            state,
            subject_id,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Sends the request and returns the status with the decoded JSON body
    /// (`Value::Null` for an empty or non-JSON body).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request("POST", uri, body, token)).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Password grant through the token endpoint; panics unless it succeeds.
    pub async fn login(&self, username: &str, password: &str) -> Value {
        let (status, body) = self
            .post_json(
                "/api/oauth/token",
                serde_json::json!({
                    "grant_type": "password",
                    "client_id": CLIENT_ID,
                    "client_secret": CLIENT_SECRET,
                    "username": username,
                    "password": password,
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub async fn user_token(&self) -> String {
        self.login(USERNAME, PASSWORD).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub async fn admin_id(&self) -> String {
        self.store
            .find_subject_by_username(ADMIN_USERNAME)
            .await
            .unwrap()
            .unwrap()
            .id
    }
}

pub fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
