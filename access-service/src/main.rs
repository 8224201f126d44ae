use access_service::{
    build_router,
    config::AccessConfig,
    services::{
        AdminService, Bootstrap, JwtService, MongoDb, OAuthSettings, PermissionResolver,
        TokenEngine, UserService,
    },
    AppState,
};
use service_core::observability::{init_metrics, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AccessConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting access service"
    );

    let deadline = Duration::from_secs(config.mongodb.timeout_seconds);
    let db = Arc::new(MongoDb::connect(&config.mongodb.uri, &config.mongodb.database, deadline).await?);
    db.initialize_indexes().await?;
    tracing::info!("Database initialized successfully");

    Bootstrap::new(db.clone(), db.clone(), db.clone(), deadline)
        .run(&config.bootstrap)
        .await?;

    let jwt = JwtService::new(&config.oauth.jwt_secret);
    let engine = TokenEngine::new(
        db.clone(),
        db.clone(),
        db.clone(),
        jwt,
        OAuthSettings::from_config(&config.oauth, &config.mongodb)?,
    );
    let resolver = PermissionResolver::new(db.clone(), deadline);
    let admin = AdminService::new(db.clone(), db.clone(), deadline);
    let users = UserService::new(db.clone(), deadline);

    let state = AppState {
        config: config.clone(),
        engine: Arc::new(engine),
        resolver: Arc::new(resolver),
        admin: Arc::new(admin),
        users: Arc::new(users),
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Duration::from_secs(
            config.common.shutdown_grace_seconds,
        )))
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Let in-flight requests drain before the listener closes
    tokio::time::sleep(grace).await;
}
