// src/lib.rs

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::AppConfig;
use services::{
    blob_store::BlobStore,
    coordinator::Coordinator,
    credentials::CredentialResolver,
    download_links::{LinkError, LinkSigner},
    orchestrator::{ExecutionLauncher, LocalOrchestrator},
    secret_store::SecretStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Option<DatabaseConnection>,
    pub blobs: Arc<dyn BlobStore>,
    pub coordinator: Coordinator,
    pub launcher: Arc<dyn ExecutionLauncher>,
    pub links: LinkSigner,
}

impl AppState {
    /// Wire the local orchestrator, coordinator and link signer from configuration
    pub fn new(
        config: AppConfig,
        db: Option<DatabaseConnection>,
        blobs: Arc<dyn BlobStore>,
        secrets: Option<Arc<dyn SecretStore>>,
    ) -> Result<Self, LinkError> {
        let config = Arc::new(config);

        let credentials = CredentialResolver::new(
            config.env_credentials.clone(),
            secrets,
            config.storage.credentials_secret_name.clone(),
        );

        let launcher: Arc<dyn ExecutionLauncher> = Arc::new(LocalOrchestrator::new(
            config.clone(),
            credentials.clone(),
            blobs.clone(),
            db.clone(),
        ));

        let coordinator = Coordinator::new(
            launcher.clone(),
            credentials,
            config.bitget.clone(),
            config.discovery.clone(),
        );

        let links = LinkSigner::new(
            &config.server.download_signing_key,
            &config.server.public_base_url,
            config.server.download_ttl_secs,
        )?;

        Ok(Self {
            config,
            db,
            blobs,
            coordinator,
            launcher,
            links,
        })
    }
}

/// Connect and run migrations when a database is configured
pub async fn connect_database(config: &AppConfig) -> Result<Option<DatabaseConnection>, DbErr> {
    let Some(database_url) = config.storage.database_url.as_deref() else {
        return Ok(None);
    };

    tracing::info!("Connecting to database...");
    let db = Database::connect(database_url).await?;

    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;

    Ok(Some(db))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::pipeline::health))
        .route("/start", post(handlers::pipeline::start_execution))
        .route("/status/{execution_id}", get(handlers::pipeline::get_status))
        .route("/download", get(handlers::pipeline::get_download_link))
        .route("/artifacts/{*key}", get(handlers::pipeline::get_artifact))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub mod config;

pub mod entities {
    pub mod prelude;
    pub mod execution_results;
    pub mod orders;
}

pub mod services {
    pub mod bitget_auth;
    pub mod bitget_orders;
    pub mod credentials;
    pub mod secret_store;
    pub mod blob_store;
    pub mod clock;
    pub mod symbol_discovery;
    pub mod order_extractor;
    pub mod order_persistence;
    pub mod aggregator;
    pub mod fan_out;
    pub mod orchestrator;
    pub mod coordinator;
    pub mod download_links;
}

pub mod models {
    pub mod extraction;
    pub mod order;
    pub mod pipeline;
}

pub mod handlers {
    pub mod pipeline;
}
