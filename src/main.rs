use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bitget_orders_pipeline::{
    build_router, config::AppConfig, connect_database,
    services::{
        blob_store::FsBlobStore,
        secret_store::{FileSecretStore, SecretStore},
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bitget_orders_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    config.log_warnings();

    let db = connect_database(&config).await?;

    let blobs = Arc::new(FsBlobStore::new(&config.storage.blob_root));
    let secrets: Arc<dyn SecretStore> = Arc::new(FileSecretStore::new(&config.storage.secrets_dir));
    let bind_addr = config.server.bind_addr.clone();

    let state = AppState::new(config, db, blobs, Some(secrets))?;
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
