use std::env;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bitget_orders_pipeline::config::AppConfig;
use bitget_orders_pipeline::connect_database;
use bitget_orders_pipeline::models::pipeline::StartRequest;
use bitget_orders_pipeline::services::blob_store::{BlobStore, FsBlobStore};
use bitget_orders_pipeline::services::coordinator::Coordinator;
use bitget_orders_pipeline::services::credentials::CredentialResolver;
use bitget_orders_pipeline::services::orchestrator::LocalOrchestrator;
use bitget_orders_pipeline::services::secret_store::{FileSecretStore, SecretStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Logs go to stderr so stdout carries only the summary
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bitget_orders_pipeline=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let symbols: Vec<String> = env::args().skip(1).collect();
    if symbols.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: cargo run --bin extract_orders [SYMBOL ...]");
        eprintln!("Example: cargo run --bin extract_orders BTCUSDT ETHUSDT");
        eprintln!("Without symbols, traded symbols are discovered from the order history.");
        return Ok(());
    }

    let config = AppConfig::from_env();
    config.log_warnings();

    let db = connect_database(&config).await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.blob_root));
    let secrets: Arc<dyn SecretStore> = Arc::new(FileSecretStore::new(&config.storage.secrets_dir));

    let credentials = CredentialResolver::new(
        config.env_credentials.clone(),
        Some(secrets),
        config.storage.credentials_secret_name.clone(),
    );

    let config = Arc::new(config);
    let orchestrator = Arc::new(LocalOrchestrator::new(
        config.clone(),
        credentials.clone(),
        blobs,
        db,
    ));
    let coordinator = Coordinator::new(
        orchestrator.clone(),
        credentials,
        config.bitget.clone(),
        config.discovery.clone(),
    );

    let input = match coordinator
        .prepare(StartRequest {
            symbols: Some(symbols),
            ..StartRequest::default()
        })
        .await
    {
        Ok(input) => input,
        Err(e) => {
            tracing::error!("❌ Cannot start extraction: {}", e);
            std::process::exit(2);
        }
    };

    tracing::info!(
        "🚀 Extracting {} symbols: {}",
        input.symbols.len(),
        input.symbols.join(", ")
    );

    let pipeline = orchestrator.build_pipeline(&input.product_type).await?;
    let summary = pipeline.run(&input, None).await;

    if summary.failed_symbols.is_empty() {
        tracing::info!("✅ Extracted {} orders into {}", summary.count, summary.final_key);
    } else {
        tracing::warn!(
            "Extracted {} orders into {}; failed symbols: {}",
            summary.count,
            summary.final_key,
            summary.failed_symbols.join(", ")
        );
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
