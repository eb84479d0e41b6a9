//! Entry point of an execution: settle the symbol list (discovering it when
//! none is given) and hand the run to the launcher.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::config::{BitgetSettings, DiscoverySettings};
use crate::models::extraction::ExecutionInput;
use crate::models::pipeline::StartRequest;
use crate::services::bitget_orders::{BitgetOrderClient, FetchError, OrderPageSource};
use crate::services::credentials::CredentialResolver;
use crate::services::orchestrator::{ExecutionHandle, ExecutionLauncher, LaunchError};
use crate::services::symbol_discovery::SymbolScanner;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("symbols required and auto-detection found none")]
    NoSymbols,

    #[error("symbols required and no Bitget credentials are available for auto-detection")]
    MissingCredentials,

    #[error("symbol discovery unavailable: {0}")]
    Discovery(#[from] FetchError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl CoordinatorError {
    /// Machine-readable code for client errors
    pub fn code(&self) -> Option<&'static str> {
        match self {
            CoordinatorError::NoSymbols => Some("NO_SYMBOLS"),
            CoordinatorError::MissingCredentials => Some("MISSING_CREDENTIALS"),
            _ => None,
        }
    }
}

/// Trim, drop blanks and duplicates, keep first-seen order
pub fn normalize_symbols(symbols: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

#[derive(Clone)]
pub struct Coordinator {
    launcher: Arc<dyn ExecutionLauncher>,
    credentials: CredentialResolver,
    bitget: BitgetSettings,
    discovery: DiscoverySettings,
    scan_source: Option<Arc<dyn OrderPageSource>>,
}

impl Coordinator {
    pub fn new(
        launcher: Arc<dyn ExecutionLauncher>,
        credentials: CredentialResolver,
        bitget: BitgetSettings,
        discovery: DiscoverySettings,
    ) -> Self {
        Self {
            launcher,
            credentials,
            bitget,
            discovery,
            scan_source: None,
        }
    }

    /// Scan through `source` instead of a client built from resolved credentials
    pub fn with_scan_source(mut self, source: Arc<dyn OrderPageSource>) -> Self {
        self.scan_source = Some(source);
        self
    }

    /// Settle the execution input and launch it in the background
    pub async fn start(&self, request: StartRequest) -> Result<ExecutionHandle, CoordinatorError> {
        let input = self.prepare(request).await?;
        tracing::info!(
            "Starting execution for {} symbols ({})",
            input.symbols.len(),
            input.product_type
        );
        Ok(self.launcher.launch(input).await?)
    }

    /// Resolve defaults and the symbol list without launching anything
    pub async fn prepare(&self, request: StartRequest) -> Result<ExecutionInput, CoordinatorError> {
        let product_type = request
            .product_type
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.bitget.default_product_type.clone());

        let mut symbols = normalize_symbols(request.symbols.unwrap_or_default());
        if symbols.is_empty() {
            tracing::info!("No symbols supplied, scanning {} order history", product_type);
            symbols = self.discover(&product_type).await?;
            if symbols.is_empty() {
                return Err(CoordinatorError::NoSymbols);
            }
        }

        Ok(ExecutionInput {
            start_time_ms: Some(
                request
                    .start_time_ms
                    .filter(|t| *t > 0)
                    .unwrap_or_else(|| Utc::now().timestamp_millis()),
            ),
            product_type,
            symbols,
        })
    }

    async fn discover(&self, product_type: &str) -> Result<Vec<String>, CoordinatorError> {
        let credentials = self.credentials.resolve().await;
        if !credentials.is_complete() {
            return Err(CoordinatorError::MissingCredentials);
        }

        let source: Arc<dyn OrderPageSource> = match &self.scan_source {
            Some(source) => source.clone(),
            None => Arc::new(BitgetOrderClient::new(&self.bitget, credentials)?),
        };

        let report = SymbolScanner::new(source.as_ref(), &self.discovery)
            .scan(product_type)
            .await;
        Ok(report.symbols)
    }
}
