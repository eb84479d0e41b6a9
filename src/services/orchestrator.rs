//! Runs executions in the background (fan-out, then aggregation) and tracks
//! their state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::extraction::{AggregateRequest, AggregateSummary, ExecutionInput, SymbolTask};
use crate::services::aggregator::Aggregator;
use crate::services::bitget_orders::{BitgetOrderClient, FetchError};
use crate::services::blob_store::BlobStore;
use crate::services::clock::{Clock, TokioClock};
use crate::services::credentials::CredentialResolver;
use crate::services::fan_out::{FanOut, LocalFanOut};
use crate::services::order_extractor::OrderExtractor;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("could not build exchange client: {0}")]
    Client(#[from] FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHandle {
    pub execution_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Running,
    Succeeded,
    Failed,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Running => "RUNNING",
            ExecutionState::Succeeded => "SUCCEEDED",
            ExecutionState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    pub execution_id: String,
    pub status: ExecutionState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<AggregateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait ExecutionLauncher: Send + Sync {
    /// Start an execution and return without waiting for it
    async fn launch(&self, input: ExecutionInput) -> Result<ExecutionHandle, LaunchError>;

    async fn status(&self, handle: &ExecutionHandle) -> Option<ExecutionStatus>;
}

/// Fan-out followed by aggregation
pub struct Pipeline {
    fan_out: Arc<dyn FanOut>,
    aggregator: Aggregator,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(fan_out: Arc<dyn FanOut>, aggregator: Aggregator, concurrency: usize) -> Self {
        Self {
            fan_out,
            aggregator,
            concurrency,
        }
    }

    pub async fn run(&self, input: &ExecutionInput, execution_id: Option<&str>) -> AggregateSummary {
        let tasks = input
            .symbols
            .iter()
            .map(|symbol| SymbolTask {
                symbol: symbol.clone(),
                product_type: Some(input.product_type.clone()),
            })
            .collect();

        let results = self.fan_out.run(tasks, self.concurrency).await;

        self.aggregator
            .aggregate(AggregateRequest {
                results,
                start_time_ms: input.start_time_ms,
                execution_id: execution_id.map(str::to_string),
            })
            .await
    }
}

/// In-process orchestrator with an in-memory execution registry
#[derive(Clone)]
pub struct LocalOrchestrator {
    config: Arc<AppConfig>,
    credentials: CredentialResolver,
    blobs: Arc<dyn BlobStore>,
    db: Option<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    registry: Arc<RwLock<HashMap<String, ExecutionStatus>>>,
}

impl LocalOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        credentials: CredentialResolver,
        blobs: Arc<dyn BlobStore>,
        db: Option<DatabaseConnection>,
    ) -> Self {
        Self {
            config,
            credentials,
            blobs,
            db,
            clock: Arc::new(TokioClock),
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wire a pipeline against the live exchange client with freshly resolved credentials
    pub async fn build_pipeline(&self, product_type: &str) -> Result<Pipeline, LaunchError> {
        let credentials = self.credentials.resolve().await;
        if !credentials.is_complete() {
            tracing::warn!("Launching without complete Bitget credentials; requests will be rejected");
        }

        let client = BitgetOrderClient::new(&self.config.bitget, credentials)?;
        let extractor = OrderExtractor::new(
            Arc::new(client),
            self.blobs.clone(),
            self.config.extraction.clone(),
            &self.config.storage,
        )
        .with_clock(self.clock.clone())
        .with_default_product_type(product_type);

        let aggregator = Aggregator::new(self.blobs.clone(), self.db.clone(), &self.config.storage);

        Ok(Pipeline::new(
            Arc::new(LocalFanOut::new(Arc::new(extractor))),
            aggregator,
            self.config.server.max_concurrency,
        ))
    }

    /// Forget executions that finished more than `status_retention` before `now`.
    /// The database row stays available to `/status`.
    fn prune_finished(&self, now: DateTime<Utc>) {
        let Ok(retention) = chrono::Duration::from_std(self.config.server.status_retention) else {
            return;
        };
        let cutoff = now - retention;

        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|_, entry| entry.finished_at.is_none_or(|finished| finished > cutoff));
        let pruned = before - registry.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} finished executions from the status registry", pruned);
        }
    }

    fn finish(&self, execution_id: &str, result: Result<AggregateSummary, String>) {
        let mut registry = self.registry.write();
        let Some(entry) = registry.get_mut(execution_id) else {
            return;
        };
        entry.finished_at = Some(Utc::now());
        match result {
            Ok(summary) => {
                entry.status = ExecutionState::Succeeded;
                entry.output = Some(summary);
            }
            Err(error) => {
                entry.status = ExecutionState::Failed;
                entry.error = Some(error);
            }
        }
    }
}

#[async_trait]
impl ExecutionLauncher for LocalOrchestrator {
    async fn launch(&self, input: ExecutionInput) -> Result<ExecutionHandle, LaunchError> {
        let pipeline = self.build_pipeline(&input.product_type).await?;
        let execution_id = format!("exec-{}", Uuid::new_v4());
        self.prune_finished(Utc::now());

        self.registry.write().insert(
            execution_id.clone(),
            ExecutionStatus {
                execution_id: execution_id.clone(),
                status: ExecutionState::Running,
                started_at: Utc::now(),
                finished_at: None,
                output: None,
                error: None,
            },
        );

        tracing::info!(
            "Launched execution {} for {} symbols",
            execution_id,
            input.symbols.len()
        );

        let orchestrator = self.clone();
        let id = execution_id.clone();
        tokio::spawn(async move {
            let run_id = id.clone();
            let run = tokio::spawn(async move { pipeline.run(&input, Some(&run_id)).await });

            match run.await {
                Ok(summary) => {
                    tracing::info!("Execution {} succeeded with {} orders", id, summary.count);
                    orchestrator.finish(&id, Ok(summary));
                }
                Err(e) => {
                    tracing::error!("Execution {} failed: {}", id, e);
                    orchestrator.finish(&id, Err(e.to_string()));
                }
            }
        });

        Ok(ExecutionHandle { execution_id })
    }

    async fn status(&self, handle: &ExecutionHandle) -> Option<ExecutionStatus> {
        self.registry.read().get(&handle.execution_id).cloned()
    }
}
