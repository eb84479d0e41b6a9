//! Fan-in step: merge per-symbol results into one time-ordered artifact and
//! persist it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};

use crate::config::StorageSettings;
use crate::models::extraction::{
    AggregateRequest, AggregateSummary, Artifact, PersistenceReport, SideEffect, SymbolOutcome,
};
use crate::models::order::event_time_ms;
use crate::services::blob_store::BlobStore;
use crate::services::order_persistence::{
    insert_orders, upsert_execution_result, ExecutionSummary, STATUS_SUCCEEDED,
};

/// Stable sort by derived event time; orders without one come first
pub fn sort_by_event_time(orders: &mut [Value]) {
    orders.sort_by_cached_key(event_time_ms);
}

/// Execution ids may be ARNs; keep them usable as a single path segment
pub fn sanitize_execution_id(execution_id: &str) -> String {
    execution_id.replace([':', '/'], "_")
}

/// Deterministic artifact key for a run
pub fn final_key(
    results_prefix: &str,
    start_time_ms: Option<i64>,
    execution_id: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let prefix = results_prefix.trim_end_matches('/');
    match start_time_ms {
        Some(start) => match execution_id.filter(|id| !id.is_empty()) {
            Some(id) => format!("{}/{}-{}.json", prefix, start, sanitize_execution_id(id)),
            None => format!("{}/{}.json", prefix, start),
        },
        None => format!("{}/{}.json", prefix, now.format("%Y/%m/%d/%H-%M-%SZ")),
    }
}

#[derive(Clone)]
pub struct Aggregator {
    blobs: Arc<dyn BlobStore>,
    db: Option<DatabaseConnection>,
    results_bucket: Option<String>,
    results_prefix: String,
}

impl Aggregator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        db: Option<DatabaseConnection>,
        storage: &StorageSettings,
    ) -> Self {
        Self {
            blobs,
            db,
            results_bucket: storage.results_bucket.clone(),
            results_prefix: storage.results_prefix.clone(),
        }
    }

    /// Merge, sort and persist. Persistence is best-effort: the summary status
    /// is always "ok" and each side effect reports its own outcome.
    pub async fn aggregate(&self, request: AggregateRequest) -> AggregateSummary {
        let AggregateRequest {
            results,
            start_time_ms,
            execution_id,
        } = request;

        let total_symbols = results.len();
        let mut failed_symbols = Vec::new();
        let mut orders: Vec<Value> = Vec::new();

        for outcome in results {
            match outcome {
                SymbolOutcome::Inline {
                    orders: inline, ..
                } => orders.extend(inline),
                SymbolOutcome::Spilled {
                    symbol, blob_key, ..
                } => orders.extend(self.load_spilled(&symbol, &blob_key).await),
                SymbolOutcome::Failed { symbol, error } => {
                    tracing::warn!("Symbol {} failed upstream: {}", symbol, error);
                    failed_symbols.push(symbol);
                }
            }
        }

        sort_by_event_time(&mut orders);

        let now = Utc::now();
        let key = final_key(
            &self.results_prefix,
            start_time_ms,
            execution_id.as_deref(),
            now,
        );
        let elapsed_seconds =
            start_time_ms.map(|start| (now.timestamp_millis() - start) as f64 / 1000.0);
        let count = orders.len();

        tracing::info!(
            "Aggregated {} orders from {} symbols ({} failed) into {}",
            count,
            total_symbols,
            failed_symbols.len(),
            key
        );

        let mut persistence = PersistenceReport::default();

        let artifact = Artifact {
            generated_at: now.to_rfc3339(),
            orders,
            count,
            elapsed_seconds,
        };
        let (artifact_effect, artifact_uri) = self.write_artifact(&key, &artifact).await;
        persistence.artifact = artifact_effect;

        if let Some(db) = &self.db {
            let execution_id = execution_id.clone().unwrap_or_else(|| key.clone());

            let summary = ExecutionSummary {
                execution_id: execution_id.clone(),
                status: STATUS_SUCCEEDED.to_string(),
                total_symbols,
                total_orders: count,
                artifact_uri: artifact_uri.clone(),
                result_data: json!({ "count": count }),
                processing_time_seconds: elapsed_seconds,
            };
            persistence.execution_row = match upsert_execution_result(db, &summary).await {
                Ok(()) => SideEffect::Done,
                Err(e) => {
                    tracing::error!("Failed to save execution result {}: {}", execution_id, e);
                    SideEffect::Failed(e.to_string())
                }
            };

            persistence.orders = match insert_orders(db, &execution_id, &artifact.orders).await {
                Ok(report) => {
                    persistence.orders_inserted = report.inserted;
                    SideEffect::Done
                }
                Err(e) => {
                    tracing::error!("Failed to save orders for {}: {}", execution_id, e);
                    SideEffect::Failed(e.to_string())
                }
            };
        }

        AggregateSummary {
            status: "ok".to_string(),
            final_key: key,
            count,
            elapsed_seconds,
            total_symbols,
            failed_symbols,
            artifact_uri,
            persistence,
        }
    }

    async fn load_spilled(&self, symbol: &str, blob_key: &str) -> Vec<Value> {
        let Some(bucket) = self.results_bucket.as_deref() else {
            tracing::warn!(
                "Result for {} points to {} but no results bucket is configured",
                symbol,
                blob_key
            );
            return Vec::new();
        };

        match self.blobs.get_json(bucket, blob_key).await {
            Ok(mut document) => match document.get_mut("orders").map(Value::take) {
                Some(Value::Array(orders)) => orders,
                _ => {
                    tracing::warn!("Blob {}/{} for {} has no orders list", bucket, blob_key, symbol);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!("Could not read {}/{} for {}: {}", bucket, blob_key, symbol, e);
                Vec::new()
            }
        }
    }

    async fn write_artifact(&self, key: &str, artifact: &Artifact) -> (SideEffect, Option<String>) {
        let Some(bucket) = self.results_bucket.as_deref() else {
            return (SideEffect::Skipped, None);
        };

        let document = match serde_json::to_value(artifact) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Could not serialize artifact {}: {}", key, e);
                return (SideEffect::Failed(e.to_string()), None);
            }
        };

        match self.blobs.put_json(bucket, key, &document).await {
            Ok(()) => (SideEffect::Done, Some(self.blobs.uri(bucket, key))),
            Err(e) => {
                tracing::error!("Failed to write artifact {}/{}: {}", bucket, key, e);
                (SideEffect::Failed(e.to_string()), None)
            }
        }
    }
}
