use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    models::pipeline::{
        DownloadQuery, DownloadResponse, ErrorResponse, HealthResponse, SignedLinkQuery,
        StartRequest, StartResponse, StatusResponse,
    },
    services::{
        blob_store::BlobStoreError,
        download_links::LinkError,
        orchestrator::{ExecutionHandle, ExecutionStatus},
        order_persistence::find_execution_result,
    },
    AppState,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// Handler for GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Handler for POST /start
/// Launches an execution and returns its id without waiting for it
pub async fn start_execution(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    tracing::info!("Start requested: {:?}", request);

    match state.coordinator.start(request).await {
        Ok(handle) => Ok((
            StatusCode::ACCEPTED,
            Json(StartResponse {
                execution_id: handle.execution_id,
            }),
        )),
        Err(e) => match e.code() {
            Some(code) => {
                tracing::warn!("Start rejected: {}", e);
                Err((
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::with_code(e.to_string(), code)),
                ))
            }
            None => {
                tracing::error!("Failed to start execution: {}", e);
                Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
            }
        },
    }
}

fn status_from_registry(status: ExecutionStatus) -> StatusResponse {
    let output = status.output.and_then(|summary| serde_json::to_value(summary).ok());
    StatusResponse {
        execution_id: status.execution_id,
        status: status.status.as_str().to_string(),
        started_at: status.started_at.to_rfc3339(),
        finished_at: status.finished_at.map(|t| t.to_rfc3339()),
        output,
        error: status.error,
    }
}

/// Handler for GET /status/{execution_id}
/// Live executions come from the registry; older ones from the database
pub async fn get_status(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let handle = ExecutionHandle {
        execution_id: execution_id.clone(),
    };
    if let Some(status) = state.launcher.status(&handle).await {
        return Ok(Json(status_from_registry(status)));
    }

    let not_found = || {
        api_error(
            StatusCode::NOT_FOUND,
            format!("execution {} not found", execution_id),
        )
    };

    let Some(db) = &state.db else {
        return Err(not_found());
    };

    match find_execution_result(db, &execution_id).await {
        Ok(Some(row)) => {
            let result_data = row
                .result_data
                .as_deref()
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok());
            Ok(Json(StatusResponse {
                execution_id: row.execution_arn,
                status: row.status,
                started_at: row.created_at.and_utc().to_rfc3339(),
                finished_at: Some(row.updated_at.and_utc().to_rfc3339()),
                output: Some(json!({
                    "totalSymbols": row.total_symbols,
                    "totalOrders": row.total_orders,
                    "artifactUri": row.artifact_uri,
                    "processingTimeSeconds": row.processing_time_seconds,
                    "resultData": result_data,
                })),
                error: None,
            }))
        }
        Ok(None) => Err(not_found()),
        Err(e) => {
            tracing::error!("Failed to look up execution {}: {}", execution_id, e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "database error"))
        }
    }
}

/// Handler for GET /download?key=...
/// Returns a short-lived signed URL for an artifact
pub async fn get_download_link(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Some(bucket) = state.config.storage.results_bucket.as_deref() else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "RESULTS_BUCKET not configured",
        ));
    };

    let key = query.key.trim();
    if key.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "key required"));
    }
    if !state.blobs.exists(bucket, key).await {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("artifact {} not found", key),
        ));
    }

    match state.links.presign(key, Utc::now().timestamp()) {
        Ok(link) => {
            tracing::debug!("Issued download link for {} (expires {})", key, link.expires_at);
            Ok(Json(DownloadResponse {
                url: link.url,
                expires_at: link.expires_at,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to sign download link for {}: {}", key, e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Handler for GET /artifacts/{*key}
/// Serves an artifact to holders of a valid signed link
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedLinkQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
        return Err(api_error(StatusCode::FORBIDDEN, "signed link required"));
    };

    if let Err(e) = state
        .links
        .verify(&key, expires, signature, Utc::now().timestamp())
    {
        tracing::warn!("Rejected artifact link for {}: {}", key, e);
        let message = match e {
            LinkError::Expired => "link expired",
            _ => "invalid signature",
        };
        return Err(api_error(StatusCode::FORBIDDEN, message));
    }

    let Some(bucket) = state.config.storage.results_bucket.as_deref() else {
        return Err(api_error(StatusCode::NOT_FOUND, "artifact not found"));
    };

    match state.blobs.get_json(bucket, &key).await {
        Ok(document) => Ok(Json(document)),
        Err(BlobStoreError::NotFound { .. }) | Err(BlobStoreError::InvalidKey(_)) => {
            Err(api_error(StatusCode::NOT_FOUND, "artifact not found"))
        }
        Err(e) => {
            tracing::error!("Failed to read artifact {}: {}", key, e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read artifact"))
        }
    }
}
