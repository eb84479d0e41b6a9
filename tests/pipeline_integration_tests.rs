mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use bitget_orders_pipeline::{
    build_router,
    config::BitgetSettings,
    entities::{orders, prelude::Orders},
    models::{extraction::ExecutionInput, extraction::SideEffect},
    services::{
        bitget_orders::{BitgetOrderClient, FetchError, OrderPageSource, PageRequest, TimestampUnit},
        blob_store::{BlobStore, MemoryBlobStore},
        clock::ManualClock,
        credentials::{CredentialResolver, Credentials},
        orchestrator::LocalOrchestrator,
        order_persistence::{upsert_execution_result, ExecutionSummary},
    },
    AppState,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::Value;
use tower::ServiceExt;

use crate::common::{
    order, setup_test_db, spawn_mock_exchange, test_config, test_credentials, MockExchange,
    PLAN_ORDERS_PATH,
};

fn two_symbol_history() -> Vec<Value> {
    vec![
        order(1, "BTCUSDT", 1_700_000_000_300),
        order(2, "BTCUSDT", 1_700_000_000_100),
        order(3, "BTCUSDT", 1_700_000_000_500),
        order(4, "ETHUSDT", 1_700_000_000_200),
        order(5, "ETHUSDT", 1_700_000_000_600),
        order(6, "ETHUSDT", 1_700_000_000_400),
    ]
}

/// End to end: two symbols with three orders each, run in the foreground
#[tokio::test]
async fn test_pipeline_merges_and_persists_two_symbols() {
    let exchange = Arc::new(MockExchange::with_orders(two_symbol_history()));
    let base_url = spawn_mock_exchange(exchange.clone()).await;
    let config = Arc::new(test_config(&base_url, test_credentials()));

    let db = setup_test_db().await.expect("Failed to set up test DB");
    let blobs = Arc::new(MemoryBlobStore::new());
    let clock = ManualClock::new();

    let orchestrator = LocalOrchestrator::new(
        config.clone(),
        CredentialResolver::fixed(test_credentials()),
        blobs.clone(),
        Some(db.clone()),
    )
    .with_clock(Arc::new(clock.clone()));

    let input = ExecutionInput {
        start_time_ms: Some(1_700_000_000_000),
        product_type: "USDT-FUTURES".to_string(),
        symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
    };

    let pipeline = orchestrator.build_pipeline(&input.product_type).await.unwrap();
    let summary = pipeline.run(&input, None).await;

    assert_eq!(summary.status, "ok");
    assert_eq!(summary.count, 6);
    assert_eq!(summary.final_key, "bitget-orders/1700000000000.json");
    assert!(summary.failed_symbols.is_empty());
    assert_eq!(summary.persistence.artifact, SideEffect::Done);
    assert_eq!(summary.persistence.orders, SideEffect::Done);
    assert_eq!(summary.persistence.orders_inserted, 6);

    // Artifact is sorted by cTime across both symbols
    let artifact = blobs.get_json("results", &summary.final_key).await.unwrap();
    assert_eq!(artifact["count"], 6);
    let times: Vec<&str> = artifact["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["cTime"].as_str().unwrap())
        .collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);
    assert_eq!(times.first(), Some(&"1700000000100"));

    // Rows land under the final key when no execution id was given
    let stored = Orders::find()
        .filter(orders::Column::ExecutionArn.eq("bitget-orders/1700000000000.json"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stored, 6);

    // Every request was signed and paginated per symbol
    let requests = exchange.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|r| r.access_key.as_deref() == Some("test-key")));
    assert!(requests.iter().all(|r| r.access_sign.as_deref().is_some_and(|s| s.len() == 44)));
    assert!(requests
        .iter()
        .all(|r| r.params.get("productType").map(String::as_str) == Some("USDT-FUTURES")));
    let btc_cursor: Vec<_> = requests
        .iter()
        .filter(|r| r.params.get("symbol").map(String::as_str) == Some("BTCUSDT"))
        .map(|r| r.params.get("idLessThan").cloned())
        .collect();
    assert_eq!(btc_cursor, vec![None, Some("1".to_string())]);
}

#[tokio::test]
async fn test_pipeline_isolates_failing_symbol() {
    let mut exchange = MockExchange::with_orders(two_symbol_history());
    exchange.failing.insert("ETHUSDT".to_string(), 403);
    let exchange = Arc::new(exchange);
    let base_url = spawn_mock_exchange(exchange.clone()).await;
    let config = Arc::new(test_config(&base_url, test_credentials()));

    let blobs = Arc::new(MemoryBlobStore::new());
    let orchestrator = LocalOrchestrator::new(
        config,
        CredentialResolver::fixed(test_credentials()),
        blobs,
        None,
    )
    .with_clock(Arc::new(ManualClock::new()));

    let input = ExecutionInput {
        start_time_ms: Some(1_700_000_000_000),
        product_type: "USDT-FUTURES".to_string(),
        symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
    };
    let summary = orchestrator
        .build_pipeline("USDT-FUTURES")
        .await
        .unwrap()
        .run(&input, None)
        .await;

    assert_eq!(summary.status, "ok");
    assert_eq!(summary.count, 3);
    assert_eq!(summary.failed_symbols, vec!["ETHUSDT"]);
    assert_eq!(summary.persistence.orders, SideEffect::Skipped);

    // 403 is fatal: exactly one ETHUSDT request
    let eth_requests = exchange
        .requests()
        .iter()
        .filter(|r| r.params.get("symbol").map(String::as_str) == Some("ETHUSDT"))
        .count();
    assert_eq!(eth_requests, 1);
}

fn client_for(base_url: &str, credentials: Credentials) -> BitgetOrderClient {
    let settings = BitgetSettings {
        base_url: base_url.to_string(),
        ..BitgetSettings::default()
    };
    BitgetOrderClient::new(&settings, credentials).unwrap()
}

#[tokio::test]
async fn test_client_signs_post_with_overrides() {
    let exchange = Arc::new(MockExchange::with_orders(two_symbol_history()));
    let base_url = spawn_mock_exchange(exchange.clone()).await;
    let client = client_for(&base_url, test_credentials());

    let request = PageRequest::new("BTCUSDT")
        .param("clientOid", "batch 7&retry")
        .with_path(PLAN_ORDERS_PATH)
        .with_method(Method::POST)
        .with_body(serde_json::json!({"productType": "USDT-FUTURES", "limit": "2"}))
        .with_timestamp_unit(TimestampUnit::Seconds);

    // The mock rejects any signature that does not cover the request as sent
    let page = client.fetch_page(&request).await.unwrap();
    let ids: Vec<&str> = page.iter().map(|o| o["orderId"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["3", "2"]);

    let requests = exchange.requests();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.path, PLAN_ORDERS_PATH);
    assert_eq!(sent.params.get("clientOid").map(String::as_str), Some("batch 7&retry"));
    assert_eq!(sent.params.get("symbol").map(String::as_str), Some("BTCUSDT"));
    let body: Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(body, serde_json::json!({"productType": "USDT-FUTURES", "limit": "2"}));
    let timestamp = sent.access_timestamp.as_deref().unwrap();
    assert_eq!(timestamp.len(), 10);
    assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn test_client_with_wrong_secret_is_rejected() {
    let exchange = Arc::new(MockExchange::with_orders(two_symbol_history()));
    let base_url = spawn_mock_exchange(exchange).await;
    let client = client_for(
        &base_url,
        Credentials {
            secret_key: "not-the-secret".to_string(),
            ..test_credentials()
        },
    );

    let err = client.fetch_page(&PageRequest::new("BTCUSDT")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 401, .. }));
    assert!(!err.is_retryable());
}

async fn build_test_router(credentials: Credentials, history: Vec<Value>) -> (Router, Arc<MemoryBlobStore>) {
    let exchange = Arc::new(MockExchange::with_orders(history));
    let base_url = spawn_mock_exchange(exchange).await;
    let config = test_config(&base_url, credentials);

    let db = setup_test_db().await.expect("Failed to set up test DB");
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = AppState::new(config, Some(db), blobs.clone(), None).unwrap();

    (build_router(state), blobs)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn wait_for_status(app: &Router, execution_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, "GET", &format!("/status/{}", execution_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "RUNNING" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("execution {} did not finish", execution_id);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = build_test_router(test_credentials(), Vec::new()).await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_start_without_symbols_or_credentials() {
    let (app, _) = build_test_router(Credentials::default(), two_symbol_history()).await;

    let (status, body) = send(&app, "POST", "/start", Some("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_CREDENTIALS");
}

#[tokio::test]
async fn test_start_with_empty_history_finds_no_symbols() {
    let (app, _) = build_test_router(test_credentials(), Vec::new()).await;

    let (status, body) = send(&app, "POST", "/start", Some(r#"{"symbols": []}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_SYMBOLS");
    assert_eq!(body["error"], "symbols required and auto-detection found none");
}

#[tokio::test]
async fn test_start_status_and_download_flow() {
    let (app, blobs) = build_test_router(test_credentials(), two_symbol_history()).await;

    // Symbols are discovered from the history
    let (status, body) = send(&app, "POST", "/start", Some(r#"{"startTimeMs": 1700000000000}"#)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let execution_id = body["executionId"].as_str().unwrap().to_string();

    let finished = wait_for_status(&app, &execution_id).await;
    assert_eq!(finished["status"], "SUCCEEDED");
    assert_eq!(finished["output"]["count"], 6);
    assert_eq!(finished["output"]["totalSymbols"], 2);
    let final_key = finished["output"]["finalKey"].as_str().unwrap().to_string();
    assert_eq!(
        final_key,
        format!("bitget-orders/1700000000000-{}.json", execution_id)
    );
    assert!(blobs.exists("results", &final_key).await);

    // Signed download link serves the artifact
    let (status, link) = send(&app, "GET", &format!("/download?key={}", final_key), None).await;
    assert_eq!(status, StatusCode::OK);
    let url = link["url"].as_str().unwrap();
    let path = url.strip_prefix("http://localhost:3000").unwrap();
    assert!(link["expiresAt"].as_i64().unwrap() > 0);

    let (status, artifact) = send(&app, "GET", path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifact["count"], 6);

    // Tampered or missing signatures are rejected
    let tampered = path.replace("signature=", "signature=x");
    let (status, _) = send(&app, "GET", &tampered, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", &format!("/artifacts/{}", final_key), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_unknown_key() {
    let (app, _) = build_test_router(test_credentials(), Vec::new()).await;
    let (status, _) = send(&app, "GET", "/download?key=bitget-orders/missing.json", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_unknown_and_from_database() {
    let exchange = Arc::new(MockExchange::default());
    let base_url = spawn_mock_exchange(exchange).await;
    let db = setup_test_db().await.unwrap();

    upsert_execution_result(
        &db,
        &ExecutionSummary {
            execution_id: "exec-earlier".to_string(),
            status: "SUCCEEDED".to_string(),
            total_symbols: 2,
            total_orders: 6,
            artifact_uri: Some("memory://results/bitget-orders/1.json".to_string()),
            result_data: serde_json::json!({"count": 6}),
            processing_time_seconds: Some(3.5),
        },
    )
    .await
    .unwrap();

    let state = AppState::new(
        test_config(&base_url, test_credentials()),
        Some(db),
        Arc::new(MemoryBlobStore::new()),
        None,
    )
    .unwrap();
    let app = build_router(state);

    let (status, _) = send(&app, "GET", "/status/exec-unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/status/exec-earlier", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCEEDED");
    assert_eq!(body["output"]["totalOrders"], 6);
    assert_eq!(body["output"]["resultData"]["count"], 6);
}
