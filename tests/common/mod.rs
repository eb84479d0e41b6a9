#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::get,
    Json, Router,
};
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{Database, DatabaseConnection, DbErr};
use serde_json::{json, Value};

use bitget_orders_pipeline::config::AppConfig;
use bitget_orders_pipeline::services::bitget_auth::sign_request;
use bitget_orders_pipeline::services::credentials::Credentials;

pub const ORDERS_PATH: &str = "/api/v2/mix/order/orders-history";

/// Set up an in-memory test database with all migrations applied
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Alternate endpoint used to exercise path and method overrides
pub const PLAN_ORDERS_PATH: &str = "/api/v2/mix/order/orders-plan-history";

/// Secret the mock exchange verifies every signature against
pub const TEST_SECRET: &str = "test-secret";

/// One request as seen by the mock exchange
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub body: String,
    pub access_key: Option<String>,
    pub access_sign: Option<String>,
    pub access_timestamp: Option<String>,
}

/// Orders-history endpoint backed by a fixed order list
#[derive(Default)]
pub struct MockExchange {
    /// Served newest (highest id) first
    pub orders: Vec<Value>,
    /// Symbols that always answer with this HTTP status
    pub failing: HashMap<String, u16>,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl MockExchange {
    pub fn with_orders(orders: Vec<Value>) -> Self {
        let mut orders = orders;
        orders.sort_by_key(|o| std::cmp::Reverse(order_id(o)));
        Self {
            orders,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

fn order_id(order: &Value) -> u64 {
    order["orderId"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// POST requests carry their parameters in a JSON object body
fn body_params(body: &str) -> HashMap<String, String> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return HashMap::new();
    };
    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect()
}

async fn orders_history(
    State(exchange): State<Arc<MockExchange>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    let mut params = Query::<HashMap<String, String>>::try_from_uri(&uri)
        .map(|Query(params)| params)
        .unwrap_or_default();
    params.extend(body_params(&body));

    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        params: params.clone(),
        body: body.clone(),
        access_key: header("ACCESS-KEY"),
        access_sign: header("ACCESS-SIGN"),
        access_timestamp: header("ACCESS-TIMESTAMP"),
    };
    exchange.requests.lock().push(recorded.clone());

    // Recompute the signature over exactly what arrived
    let expected = sign_request(
        TEST_SECRET,
        recorded.access_timestamp.as_deref().unwrap_or_default(),
        method.as_str(),
        uri.path(),
        uri.query().unwrap_or_default(),
        &body,
    );
    if recorded.access_sign.as_deref() != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "40009", "msg": "sign signature error"})),
        );
    }

    let symbol = params.get("symbol").cloned().unwrap_or_default();
    if let Some(status) = exchange.failing.get(&symbol) {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({"code": "40000", "msg": "mock failure"})));
    }

    let limit: usize = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(100);
    let below: Option<u64> = params.get("idLessThan").and_then(|v| v.parse().ok());

    let page: Vec<Value> = exchange
        .orders
        .iter()
        .filter(|o| symbol.is_empty() || o["symbol"] == symbol.as_str())
        .filter(|o| below.is_none_or(|b| order_id(o) < b))
        .take(limit)
        .cloned()
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "code": "00000",
            "msg": "success",
            "requestTime": 1_700_000_000_000i64,
            "data": {"entrustedList": page, "endId": null}
        })),
    )
}

/// Serve `exchange` on an ephemeral local port and return its base URL
pub async fn spawn_mock_exchange(exchange: Arc<MockExchange>) -> String {
    let app = Router::new()
        .route(ORDERS_PATH, get(orders_history).post(orders_history))
        .route(PLAN_ORDERS_PATH, get(orders_history).post(orders_history))
        .with_state(exchange);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

pub fn test_credentials() -> Credentials {
    Credentials {
        api_key: "test-key".to_string(),
        secret_key: TEST_SECRET.to_string(),
        passphrase: "test-pass".to_string(),
    }
}

/// Configuration pointing at a mock exchange, with a results bucket
pub fn test_config(base_url: &str, credentials: Credentials) -> AppConfig {
    let mut config = AppConfig::default();
    config.bitget.base_url = base_url.to_string();
    config.storage.results_bucket = Some("results".to_string());
    config.server.public_base_url = "http://localhost:3000".to_string();
    config.server.download_signing_key = "test-signing-key".to_string();
    config.env_credentials = credentials;
    config
}

pub fn order(id: u64, symbol: &str, c_time: i64) -> Value {
    json!({
        "orderId": id.to_string(),
        "clientOid": format!("cli-{}", id),
        "symbol": symbol,
        "size": "0.010",
        "price": "42000.5",
        "priceAvg": "42000.5",
        "side": "buy",
        "orderType": "limit",
        "status": "filled",
        "marginCoin": "USDT",
        "cTime": c_time.to_string(),
        "uTime": (c_time + 500).to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_test_db() {
        let db = setup_test_db().await;
        assert!(db.is_ok(), "Test database should be created and migrated");
    }
}
