//! Signed orders-history requests against Bitget and normalization of the
//! response shapes the different endpoint versions return.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use thiserror::Error;

use crate::config::BitgetSettings;
use crate::services::bitget_auth::signed_headers;
use crate::services::credentials::Credentials;

pub const PARAM_SYMBOL: &str = "symbol";
pub const PARAM_LIMIT: &str = "limit";
pub const PARAM_ID_LESS_THAN: &str = "idLessThan";
pub const PARAM_PRODUCT_TYPE: &str = "productType";

const SUCCESS_CODE: &str = "00000";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Bitget API error {code}: {msg}")]
    Exchange { code: String, msg: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// HTTP status of the failure, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Only rate limiting and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self.status(), Some(429) | Some(500..=599))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampUnit {
    #[default]
    Milliseconds,
    Seconds,
}

impl TimestampUnit {
    fn now(self) -> String {
        match self {
            TimestampUnit::Milliseconds => Utc::now().timestamp_millis().to_string(),
            TimestampUnit::Seconds => Utc::now().timestamp().to_string(),
        }
    }
}

/// One orders-history request. Path, method, body and timestamp unit can be
/// overridden because the API surface differs across endpoint variants.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub symbol: String,
    pub params: Vec<(String, String)>,
    pub request_path: Option<String>,
    pub method: Method,
    pub body: Option<Value>,
    pub timestamp_unit: TimestampUnit,
}

impl PageRequest {
    /// An empty symbol means "all symbols"
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            params: Vec::new(),
            request_path: None,
            method: Method::GET,
            body: None,
            timestamp_unit: TimestampUnit::default(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn param_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.request_path = Some(path.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timestamp_unit(mut self, unit: TimestampUnit) -> Self {
        self.timestamp_unit = unit;
        self
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameters in send order: symbol (when set) then the caller's params
    fn query_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::with_capacity(self.params.len() + 1);
        if !self.symbol.is_empty() {
            pairs.push((PARAM_SYMBOL, self.symbol.as_str()));
        }
        pairs.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        pairs
    }
}

/// Source of normalized order pages
#[async_trait]
pub trait OrderPageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Value>, FetchError>;
}

/// Signed HTTP client for the orders-history endpoint family
#[derive(Clone)]
pub struct BitgetOrderClient {
    client: Client,
    base_url: String,
    default_path: String,
    credentials: Credentials,
}

impl BitgetOrderClient {
    pub fn new(settings: &BitgetSettings, credentials: Credentials) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            default_path: settings.orders_path.clone(),
            credentials,
        })
    }

    /// Issue the request and return the decoded JSON body without normalization
    pub async fn fetch_raw(&self, request: &PageRequest) -> Result<Value, FetchError> {
        let path = request.request_path.as_deref().unwrap_or(&self.default_path);

        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| FetchError::InvalidRequest(format!("{}{}: {}", self.base_url, path, e)))?;
        let pairs = request.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        // Sign exactly what goes on the wire
        let query = url.query().unwrap_or("").to_string();

        let body = match &request.body {
            Some(body) => serde_json::to_string(body)
                .map_err(|e| FetchError::InvalidRequest(e.to_string()))?,
            None => String::new(),
        };

        let timestamp = request.timestamp_unit.now();
        let headers = signed_headers(
            &self.credentials,
            &timestamp,
            request.method.as_str(),
            path,
            &query,
            &body,
        );

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if request.body.is_some() {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))?;
        check_exchange_code(&value)?;
        Ok(value)
    }
}

#[async_trait]
impl OrderPageSource for BitgetOrderClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Value>, FetchError> {
        let raw = self.fetch_raw(request).await?;
        Ok(normalize_orders(&raw))
    }
}

/// Bitget wraps errors in `{code, msg}`, sometimes with a 200 status
fn check_exchange_code(value: &Value) -> Result<(), FetchError> {
    let ok = match value.get("code") {
        None | Some(Value::Null) => true,
        Some(Value::String(code)) => code == SUCCESS_CODE,
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        Some(_) => false,
    };

    if ok {
        return Ok(());
    }

    let code = match value.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let msg = value
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(FetchError::Exchange { code, msg })
}

/// The response shapes an orders-history endpoint is known to return
#[derive(Debug, PartialEq)]
enum OrdersShape<'a> {
    DataList(&'a Vec<Value>),
    OrdersList(&'a Vec<Value>),
    NestedOrders(&'a Vec<Value>),
    NestedEntrusted(&'a Vec<Value>),
    Empty,
}

fn classify(resp: &Value) -> OrdersShape<'_> {
    match resp.get("data") {
        Some(Value::Array(list)) if !list.is_empty() => return OrdersShape::DataList(list),
        Some(Value::Object(data)) => {
            if let Some(Value::Array(list)) = data.get("orders") {
                return OrdersShape::NestedOrders(list);
            }
            if let Some(Value::Array(list)) = data.get("entrustedList") {
                return OrdersShape::NestedEntrusted(list);
            }
        }
        _ => {}
    }

    match resp.get("orders") {
        Some(Value::Array(list)) if !list.is_empty() => OrdersShape::OrdersList(list),
        _ => OrdersShape::Empty,
    }
}

/// Extract the order list from any accepted response shape; unknown shapes are empty.
pub fn normalize_orders(resp: &Value) -> Vec<Value> {
    let list = match classify(resp) {
        OrdersShape::DataList(list)
        | OrdersShape::OrdersList(list)
        | OrdersShape::NestedOrders(list)
        | OrdersShape::NestedEntrusted(list) => list,
        OrdersShape::Empty => return Vec::new(),
    };

    list.iter().filter(|item| item.is_object()).cloned().collect()
}

/// Numeric order id from `id` or `orderId`, as number or numeric string
pub fn numeric_order_id(order: &Value) -> Option<u64> {
    ["id", "orderId"].iter().find_map(|field| match order.get(*field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

/// Why a cursor walk stopped advancing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    Next(u64),
    NoNumericIds,
    NotDecreasing(u64),
}

/// Tracks the `idLessThan` watermark and guarantees it strictly decreases.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    current: Option<u64>,
}

impl Cursor {
    pub fn value(&self) -> Option<u64> {
        self.current
    }

    pub fn advance(&mut self, page: &[Value]) -> CursorStep {
        let Some(min_id) = page.iter().filter_map(numeric_order_id).min() else {
            return CursorStep::NoNumericIds;
        };

        if let Some(current) = self.current {
            if min_id >= current {
                return CursorStep::NotDecreasing(min_id);
            }
        }

        self.current = Some(min_id);
        CursorStep::Next(min_id)
    }
}
