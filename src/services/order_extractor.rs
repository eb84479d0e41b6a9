//! Per-symbol order history extraction: throttled, retried pagination that ends
//! in exactly one `SymbolOutcome`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::config::{ExtractionSettings, StorageSettings};
use crate::models::extraction::{SymbolOutcome, SymbolTask};
use crate::services::blob_store::BlobStore;
use crate::services::bitget_orders::{
    Cursor, CursorStep, FetchError, OrderPageSource, PageRequest, PARAM_ID_LESS_THAN,
    PARAM_LIMIT, PARAM_PRODUCT_TYPE,
};
use crate::services::clock::{Clock, TokioClock};

/// Upper bound of the random jitter added to each backoff, in seconds
pub const MAX_JITTER_SECS: f64 = 0.1;

/// Delay before retry number `attempt + 1`: `0.5 * 2^attempt + jitter` seconds
pub fn backoff_delay(attempt: u32, jitter_secs: f64) -> Duration {
    let base = 0.5 * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(base + jitter_secs.max(0.0))
}

/// Why pagination ended for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStop {
    EmptyPage,
    OrderCap,
    NoNumericIds,
    CursorStalled,
}

#[derive(Clone)]
pub struct OrderExtractor {
    source: Arc<dyn OrderPageSource>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    settings: ExtractionSettings,
    results_bucket: Option<String>,
    per_symbol_prefix: String,
    default_product_type: Option<String>,
}

impl OrderExtractor {
    pub fn new(
        source: Arc<dyn OrderPageSource>,
        blobs: Arc<dyn BlobStore>,
        settings: ExtractionSettings,
        storage: &StorageSettings,
    ) -> Self {
        Self {
            source,
            blobs,
            clock: Arc::new(TokioClock),
            settings,
            results_bucket: storage.results_bucket.clone(),
            per_symbol_prefix: storage.per_symbol_prefix.clone(),
            default_product_type: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_product_type(mut self, product_type: impl Into<String>) -> Self {
        let product_type = product_type.into();
        self.default_product_type = Some(product_type).filter(|p| !p.is_empty());
        self
    }

    /// Extract every order for one symbol. Never fails: errors become
    /// `SymbolOutcome::Failed`.
    pub async fn extract(&self, task: &SymbolTask) -> SymbolOutcome {
        let symbol = task.symbol.trim();
        if symbol.is_empty() {
            return SymbolOutcome::failed("", "symbol required");
        }

        let product_type = task
            .product_type
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(self.default_product_type.as_deref());

        let started = self.clock.now();
        match self.collect_orders(symbol, product_type).await {
            Ok((orders, stop)) => {
                tracing::info!(
                    "Extracted {} orders for {} ({:?}) in {:.1}s",
                    orders.len(),
                    symbol,
                    stop,
                    self.clock.now().saturating_duration_since(started).as_secs_f64()
                );
                self.package(symbol, orders).await
            }
            Err(e) => {
                tracing::error!("Extraction failed for {}: {}", symbol, e);
                SymbolOutcome::failed(symbol, e)
            }
        }
    }

    async fn collect_orders(
        &self,
        symbol: &str,
        product_type: Option<&str>,
    ) -> Result<(Vec<Value>, PageStop), FetchError> {
        let mut orders: Vec<Value> = Vec::new();
        let mut cursor = Cursor::default();
        let mut last_request: Option<Instant> = None;

        let stop = loop {
            self.throttle(last_request).await;
            last_request = Some(self.clock.now());

            let request = PageRequest::new(symbol)
                .param(PARAM_LIMIT, self.settings.page_limit)
                .param_opt(PARAM_PRODUCT_TYPE, product_type)
                .param_opt(PARAM_ID_LESS_THAN, cursor.value());

            let page = self.fetch_with_retry(symbol, &request).await?;
            if page.is_empty() {
                break PageStop::EmptyPage;
            }

            tracing::debug!(
                "{}: page of {} orders (idLessThan={:?})",
                symbol,
                page.len(),
                cursor.value()
            );

            // A page at or above the cursor was already collected
            let step = cursor.advance(&page);
            if let CursorStep::NotDecreasing(id) = step {
                tracing::warn!(
                    "{}: cursor did not decrease (min id {}), dropping the repeated page and stopping",
                    symbol,
                    id
                );
                break PageStop::CursorStalled;
            }

            orders.extend(page);

            if orders.len() >= self.settings.max_orders {
                orders.truncate(self.settings.max_orders);
                tracing::warn!(
                    "{}: reached the {} order cap, stopping",
                    symbol,
                    self.settings.max_orders
                );
                break PageStop::OrderCap;
            }

            if step == CursorStep::NoNumericIds {
                break PageStop::NoNumericIds;
            }
        };

        Ok((orders, stop))
    }

    /// Keep successive page requests at least `min_request_interval` apart
    async fn throttle(&self, last_request: Option<Instant>) {
        let Some(last) = last_request else {
            return;
        };
        let elapsed = self.clock.now().saturating_duration_since(last);
        if let Some(wait) = self.settings.min_request_interval.checked_sub(elapsed) {
            if !wait.is_zero() {
                self.clock.sleep(wait).await;
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        symbol: &str,
        request: &PageRequest,
    ) -> Result<Vec<Value>, FetchError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.source.fetch_page(request).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER_SECS);
                    let delay = backoff_delay(attempt, jitter);
                    tracing::warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:.2}s",
                        symbol,
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Spill large results to the results bucket, otherwise return them inline
    async fn package(&self, symbol: &str, orders: Vec<Value>) -> SymbolOutcome {
        let Some(bucket) = self.results_bucket.as_deref() else {
            return SymbolOutcome::inline(symbol, orders);
        };

        let size = match serde_json::to_vec(&orders) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                tracing::warn!("{}: could not size result ({}), returning inline", symbol, e);
                return SymbolOutcome::inline(symbol, orders);
            }
        };
        if size <= self.settings.spill_threshold_bytes {
            return SymbolOutcome::inline(symbol, orders);
        }

        let key = spill_key(&self.per_symbol_prefix, symbol, self.clock.unix_secs());
        let document = json!({ "symbol": symbol, "orders": orders });

        match self.blobs.put_json(bucket, &key, &document).await {
            Ok(()) => {
                tracing::info!(
                    "{}: {} orders ({} bytes) spilled to {}/{}",
                    symbol,
                    orders.len(),
                    size,
                    bucket,
                    key
                );
                SymbolOutcome::Spilled {
                    symbol: symbol.to_string(),
                    count: orders.len(),
                    blob_key: key,
                }
            }
            Err(e) => {
                tracing::warn!("{}: spill to {}/{} failed ({}), returning inline", symbol, bucket, key, e);
                SymbolOutcome::inline(symbol, orders)
            }
        }
    }
}

pub fn spill_key(prefix: &str, symbol: &str, unix_secs: i64) -> String {
    format!("{}{}/{}-{}.json", prefix, symbol, unix_secs, symbol)
}
