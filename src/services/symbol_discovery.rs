//! Discover which symbols an account has traded by walking the unfiltered
//! orders history backwards and collecting symbol names.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::config::DiscoverySettings;
use crate::services::bitget_orders::{
    Cursor, CursorStep, OrderPageSource, PageRequest, PARAM_ID_LESS_THAN, PARAM_LIMIT,
    PARAM_PRODUCT_TYPE,
};

/// Field names different endpoint versions use for the symbol
const SYMBOL_FIELDS: [&str; 4] = ["symbol", "symbolName", "instrument_id", "instId"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStop {
    EmptyPage,
    NoNumericIds,
    CursorStalled,
    PageCap,
    OrderCap,
    FetchFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Sorted and deduplicated
    pub symbols: Vec<String>,
    pub pages: usize,
    pub scanned_orders: usize,
    pub stop: ScanStop,
}

pub fn symbol_of(order: &Value) -> Option<&str> {
    SYMBOL_FIELDS.iter().find_map(|field| {
        order
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

pub struct SymbolScanner<'a> {
    source: &'a dyn OrderPageSource,
    settings: &'a DiscoverySettings,
}

impl<'a> SymbolScanner<'a> {
    pub fn new(source: &'a dyn OrderPageSource, settings: &'a DiscoverySettings) -> Self {
        Self { source, settings }
    }

    /// Scan until the history is exhausted or a cap is hit. Never fails: a fetch
    /// error ends the scan with whatever was collected so far.
    pub async fn scan(&self, product_type: &str) -> ScanReport {
        let mut symbols = BTreeSet::new();
        let mut cursor = Cursor::default();
        let mut pages = 0;
        let mut scanned_orders = 0;

        let stop = loop {
            if pages >= self.settings.max_pages {
                break ScanStop::PageCap;
            }
            pages += 1;

            let request = PageRequest::new("")
                .param(PARAM_LIMIT, self.settings.page_limit)
                .param_opt(
                    PARAM_PRODUCT_TYPE,
                    Some(product_type).filter(|p| !p.is_empty()),
                )
                .param_opt(PARAM_ID_LESS_THAN, cursor.value());

            let page = match self.source.fetch_page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Symbol scan stopped on page {}: {}", pages, e);
                    break ScanStop::FetchFailed;
                }
            };

            if page.is_empty() {
                break ScanStop::EmptyPage;
            }

            symbols.extend(page.iter().filter_map(symbol_of).map(str::to_string));
            scanned_orders += page.len();

            tracing::debug!(
                "Scan page {}: {} orders (total {}), {} distinct symbols",
                pages,
                page.len(),
                scanned_orders,
                symbols.len()
            );

            match cursor.advance(&page) {
                CursorStep::Next(_) => {}
                CursorStep::NoNumericIds => break ScanStop::NoNumericIds,
                CursorStep::NotDecreasing(id) => {
                    tracing::warn!("Scan cursor did not decrease (min id {}), stopping", id);
                    break ScanStop::CursorStalled;
                }
            }

            if scanned_orders >= self.settings.max_orders {
                break ScanStop::OrderCap;
            }
        };

        tracing::info!(
            "Symbol scan finished ({:?}): {} symbols from {} orders over {} pages",
            stop,
            symbols.len(),
            scanned_orders,
            pages
        );

        ScanReport {
            symbols: symbols.into_iter().collect(),
            pages,
            scanned_orders,
            stop,
        }
    }
}
