use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input of one pipeline execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInput {
    #[serde(default)]
    pub start_time_ms: Option<i64>,
    pub product_type: String,
    pub symbols: Vec<String>,
}

/// Work item handed to one extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolTask {
    pub symbol: String,
    #[serde(default)]
    pub product_type: Option<String>,
}

/// What one extractor produced. Untagged so results written by other producers
/// (snake_case blob keys included) still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolOutcome {
    /// Orders were too large to pass inline and live in the results bucket
    Spilled {
        symbol: String,
        #[serde(default)]
        count: usize,
        #[serde(rename = "blobKey", alias = "s3_key", alias = "s3Key", alias = "blob_key")]
        blob_key: String,
    },
    Failed {
        symbol: String,
        error: String,
    },
    Inline {
        symbol: String,
        #[serde(default)]
        count: usize,
        orders: Vec<Value>,
    },
}

impl SymbolOutcome {
    pub fn inline(symbol: impl Into<String>, orders: Vec<Value>) -> Self {
        SymbolOutcome::Inline {
            symbol: symbol.into(),
            count: orders.len(),
            orders,
        }
    }

    pub fn failed(symbol: impl Into<String>, error: impl ToString) -> Self {
        SymbolOutcome::Failed {
            symbol: symbol.into(),
            error: error.to_string(),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Spilled { symbol, .. }
            | SymbolOutcome::Failed { symbol, .. }
            | SymbolOutcome::Inline { symbol, .. } => symbol,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SymbolOutcome::Failed { .. })
    }
}

/// Input of the aggregation step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub results: Vec<SymbolOutcome>,
    #[serde(default)]
    pub start_time_ms: Option<i64>,
    #[serde(default, alias = "executionArn")]
    pub execution_id: Option<String>,
}

/// Outcome of a best-effort side effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SideEffect {
    Done,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceReport {
    pub artifact: SideEffect,
    pub execution_row: SideEffect,
    pub orders: SideEffect,
    pub orders_inserted: u64,
}

impl Default for PersistenceReport {
    fn default() -> Self {
        Self {
            artifact: SideEffect::Skipped,
            execution_row: SideEffect::Skipped,
            orders: SideEffect::Skipped,
            orders_inserted: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub status: String,
    pub final_key: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    pub total_symbols: usize,
    pub failed_symbols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_uri: Option<String>,
    pub persistence: PersistenceReport,
}

/// Merged document written to the results bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub generated_at: String,
    pub orders: Vec<Value>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_decodes_each_shape() {
        let spilled: SymbolOutcome =
            serde_json::from_value(json!({"symbol": "BTCUSDT", "count": 9000, "s3_key": "per-symbol/BTCUSDT/1-BTCUSDT.json"}))
                .unwrap();
        assert_eq!(
            spilled,
            SymbolOutcome::Spilled {
                symbol: "BTCUSDT".into(),
                count: 9000,
                blob_key: "per-symbol/BTCUSDT/1-BTCUSDT.json".into()
            }
        );

        let failed: SymbolOutcome =
            serde_json::from_value(json!({"symbol": "ETHUSDT", "error": "403 forbidden"})).unwrap();
        assert!(failed.is_failed());

        let inline: SymbolOutcome =
            serde_json::from_value(json!({"symbol": "SOLUSDT", "orders": [{"orderId": "1"}]})).unwrap();
        assert_eq!(inline.symbol(), "SOLUSDT");
        assert!(matches!(inline, SymbolOutcome::Inline { count: 0, .. }));
    }

    #[test]
    fn test_outcome_serializes_camel_case_blob_key() {
        let spilled = SymbolOutcome::Spilled {
            symbol: "BTCUSDT".into(),
            count: 3,
            blob_key: "k.json".into(),
        };
        assert_eq!(
            serde_json::to_value(&spilled).unwrap(),
            json!({"symbol": "BTCUSDT", "count": 3, "blobKey": "k.json"})
        );
    }

    #[test]
    fn test_side_effect_shape() {
        assert_eq!(serde_json::to_value(SideEffect::Done).unwrap(), json!({"status": "done"}));
        assert_eq!(
            serde_json::to_value(SideEffect::Failed("no db".into())).unwrap(),
            json!({"status": "failed", "reason": "no db"})
        );
    }

    #[test]
    fn test_execution_input_wire_names() {
        let input: ExecutionInput = serde_json::from_value(
            json!({"startTimeMs": 1700000000000i64, "productType": "USDT-FUTURES", "symbols": ["BTCUSDT"]}),
        )
        .unwrap();
        assert_eq!(input.start_time_ms, Some(1_700_000_000_000));
        assert_eq!(input.symbols, vec!["BTCUSDT"]);
    }
}
