use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::symbol_discovery::symbol_of;

/// Fields tried, in order, when deriving an order's event time for sorting
pub const EVENT_TIME_FIELDS: [&str; 5] = ["orderTime", "timestamp", "time", "createdAt", "cTime"];

/// Typed row view of one exchange order. Sizes and prices stay as the exchange's
/// strings; only the timestamps are integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub execution_id: String,
    pub order_id: String,
    pub symbol: String,
    pub size: Option<String>,
    pub price: Option<String>,
    pub price_avg: Option<String>,
    pub base_volume: Option<String>,
    pub quote_volume: Option<String>,
    pub status: Option<String>,
    pub side: Option<String>,
    pub order_type: Option<String>,
    pub force: Option<String>,
    pub leverage: Option<String>,
    pub margin_mode: Option<String>,
    pub margin_coin: Option<String>,
    pub pos_side: Option<String>,
    pub pos_mode: Option<String>,
    pub trade_side: Option<String>,
    pub reduce_only: Option<String>,
    pub pos_avg: Option<String>,
    pub fee: Option<String>,
    pub total_profits: Option<String>,
    pub client_oid: Option<String>,
    pub order_source: Option<String>,
    pub enter_point_source: Option<String>,
    pub preset_stop_surplus_price: Option<String>,
    pub preset_stop_loss_price: Option<String>,
    pub c_time: Option<i64>,
    pub u_time: Option<i64>,
}

/// First present, non-empty field among `keys`, rendered as the exchange sent it
fn text(order: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match order.get(*key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

fn integer(order: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| parse_integer(order.get(*key)?))
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

impl OrderRecord {
    /// Map a raw exchange order. Orders without an id or a symbol are not storable.
    pub fn from_raw(execution_id: &str, order: &Value) -> Option<Self> {
        let order_id = text(order, &["orderId", "id", "order_id"])?;
        let symbol = symbol_of(order)?.to_string();

        Some(Self {
            execution_id: execution_id.to_string(),
            order_id,
            symbol,
            size: text(order, &["size", "quantity", "filled_qty"]),
            price: text(order, &["price"]),
            price_avg: text(order, &["priceAvg", "price_avg"]),
            base_volume: text(order, &["baseVolume"]),
            quote_volume: text(order, &["quoteVolume"]),
            status: text(order, &["status", "state"]),
            side: text(order, &["side"]),
            order_type: text(order, &["orderType", "type"]),
            force: text(order, &["force"]),
            leverage: text(order, &["leverage"]),
            margin_mode: text(order, &["marginMode"]),
            margin_coin: text(order, &["marginCoin"]),
            pos_side: text(order, &["posSide"]),
            pos_mode: text(order, &["posMode"]),
            trade_side: text(order, &["tradeSide"]),
            reduce_only: text(order, &["reduceOnly"]),
            pos_avg: text(order, &["posAvg"]),
            fee: text(order, &["fee"]),
            total_profits: text(order, &["totalProfits"]),
            client_oid: text(order, &["clientOid", "client_oid", "clientOrderId"]),
            order_source: text(order, &["orderSource", "order_source"]),
            enter_point_source: text(order, &["enterPointSource", "enter_point_source"]),
            preset_stop_surplus_price: text(
                order,
                &["presetStopSurplusPrice", "preset_stop_surplus_price"],
            ),
            preset_stop_loss_price: text(order, &["presetStopLossPrice", "preset_stop_loss_price"]),
            c_time: integer(order, &["cTime", "createdAt", "orderTime"]),
            u_time: integer(order, &["uTime", "updatedAt"]),
        })
    }
}

/// Parse a calendar date/time string (UTC when no offset is given) to epoch ms
pub fn parse_datetime_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Event time used to order merged results. Zero and empty values fall through to
/// the next field; no usable field gives 0, which sorts first.
pub fn event_time_ms(order: &Value) -> i64 {
    EVENT_TIME_FIELDS
        .iter()
        .filter_map(|field| order.get(*field))
        .find_map(|value| {
            let parsed = match value {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => parse_integer(value).or_else(|| parse_datetime_ms(s)),
                other => parse_integer(other),
            };
            parsed.filter(|t| *t != 0)
        })
        .unwrap_or(0)
}
