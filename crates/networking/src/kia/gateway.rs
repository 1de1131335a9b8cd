//! Tolerant decoding of raw broker payloads into typed contracts.
//! Grounded on the original implementation's `kia/gateway.py`.

use super::contracts::{
    ExecutionFillWire, ExecutionResult, FetchExecutionRequest, FetchPositionRequest,
    FetchQuoteRequest, MarketQuote, OrderAckStatus, OrderKind, OrderResult, PollQuoteError,
    PollQuotesRequest, PollQuotesResult, PositionSnapshotWire, SubmitOrderRequest,
};
use chrono::{DateTime, NaiveTime, Utc};
use ktengine_core::{EngineError, Result, Side};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

use super::client::KiaApiClient;

const REFERENCE_MINUTE_START: NaiveTime = NaiveTime::from_hms_opt(9, 3, 0).unwrap();
const REFERENCE_MINUTE_END: NaiveTime = NaiveTime::from_hms_opt(9, 3, 59).unwrap();

const SYMBOL_NAME_KEYS: &[&str] = &[
    "symbol_name",
    "name",
    "stk_nm",
    "hts_kor_isnm",
    "prdt_abrv_name",
    "isu_nm",
];
const SYMBOL_KEYS: &[&str] = &["symbol", "stk_cd", "code", "pdno"];

fn field_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

fn parse_dt(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn value_as_price_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "0".to_string(),
    }
}

fn parse_non_negative_price(raw: &str) -> Decimal {
    let text = raw.trim().replace(',', "");
    if text.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&text).map(|d| d.abs()).unwrap_or(Decimal::ZERO)
}

fn is_negative_signed_price_text(raw: &str) -> bool {
    let text = raw.trim();
    !text.is_empty() && text.starts_with('-')
}

fn resolve_symbol_name(value: &Value) -> Option<String> {
    field_str(value, SYMBOL_NAME_KEYS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_hhmmss(value: &Value) -> Option<NaiveTime> {
    let text = value.as_str()?;
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 6 {
        return None;
    }
    let digits = &digits[digits.len() - 6..];
    let hour: u32 = digits[0..2].parse().ok()?;
    let minute: u32 = digits[2..4].parse().ok()?;
    let second: u32 = digits[4..6].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn is_reference_minute(time: NaiveTime) -> bool {
    (REFERENCE_MINUTE_START..=REFERENCE_MINUTE_END).contains(&time)
}

fn map_quote(symbol_field: &Value, fallback_symbol: &str) -> MarketQuote {
    let price_raw = value_as_price_text(
        symbol_field
            .get("cur_prc")
            .or_else(|| symbol_field.get("price")),
    );
    let price = parse_non_negative_price(&price_raw);

    if is_negative_signed_price_text(&price_raw) {
        warn!(
            symbol = fallback_symbol,
            raw_price = %price_raw,
            normalized = %price,
            "signed quote price detected"
        );
    }

    let symbol = field_str(symbol_field, SYMBOL_KEYS)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(fallback_symbol)
        .trim()
        .to_string();

    MarketQuote {
        symbol,
        symbol_name: resolve_symbol_name(symbol_field),
        price,
        tick_size: symbol_field.get("tick_size").and_then(Value::as_i64).unwrap_or(1),
        as_of: parse_dt(symbol_field.get("as_of")),
    }
}

/// Maps broker wire payloads into domain contracts. Holds the live/mock
/// client it sources raw payloads from.
pub struct KiaGateway {
    client: KiaApiClient,
}

impl KiaGateway {
    pub fn new(client: KiaApiClient) -> Self {
        Self { client }
    }

    pub async fn fetch_quote(&self, req: FetchQuoteRequest) -> Result<MarketQuote> {
        let raw = self.client.fetch_quote_raw(req.mode, &req.symbol).await?;
        let price_raw = value_as_price_text(raw.get("cur_prc").or_else(|| raw.get("price")));
        if Decimal::from_str(price_raw.trim().replace(',', "").as_str()).is_err() && !price_raw.trim().is_empty() {
            warn!(symbol = %req.symbol, raw_price = %price_raw, "invalid quote price format");
        }
        Ok(map_quote(&raw, &req.symbol))
    }

    pub async fn fetch_reference_price_0903(
        &self,
        mode: Option<ktengine_core::csm::Mode>,
        symbol: &str,
    ) -> Result<Option<Decimal>> {
        let raw = self.client.fetch_chart_raw(mode, symbol).await?;
        let rows = raw.get("stk_min_pole_chart_qry").and_then(Value::as_array);
        let Some(rows) = rows else { return Ok(None) };

        let mut best_time: Option<NaiveTime> = None;
        let mut best_price: Option<Decimal> = None;

        for row in rows {
            let Some(trade_time) = row.get("cntr_tm").and_then(parse_hhmmss) else {
                continue;
            };
            if !is_reference_minute(trade_time) {
                continue;
            }
            let price_raw = value_as_price_text(row.get("cur_prc").or_else(|| row.get("price")));
            let price = parse_non_negative_price(&price_raw);
            if price <= Decimal::ZERO {
                continue;
            }
            let is_newer = match best_time {
                Some(t) => trade_time > t,
                None => true,
            };
            if is_newer {
                best_time = Some(trade_time);
                best_price = Some(price);
            }
        }

        Ok(best_price)
    }

    pub async fn fetch_quotes_batch(&self, req: PollQuotesRequest) -> Result<PollQuotesResult> {
        if req.symbols.is_empty() || req.symbols.len() > 20 {
            return Err(EngineError::KiaInvalidRequest(
                "symbols must contain between 1 and 20 entries".into(),
            ));
        }
        if req.poll_cycle_id.trim().is_empty() {
            return Err(EngineError::KiaInvalidRequest(
                "poll_cycle_id must not be empty".into(),
            ));
        }

        let raw = self
            .client
            .fetch_quotes_batch_raw(req.mode, &req.symbols, req.timeout_ms, &req.poll_cycle_id)
            .await?;

        let quotes = raw
            .get("quotes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let fallback = req.symbols.get(index).map(String::as_str).unwrap_or("");
                        map_quote(item, fallback)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let errors: Vec<PollQuoteError> = raw
            .get("errors")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| PollQuoteError {
                        symbol: item.get("symbol").and_then(Value::as_str).unwrap_or("").to_string(),
                        code: item
                            .get("code")
                            .and_then(Value::as_str)
                            .unwrap_or("KIA_UNKNOWN")
                            .to_string(),
                        retryable: item.get("retryable").and_then(Value::as_bool).unwrap_or(false),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let partial = raw
            .get("partial")
            .and_then(Value::as_bool)
            .unwrap_or(!errors.is_empty());

        Ok(PollQuotesResult {
            poll_cycle_id: req.poll_cycle_id.clone(),
            quotes,
            errors,
            partial,
        })
    }

    pub async fn submit_order(&self, req: SubmitOrderRequest) -> Result<OrderResult> {
        let trde_tp = match req.order_type {
            OrderKind::Market => "3",
            OrderKind::Limit => "0",
        };
        let api_id = match req.side {
            Side::Buy => "kt10000",
            Side::Sell => "kt10001",
        };
        let payload = serde_json::json!({
            "dmst_stex_tp": "KRX",
            "stk_cd": req.symbol,
            "ord_qty": req.quantity.to_string(),
            "ord_uv": req.price.map(|p| p.to_string()).unwrap_or_default(),
            "trde_tp": trde_tp,
            "cond_uv": "",
        });

        let raw = self
            .client
            .submit_order_raw(req.mode, &payload, &req.client_order_id, api_id)
            .await?;

        let status = match raw.get("status").and_then(Value::as_str).unwrap_or("PENDING") {
            "ACCEPTED" => OrderAckStatus::Accepted,
            "REJECTED" => OrderAckStatus::Rejected,
            _ => OrderAckStatus::Pending,
        };

        Ok(OrderResult {
            broker_order_id: field_str(&raw, &["ord_no", "broker_order_id"])
                .unwrap_or_default()
                .to_string(),
            client_order_id: raw
                .get("client_order_id")
                .and_then(Value::as_str)
                .unwrap_or(&req.client_order_id)
                .to_string(),
            status,
            accepted_at: raw.get("accepted_at").map(|_| parse_dt(raw.get("accepted_at"))),
        })
    }

    pub async fn fetch_execution(&self, req: FetchExecutionRequest) -> Result<ExecutionResult> {
        let raw = self
            .client
            .fetch_execution_raw(req.mode, &req.account_no, &req.broker_order_id)
            .await?;

        let fills = raw
            .get("fills")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| ExecutionFillWire {
                        execution_id: item
                            .get("execution_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        price: Decimal::from_str(&value_as_price_text(item.get("price")))
                            .unwrap_or(Decimal::ZERO),
                        quantity: item.get("quantity").and_then(Value::as_i64).unwrap_or(0),
                        executed_at: parse_dt(item.get("executed_at")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ExecutionResult {
            broker_order_id: raw
                .get("broker_order_id")
                .and_then(Value::as_str)
                .unwrap_or(&req.broker_order_id)
                .to_string(),
            fills,
            remaining_qty: raw.get("remaining_qty").and_then(Value::as_i64).unwrap_or(0),
        })
    }

    pub async fn fetch_position(&self, req: FetchPositionRequest) -> Result<Vec<PositionSnapshotWire>> {
        let raw = self
            .client
            .fetch_position_raw(req.mode, &req.account_no, req.symbol.as_deref())
            .await?;
        let rows = raw.get("positions").and_then(Value::as_array);
        let Some(rows) = rows else { return Ok(Vec::new()) };

        Ok(rows
            .iter()
            .map(|item| PositionSnapshotWire {
                account_no: item
                    .get("account_no")
                    .and_then(Value::as_str)
                    .unwrap_or(&req.account_no)
                    .to_string(),
                symbol: item.get("symbol").and_then(Value::as_str).unwrap_or("").to_string(),
                quantity: item.get("quantity").and_then(Value::as_i64).unwrap_or(0),
                avg_buy_price: Decimal::from_str(&value_as_price_text(item.get("avg_buy_price")))
                    .unwrap_or(Decimal::ZERO),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_value_of_signed_price() {
        assert_eq!(parse_non_negative_price("-70000"), Decimal::from(70000));
        assert_eq!(parse_non_negative_price("70,000"), Decimal::from(70000));
        assert_eq!(parse_non_negative_price(""), Decimal::ZERO);
    }

    #[test]
    fn detects_signed_price_text() {
        assert!(is_negative_signed_price_text("-70000"));
        assert!(!is_negative_signed_price_text("70000"));
    }

    #[test]
    fn resolves_symbol_name_priority_list() {
        let value = serde_json::json!({ "stk_nm": "Samsung Electronics" });
        assert_eq!(resolve_symbol_name(&value).unwrap(), "Samsung Electronics");
        assert!(resolve_symbol_name(&serde_json::json!({})).is_none());
    }

    #[test]
    fn reference_minute_window_is_inclusive_of_the_full_minute() {
        assert!(is_reference_minute(NaiveTime::from_hms_opt(9, 3, 0).unwrap()));
        assert!(is_reference_minute(NaiveTime::from_hms_opt(9, 3, 59).unwrap()));
        assert!(!is_reference_minute(NaiveTime::from_hms_opt(9, 4, 0).unwrap()));
    }

    #[test]
    fn parses_compact_hhmmss_timestamps() {
        let value = serde_json::json!("20260219090300");
        let time = parse_hhmmss(&value).unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(9, 3, 0).unwrap());
    }
}
