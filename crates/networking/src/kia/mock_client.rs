//! Deterministic synthetic broker responses for mock-mode trading.
//! Grounded on the original implementation's `kia/api_client.py`'s
//! `MockKiaApiClient`. Returns raw JSON values so the same tolerant
//! decoding in `gateway.rs` handles both mock and live payloads.

use super::contracts::ServiceType;
use chrono::Utc;
use serde_json::{json, Value};

pub struct MockKiaApiClient;

impl MockKiaApiClient {
    pub fn new() -> Self {
        Self
    }

    pub fn call(&self, service_type: ServiceType, payload: &Value) -> Value {
        match service_type {
            ServiceType::Auth => json!({ "access_token": "mock-token", "expires_in": 3600 }),
            ServiceType::Quote => {
                let symbol = payload
                    .get("stk_cd")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                self.fetch_quote_raw(symbol)
            }
            ServiceType::Chart => {
                let symbol = payload
                    .get("stk_cd")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                json!({
                    "stk_cd": symbol,
                    "stk_min_pole_chart_qry": [
                        { "cur_prc": "70000", "cntr_tm": "20260219090300" }
                    ],
                    "return_code": 0,
                    "return_msg": "ok",
                })
            }
            ServiceType::Order => {
                let client_order_id = payload
                    .get("client_order_id")
                    .and_then(Value::as_str)
                    .unwrap_or("mock-order")
                    .to_string();
                json!({
                    "broker_order_id": format!("mock-{client_order_id}"),
                    "client_order_id": client_order_id,
                    "status": "ACCEPTED",
                    "accepted_at": Utc::now().to_rfc3339(),
                    "return_code": 0,
                    "return_msg": "ok",
                })
            }
            ServiceType::Execution => {
                let broker_order_id = payload
                    .get("brokerOrderId")
                    .and_then(Value::as_str)
                    .unwrap_or("mock-order")
                    .to_string();
                json!({
                    "broker_order_id": broker_order_id,
                    "fills": [{
                        "execution_id": format!("exe-{broker_order_id}"),
                        "price": "70000",
                        "quantity": 1,
                        "executed_at": Utc::now().to_rfc3339(),
                    }],
                    "remaining_qty": 0,
                })
            }
        }
    }

    pub fn fetch_quote_raw(&self, symbol: &str) -> Value {
        json!({
            "symbol": symbol,
            "cur_prc": "70000",
            "price": "70000",
            "tick_size": 1,
            "as_of": Utc::now().to_rfc3339(),
            "return_code": 0,
            "return_msg": "ok",
        })
    }
}

impl Default for MockKiaApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_payload_carries_the_requested_symbol() {
        let client = MockKiaApiClient::new();
        let response = client.call(ServiceType::Quote, &json!({ "stk_cd": "005930" }));
        assert_eq!(response["symbol"], "005930");
        assert_eq!(response["cur_prc"], "70000");
    }

    #[test]
    fn order_response_is_always_accepted() {
        let client = MockKiaApiClient::new();
        let response = client.call(
            ServiceType::Order,
            &json!({ "client_order_id": "cid-42" }),
        );
        assert_eq!(response["status"], "ACCEPTED");
        assert_eq!(response["broker_order_id"], "mock-cid-42");
    }
}
