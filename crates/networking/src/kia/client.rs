//! Mode-routed broker transport: mock passthrough or live HTTP with token
//! refresh, quote rate limiting, idempotency, and retry.
//! Grounded on the original implementation's `kia/api_client.py`.

use super::contracts::ServiceType;
use super::endpoint::{resolve_base_url, resolve_route};
use super::error_mapper::{map_http_status, map_transport_error};
use super::idempotency::InMemoryIdempotencyStore;
use super::mock_client::MockKiaApiClient;
use super::retry::{DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use super::token::{AccessToken, TokenProvider};
use chrono::{Duration as ChronoDuration, Utc};
use ktengine_core::csm::{CsmCredential, Mode};
use ktengine_core::{EngineError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::instrument;

const QUOTE_MIN_INTERVAL: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

enum Transport {
    Mock(MockKiaApiClient),
    Live(LiveTransport),
}

struct LiveTransport {
    http: reqwest::Client,
    credential: CsmCredential,
    base_url: String,
    token_provider: TokenProvider,
    idempotency_store: InMemoryIdempotencyStore,
    quote_last_sent_at: Mutex<Option<Instant>>,
}

/// Routes broker calls to either the deterministic mock client or a live
/// HTTP transport, depending on how it was constructed.
pub struct KiaApiClient {
    transport: Transport,
}

impl KiaApiClient {
    pub fn mock() -> Self {
        Self {
            transport: Transport::Mock(MockKiaApiClient::new()),
        }
    }

    pub fn live(credential: CsmCredential, base_url_override: Option<String>, mode: Mode) -> Self {
        Self {
            transport: Transport::Live(LiveTransport {
                http: reqwest::Client::new(),
                base_url: resolve_base_url(mode, base_url_override.as_deref()),
                credential,
                token_provider: TokenProvider::new(),
                idempotency_store: InMemoryIdempotencyStore::new(),
                quote_last_sent_at: Mutex::new(None),
            }),
        }
    }

    #[instrument(skip(self, payload))]
    pub async fn call(
        &self,
        service_type: ServiceType,
        mode: Option<Mode>,
        payload: &Value,
        api_id: Option<&str>,
        idempotency_key: Option<&str>,
        query: Option<&HashMap<String, String>>,
    ) -> Result<Value> {
        match &self.transport {
            Transport::Mock(mock) => Ok(mock.call(service_type, payload)),
            Transport::Live(live) => {
                live.call(service_type, mode, payload, api_id, idempotency_key, query)
                    .await
            }
        }
    }

    pub async fn fetch_quote_raw(&self, mode: Option<Mode>, symbol: &str) -> Result<Value> {
        self.call(
            ServiceType::Quote,
            mode,
            &serde_json::json!({ "stk_cd": symbol }),
            Some("ka10007"),
            None,
            None,
        )
        .await
    }

    pub async fn fetch_chart_raw(&self, mode: Option<Mode>, symbol: &str) -> Result<Value> {
        let base_dt = Utc::now().format("%Y%m%d").to_string();
        self.call(
            ServiceType::Chart,
            mode,
            &serde_json::json!({
                "stk_cd": symbol,
                "tic_scope": "1",
                "upd_stkpc_tp": "1",
                "base_dt": base_dt,
            }),
            Some("ka10080"),
            None,
            None,
        )
        .await
    }

    pub async fn fetch_quotes_batch_raw(
        &self,
        mode: Option<Mode>,
        symbols: &[String],
        timeout_ms: u64,
        poll_cycle_id: &str,
    ) -> Result<Value> {
        let mut quotes = Vec::with_capacity(symbols.len());
        let mut errors = Vec::new();
        for symbol in symbols {
            match self.fetch_quote_raw(mode, symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(err) => {
                    errors.push(serde_json::json!({
                        "symbol": symbol,
                        "code": err.code(),
                        "retryable": err.retryable(),
                    }));
                }
            }
        }
        let partial = !errors.is_empty();
        Ok(serde_json::json!({
            "poll_cycle_id": poll_cycle_id,
            "timeout_ms": timeout_ms,
            "quotes": quotes,
            "errors": errors,
            "partial": partial,
        }))
    }

    pub async fn submit_order_raw(
        &self,
        mode: Option<Mode>,
        payload: &Value,
        client_order_id: &str,
        api_id: &str,
    ) -> Result<Value> {
        self.call(
            ServiceType::Order,
            mode,
            payload,
            Some(api_id),
            Some(client_order_id),
            None,
        )
        .await
    }

    pub async fn fetch_execution_raw(
        &self,
        mode: Option<Mode>,
        account_no: &str,
        broker_order_id: &str,
    ) -> Result<Value> {
        let mut query = HashMap::new();
        query.insert("accountNo".to_string(), account_no.to_string());
        query.insert("brokerOrderId".to_string(), broker_order_id.to_string());
        self.call(
            ServiceType::Execution,
            mode,
            &Value::Null,
            None,
            None,
            Some(&query),
        )
        .await
    }

    pub async fn fetch_position_raw(
        &self,
        mode: Option<Mode>,
        account_no: &str,
        symbol: Option<&str>,
    ) -> Result<Value> {
        let mut query = HashMap::new();
        query.insert("accountNo".to_string(), account_no.to_string());
        if let Some(symbol) = symbol {
            query.insert("symbol".to_string(), symbol.to_string());
        }
        self.call(
            ServiceType::Execution,
            mode,
            &Value::Null,
            None,
            None,
            Some(&query),
        )
        .await
    }
}

impl LiveTransport {
    async fn call(
        &self,
        service_type: ServiceType,
        mode: Option<Mode>,
        payload: &Value,
        api_id: Option<&str>,
        idempotency_key: Option<&str>,
        query: Option<&HashMap<String, String>>,
    ) -> Result<Value> {
        let resolved_mode = mode.unwrap_or(Mode::Mock);

        if matches!(service_type, ServiceType::Auth) {
            return self.send(service_type, payload, api_id, query, None).await;
        }

        let mut forced_refresh = false;
        let mut last_error = None;

        for attempt in 1..=DEFAULT_ATTEMPTS {
            let outcome = self
                .try_once(
                    service_type,
                    resolved_mode,
                    payload,
                    api_id,
                    idempotency_key,
                    query,
                    &mut forced_refresh,
                )
                .await;

            let err = match outcome {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let should_retry = err.retryable()
                && !matches!(err, EngineError::KiaAuthTokenExpired)
                && !(matches!(service_type, ServiceType::Order)
                    && matches!(err, EngineError::KiaApiTimeout));

            if attempt >= DEFAULT_ATTEMPTS || !should_retry {
                return Err(err);
            }
            last_error = Some(err);
            super::retry::sleep_with_backoff(attempt, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY).await;
        }

        Err(last_error.expect("loop always assigns last_error before exhausting attempts"))
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_once(
        &self,
        service_type: ServiceType,
        resolved_mode: Mode,
        payload: &Value,
        api_id: Option<&str>,
        idempotency_key: Option<&str>,
        query: Option<&HashMap<String, String>>,
        forced_refresh: &mut bool,
    ) -> Result<Value> {
        let token = self
            .token_provider
            .get_valid(resolved_mode, Utc::now(), |m| self.issue_token(m))
            .await?;

        match self.send(service_type, payload, api_id, query, Some(&token.token)).await {
            Ok(response) => {
                if matches!(service_type, ServiceType::Order) {
                    if let Some(key) = idempotency_key {
                        self.idempotency_store
                            .save(resolved_mode, key, response.clone())
                            .await;
                    }
                }
                Ok(response)
            }
            Err(EngineError::KiaAuthTokenExpired) if !*forced_refresh => {
                *forced_refresh = true;
                self.token_provider.invalidate(resolved_mode).await;
                let refreshed = self
                    .token_provider
                    .force_refresh(resolved_mode, |m| self.issue_token(m))
                    .await?;
                self.send(service_type, payload, api_id, query, Some(&refreshed.token))
                    .await
            }
            Err(EngineError::KiaApiTimeout) if matches!(service_type, ServiceType::Order) => {
                if let Some(key) = idempotency_key {
                    if let Some(existing) = self.idempotency_store.find(resolved_mode, key).await {
                        return Ok(existing);
                    }
                }
                Err(EngineError::KiaApiTimeout)
            }
            Err(err) => Err(err),
        }
    }

    async fn issue_token(&self, mode: Mode) -> Result<AccessToken> {
        let auth_payload = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": self.credential.app_key,
            "secretkey": self.credential.app_secret,
        });
        let response = self
            .send(ServiceType::Auth, &auth_payload, None, None, None)
            .await?;
        let now = Utc::now();
        let expires_in = response.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);
        let token = response
            .get("token")
            .or_else(|| response.get("access_token"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("live-token")
            .to_string();
        let expires_at = now + ChronoDuration::seconds(expires_in);
        let refresh_at = now + ChronoDuration::seconds((expires_in - 60).max(0));
        Ok(AccessToken {
            token,
            issued_at: now,
            expires_at,
            refresh_at,
            mode,
        })
    }

    async fn enforce_quote_rate_limit(&self) {
        let mut last_sent = self.quote_last_sent_at.lock().await;
        if let Some(previous) = *last_sent {
            let elapsed = previous.elapsed();
            if elapsed < QUOTE_MIN_INTERVAL {
                tokio::time::sleep(QUOTE_MIN_INTERVAL - elapsed).await;
            }
        }
        *last_sent = Some(Instant::now());
    }

    async fn send(
        &self,
        service_type: ServiceType,
        payload: &Value,
        api_id: Option<&str>,
        query: Option<&HashMap<String, String>>,
        token: Option<&str>,
    ) -> Result<Value> {
        if matches!(service_type, ServiceType::Quote) {
            self.enforce_quote_rate_limit().await;
        }

        let route = resolve_route(service_type);
        let url = format!("{}{}", self.base_url, route.path);
        let mut request = self
            .http
            .request(route.method.parse().unwrap_or(reqwest::Method::POST), &url)
            .timeout(REQUEST_TIMEOUT);
        request = request.header("Content-Type", "application/json;charset=UTF-8");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(api_id) = api_id {
            request = request.header("api-id", api_id);
        }
        if let Some(query) = query {
            request = request.query(query);
        }
        if !payload.is_null() {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| map_transport_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| map_transport_error(&e))?;

        if !status.is_success() {
            return Err(map_http_status(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&body).map_err(EngineError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_routes_quote_calls_without_network() {
        let client = KiaApiClient::mock();
        let raw = client.fetch_quote_raw(Some(Mode::Mock), "005930").await.unwrap();
        assert_eq!(raw["symbol"], "005930");
    }

    #[tokio::test]
    async fn mock_batch_quotes_never_reports_errors() {
        let client = KiaApiClient::mock();
        let raw = client
            .fetch_quotes_batch_raw(Some(Mode::Mock), &["005930".to_string()], 1000, "poll-1")
            .await
            .unwrap();
        assert_eq!(raw["errors"].as_array().unwrap().len(), 0);
    }
}
