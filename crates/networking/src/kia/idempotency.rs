//! Idempotent response cache keyed by (mode, client order id).
//! Grounded on the original implementation's `kia/idempotency.py`.
//!
//! Caches the raw broker payload, mirroring the original's dict cache: the
//! client layer saves/finds before the gateway's typed mapping ever runs.

use ktengine_core::csm::Mode;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    store: Mutex<HashMap<(Mode, String), Value>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, mode: Mode, key: &str, response: Value) {
        if key.is_empty() {
            return;
        }
        self.store
            .lock()
            .await
            .insert((mode, key.to_string()), response);
    }

    pub async fn find(&self, mode: Mode, key: &str) -> Option<Value> {
        if key.is_empty() {
            return None;
        }
        self.store.lock().await.get(&(mode, key.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn finds_saved_response_by_mode_and_key() {
        let store = InMemoryIdempotencyStore::new();
        store
            .save(Mode::Mock, "cid-1", json!({ "broker_order_id": "ord-1" }))
            .await;

        let found = store.find(Mode::Mock, "cid-1").await;
        assert_eq!(found.unwrap()["broker_order_id"], "ord-1");
        assert!(store.find(Mode::Live, "cid-1").await.is_none());
    }

    #[tokio::test]
    async fn empty_key_is_never_saved_or_found() {
        let store = InMemoryIdempotencyStore::new();
        store.save(Mode::Mock, "", json!({})).await;
        assert!(store.find(Mode::Mock, "").await.is_none());
    }
}
