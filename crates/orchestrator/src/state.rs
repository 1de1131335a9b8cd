//! Runtime state shared across the orchestrator: engine lifecycle, UI
//! monitoring snapshots, and their JSON persistence.
//!
//! Grounded on the teacher's `gui/src-tauri/src/state.rs` shared-state
//! struct shape (`Arc<RwLock<...>>` fields managed behind a cloneable
//! handle) and `original_source/src/uag/{bootstrap,service}.py`'s snapshot
//! capture rules.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ktengine_core::rules;
use ktengine_engine::tse::REFERENCE_CAPTURE_TIME;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const MARKET_CLOSE_TIME: NaiveTime = NaiveTime::from_hms_opt(15, 30, 0).unwrap();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Idle,
    Running,
}

/// Per-symbol UI row (spec.md §4.8 "Monitoring snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMonitorSnapshot {
    pub symbol_code: String,
    pub symbol_name: Option<String>,
    pub price_at_reference: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub previous_low_time: Option<DateTime<Utc>>,
    pub previous_low_price: Option<Decimal>,
    pub buy_time: Option<DateTime<Utc>>,
    pub buy_price: Option<Decimal>,
    pub previous_high_time: Option<DateTime<Utc>>,
    pub previous_high_price: Option<Decimal>,
    pub sell_time: Option<DateTime<Utc>>,
    pub sell_price: Option<Decimal>,
    pub current_price_at_close: Option<Decimal>,
    bought: bool,
}

impl SymbolMonitorSnapshot {
    pub fn new(symbol_code: impl Into<String>) -> Self {
        SymbolMonitorSnapshot {
            symbol_code: symbol_code.into(),
            symbol_name: None,
            price_at_reference: None,
            current_price: None,
            previous_low_time: None,
            previous_low_price: None,
            buy_time: None,
            buy_price: None,
            previous_high_time: None,
            previous_high_price: None,
            sell_time: None,
            sell_price: None,
            current_price_at_close: None,
            bought: false,
        }
    }

    /// Feed a quote tick. Mirrors spec.md §4.8's capture rules: reference
    /// price latches once, previous-low freezes at the buy, previous-high
    /// only tracks post-buy moves past the min-profit-lock threshold, and
    /// the close price latches once at/after market close.
    pub fn on_quote(&mut self, price: Decimal, occurred_at: DateTime<Utc>) {
        self.current_price = Some(price);

        if self.price_at_reference.is_none() && occurred_at.time() >= REFERENCE_CAPTURE_TIME {
            self.price_at_reference = Some(price);
        }

        if !self.bought {
            let is_new_low = match self.previous_low_price {
                Some(low) => price < low,
                None => true,
            };
            if is_new_low {
                self.previous_low_price = Some(price);
                self.previous_low_time = Some(occurred_at);
            }
        } else if let Some(buy_price) = self.buy_price {
            let threshold = buy_price * (Decimal::ONE + rules::min_profit_lock() / Decimal::from(100));
            if price >= threshold {
                let is_new_high = match self.previous_high_price {
                    Some(high) => price > high,
                    None => true,
                };
                if is_new_high {
                    self.previous_high_price = Some(price);
                    self.previous_high_time = Some(occurred_at);
                }
            }
        }

        if self.current_price_at_close.is_none() && occurred_at.time() >= MARKET_CLOSE_TIME {
            self.current_price_at_close = Some(price);
        }
    }

    pub fn on_buy(&mut self, time: DateTime<Utc>, price: Decimal) {
        self.buy_time = Some(time);
        self.buy_price = Some(price);
        self.bought = true;
        self.previous_high_time = None;
        self.previous_high_price = None;
    }

    pub fn on_sell(&mut self, time: DateTime<Utc>, price: Decimal) {
        self.sell_time = Some(time);
        self.sell_price = Some(price);
    }
}

/// The JSON document persisted under the runtime config directory, keyed by
/// trading date so a restart only restores today's snapshots (spec.md §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringSnapshotDocument {
    pub trading_date: Option<NaiveDate>,
    pub symbols: HashMap<String, SymbolMonitorSnapshot>,
}

async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let tmp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn load_monitoring_snapshots(path: &Path, today: NaiveDate) -> MonitoringSnapshotDocument {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<MonitoringSnapshotDocument>(&bytes) {
            Ok(doc) if doc.trading_date == Some(today) => doc,
            Ok(_) => MonitoringSnapshotDocument {
                trading_date: Some(today),
                symbols: HashMap::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "monitoring snapshot file corrupt, starting fresh");
                MonitoringSnapshotDocument {
                    trading_date: Some(today),
                    symbols: HashMap::new(),
                }
            }
        },
        Err(_) => MonitoringSnapshotDocument {
            trading_date: Some(today),
            symbols: HashMap::new(),
        },
    }
}

pub async fn save_monitoring_snapshots(path: &Path, doc: &MonitoringSnapshotDocument) {
    if let Err(e) = atomic_write_json(path, doc).await {
        tracing::error!(error = %e, "failed to persist monitoring snapshots");
    }
}

/// Top-level shared state, analogous to the teacher's `AppState`.
#[derive(Clone)]
pub struct EngineRuntime {
    pub engine_state: Arc<RwLock<EngineState>>,
    pub trading_date: Arc<RwLock<Option<NaiveDate>>>,
    pub dry_run: Arc<RwLock<bool>>,
    pub monitoring: Arc<RwLock<MonitoringSnapshotDocument>>,
    pub data_dir: PathBuf,
}

impl EngineRuntime {
    pub fn new(data_dir: PathBuf) -> Self {
        EngineRuntime {
            engine_state: Arc::new(RwLock::new(EngineState::Idle)),
            trading_date: Arc::new(RwLock::new(None)),
            dry_run: Arc::new(RwLock::new(false)),
            monitoring: Arc::new(RwLock::new(MonitoringSnapshotDocument::default())),
            data_dir,
        }
    }

    pub fn monitoring_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("monitoring_snapshot.json")
    }

    pub async fn persist_monitoring(&self) {
        let doc = self.monitoring.read().await.clone();
        save_monitoring_snapshots(&self.monitoring_snapshot_path(), &doc).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn at(hms: (u32, u32, u32)) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        Utc.from_utc_datetime(&date.and_hms_opt(hms.0, hms.1, hms.2).unwrap())
    }

    #[test]
    fn reference_price_latches_once_at_capture_time() {
        let mut snap = SymbolMonitorSnapshot::new("005930");
        snap.on_quote(dec("70000"), at((9, 2, 59)));
        assert_eq!(snap.price_at_reference, None);

        snap.on_quote(dec("69500"), at((9, 3, 0)));
        assert_eq!(snap.price_at_reference, Some(dec("69500")));

        snap.on_quote(dec("69900"), at((9, 10, 0)));
        assert_eq!(snap.price_at_reference, Some(dec("69500")));
    }

    #[test]
    fn previous_low_tracks_running_minimum_until_bought() {
        let mut snap = SymbolMonitorSnapshot::new("005930");
        snap.on_quote(dec("69500"), at((9, 5, 0)));
        snap.on_quote(dec("69000"), at((9, 6, 0)));
        snap.on_quote(dec("69200"), at((9, 7, 0)));
        assert_eq!(snap.previous_low_price, Some(dec("69000")));
        assert_eq!(snap.previous_low_time, Some(at((9, 6, 0))));

        snap.on_buy(at((9, 8, 0)), dec("69000"));
        snap.on_quote(dec("68000"), at((9, 9, 0)));
        assert_eq!(snap.previous_low_price, Some(dec("69000")));
    }

    #[test]
    fn previous_high_only_tracks_post_buy_moves_past_min_profit_lock() {
        let mut snap = SymbolMonitorSnapshot::new("005930");
        snap.on_buy(at((9, 8, 0)), dec("69000"));

        // below the 1.0% lock threshold (69690): not a new high yet.
        snap.on_quote(dec("69500"), at((9, 9, 0)));
        assert_eq!(snap.previous_high_price, None);

        snap.on_quote(dec("69700"), at((9, 10, 0)));
        assert_eq!(snap.previous_high_price, Some(dec("69700")));
        assert_eq!(snap.previous_high_time, Some(at((9, 10, 0))));

        snap.on_quote(dec("69650"), at((9, 11, 0)));
        assert_eq!(snap.previous_high_price, Some(dec("69700")));
    }

    #[test]
    fn buying_resets_previous_high_tracking() {
        let mut snap = SymbolMonitorSnapshot::new("005930");
        snap.on_buy(at((9, 8, 0)), dec("69000"));
        snap.on_quote(dec("70000"), at((9, 10, 0)));
        assert!(snap.previous_high_price.is_some());

        snap.on_sell(at((9, 20, 0)), dec("70000"));
        snap.on_buy(at((9, 25, 0)), dec("69200"));
        assert_eq!(snap.previous_high_price, None);
        assert_eq!(snap.previous_high_time, None);
    }

    #[test]
    fn close_price_latches_once_at_or_after_market_close() {
        let mut snap = SymbolMonitorSnapshot::new("005930");
        snap.on_quote(dec("70100"), at((15, 29, 59)));
        assert_eq!(snap.current_price_at_close, None);

        snap.on_quote(dec("70200"), at((15, 30, 0)));
        assert_eq!(snap.current_price_at_close, Some(dec("70200")));

        snap.on_quote(dec("70300"), at((15, 35, 0)));
        assert_eq!(snap.current_price_at_close, Some(dec("70200")));
    }

    #[tokio::test]
    async fn monitoring_document_round_trips_through_atomic_write() {
        let dir = std::env::temp_dir().join(format!("ktengine-test-{}", std::process::id()));
        let path = dir.join("monitoring_snapshot.json");

        let mut doc = MonitoringSnapshotDocument {
            trading_date: Some(NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()),
            symbols: HashMap::new(),
        };
        let mut snap = SymbolMonitorSnapshot::new("005930");
        snap.on_quote(dec("69500"), at((9, 3, 0)));
        doc.symbols.insert("005930".to_string(), snap);

        save_monitoring_snapshots(&path, &doc).await;

        let restored = load_monitoring_snapshots(&path, NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()).await;
        assert_eq!(restored.trading_date, doc.trading_date);
        assert_eq!(
            restored.symbols.get("005930").unwrap().price_at_reference,
            Some(dec("69500"))
        );

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn monitoring_document_is_discarded_across_a_trading_date_change() {
        let dir = std::env::temp_dir().join(format!("ktengine-test-{}-b", std::process::id()));
        let path = dir.join("monitoring_snapshot.json");

        let doc = MonitoringSnapshotDocument {
            trading_date: Some(NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()),
            symbols: {
                let mut m = HashMap::new();
                m.insert("005930".to_string(), SymbolMonitorSnapshot::new("005930"));
                m
            },
        };
        save_monitoring_snapshots(&path, &doc).await;

        let restored = load_monitoring_snapshots(&path, NaiveDate::from_ymd_opt(2026, 2, 18).unwrap()).await;
        assert!(restored.symbols.is_empty());
        assert_eq!(restored.trading_date, Some(NaiveDate::from_ymd_opt(2026, 2, 18).unwrap()));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
