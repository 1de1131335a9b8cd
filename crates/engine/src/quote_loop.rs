//! Quote Monitoring Loop (C7): scheduled batch polling with a
//! RUNNING↔DEGRADED health model and a cooperative stop signal.
//!
//! Grounded on the teacher's `gui/src-tauri/src/sentinel_loop.rs` for the
//! `*Handle` + `tokio::select!` loop shape, and on
//! `original_source/src/tse/quote_monitoring.py` for the exact
//! `LoopState`/cycle-id/health-transition semantics. Per spec.md §9's design
//! note, cycle outputs are handed off over a channel rather than an inline
//! callback — the queue *is* the replacement for the ad-hoc "cycle →
//! outputs → command execution" control flow, with command execution left
//! to whichever consumer (UAG) drains the receiver.

use crate::tse::{QuoteEvent, TseOutputs, TseService};
use chrono::Utc;
use ktengine_core::csm::Mode;
use ktengine_networking::kia::contracts::{MarketQuote, PollQuotesRequest};
use ktengine_networking::KiaGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteLoopState {
    Stopped,
    Running,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct QuoteLoopConfig {
    pub mode: Option<Mode>,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub err_threshold: u32,
    pub recover_threshold: u32,
}

impl Default for QuoteLoopConfig {
    fn default() -> Self {
        QuoteLoopConfig {
            mode: None,
            poll_interval_ms: 1000,
            poll_timeout_ms: 5000,
            err_threshold: 3,
            recover_threshold: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub poll_cycle_id: String,
    pub quotes: Vec<MarketQuote>,
    pub outputs: TseOutputs,
    pub partial: bool,
    pub fetch_failed: bool,
    pub health_transition: Option<QuoteLoopState>,
}

/// Cloneable handle controlling a spawned quote loop, mirroring the
/// teacher's `SentinelMonitorHandle`.
#[derive(Clone)]
pub struct QuoteLoopHandle {
    state: Arc<RwLock<QuoteLoopState>>,
    cancel: CancellationToken,
}

impl QuoteLoopHandle {
    pub async fn state(&self) -> QuoteLoopState {
        *self.state.read().await
    }

    /// Cooperative stop: sets the cancellation signal; the worker checks it
    /// before and after each cycle and between sleeps (spec.md §5).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn mint_cycle_id(trading_date: chrono::NaiveDate, now: chrono::DateTime<Utc>, cycle_seq: u64) -> String {
    format!(
        "poll-{}-{}-{:03}",
        trading_date.format("%Y%m%d"),
        now.format("%H%M%S"),
        cycle_seq
    )
}

async fn run_cycle(
    gateway: &KiaGateway,
    tse: &Mutex<TseService>,
    watch_symbols: &[String],
    config: &QuoteLoopConfig,
    cycle_seq: u64,
) -> CycleOutcome {
    let now = Utc::now();
    let trading_date = now.date_naive();
    let poll_cycle_id = mint_cycle_id(trading_date, now, cycle_seq);

    let request = PollQuotesRequest {
        mode: config.mode,
        symbols: watch_symbols.to_vec(),
        poll_cycle_id: poll_cycle_id.clone(),
        timeout_ms: config.poll_timeout_ms,
    };

    match gateway.fetch_quotes_batch(request).await {
        Err(err) => {
            warn!(poll_cycle_id = %poll_cycle_id, error = %err, "batch quote fetch failed");
            CycleOutcome {
                poll_cycle_id,
                quotes: Vec::new(),
                outputs: TseOutputs::default(),
                partial: true,
                fetch_failed: true,
                health_transition: None,
            }
        }
        Ok(result) => {
            let mut outputs = TseOutputs::default();
            {
                let mut tse_guard = tse.lock().await;
                for (index, quote) in result.quotes.iter().enumerate() {
                    let event = QuoteEvent {
                        trading_date,
                        symbol: quote.symbol.clone(),
                        price: quote.price,
                        occurred_at: quote.as_of,
                        sequence: (index + 1) as u64,
                    };
                    let tick_outputs = tse_guard.on_quote(event);
                    outputs.events.extend(tick_outputs.events);
                    outputs.commands.extend(tick_outputs.commands);
                }
                let drained = tse_guard.drain_buy_candidate(now);
                outputs.events.extend(drained.events);
                outputs.commands.extend(drained.commands);
            }
            CycleOutcome {
                poll_cycle_id,
                quotes: result.quotes,
                outputs,
                partial: result.partial,
                fetch_failed: false,
                health_transition: None,
            }
        }
    }
}

async fn loop_task(
    gateway: Arc<KiaGateway>,
    tse: Arc<Mutex<TseService>>,
    watch_symbols: Vec<String>,
    config: QuoteLoopConfig,
    state: Arc<RwLock<QuoteLoopState>>,
    cancel: CancellationToken,
    tx: mpsc::Sender<CycleOutcome>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    let mut cycle_seq: u64 = 0;
    let mut error_count: u32 = 0;
    let mut success_count: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if cancel.is_cancelled() {
                    break;
                }

                cycle_seq += 1;
                let mut outcome = run_cycle(&gateway, &tse, &watch_symbols, &config, cycle_seq).await;
                let failed = outcome.fetch_failed || outcome.partial;

                let mut transition = None;
                {
                    let mut current = state.write().await;
                    if failed {
                        success_count = 0;
                        error_count += 1;
                        if *current == QuoteLoopState::Running && error_count >= config.err_threshold {
                            *current = QuoteLoopState::Degraded;
                            tse.lock().await.set_degraded(true);
                            transition = Some(QuoteLoopState::Degraded);
                        }
                    } else {
                        error_count = 0;
                        success_count += 1;
                        if *current == QuoteLoopState::Degraded && success_count >= config.recover_threshold {
                            *current = QuoteLoopState::Running;
                            tse.lock().await.set_degraded(false);
                            transition = Some(QuoteLoopState::Running);
                        }
                    }
                }
                outcome.health_transition = transition;

                if tx.send(outcome).await.is_err() {
                    break;
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }

    *state.write().await = QuoteLoopState::Stopped;
}

/// Spawn the loop as a background task, returning a handle plus the
/// receiving end of its cycle-outcome channel.
pub fn spawn_quote_loop(
    gateway: Arc<KiaGateway>,
    tse: Arc<Mutex<TseService>>,
    watch_symbols: Vec<String>,
    config: QuoteLoopConfig,
) -> (QuoteLoopHandle, mpsc::Receiver<CycleOutcome>) {
    let (tx, rx) = mpsc::channel(64);
    let state = Arc::new(RwLock::new(QuoteLoopState::Running));
    let cancel = CancellationToken::new();

    let handle = QuoteLoopHandle {
        state: state.clone(),
        cancel: cancel.clone(),
    };

    tokio::spawn(loop_task(gateway, tse, watch_symbols, config, state, cancel, tx));

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_id_matches_the_configured_format() {
        use chrono::TimeZone;
        let date = chrono::NaiveDate::from_ymd_opt(2026, 2, 19).unwrap();
        let now = Utc.from_utc_datetime(&date.and_hms_opt(9, 5, 7).unwrap());
        assert_eq!(mint_cycle_id(date, now, 3), "poll-20260219-090507-003");
    }
}
