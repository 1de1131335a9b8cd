//! Trading Strategy Engine (C6): per-symbol state machine, portfolio gate,
//! rebound-buy scheduler, sell-signal generator.
//!
//! Grounded on `original_source/src/tse/{service,scheduler}.py` for the
//! exact algorithm and the degraded-mode gate/day-rollover semantics, and on
//! the teacher's `gui/src-tauri/src/dipbuyer.rs` for the entry-detection
//! loop shape (drop-then-track-then-rebound over a per-symbol running low).

pub mod scheduler;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ktengine_core::{
    rules, Command, PlaceBuyOrderCommand, PlaceSellOrderCommand, PortfolioContext, PortfolioState,
    StrategyEvent, StrategyEventType, SymbolContext, SymbolState,
    REASON_TSE_PROFIT_PRESERVATION_BREAK, REASON_TSE_REBOUND_BUY_SIGNAL,
};
use rust_decimal::Decimal;
use scheduler::{ReboundCandidate, SymbolScanScheduler};
use std::collections::HashMap;

/// Configured reference-capture wall-clock time. Fixed at 09:03:00 per the
/// SPEC_FULL open-question decision: one source of truth shared with the
/// gateway's minute-chart backfill filter.
pub const REFERENCE_CAPTURE_TIME: NaiveTime = NaiveTime::from_hms_opt(9, 3, 0).unwrap();

/// A single incoming quote tick fed to [`TseService::on_quote`].
#[derive(Debug, Clone)]
pub struct QuoteEvent {
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub price: Decimal,
    pub occurred_at: DateTime<Utc>,
    /// Sequence index within the current poll cycle (spec.md §4.7: "starts
    /// at 1 within the cycle").
    pub sequence: u64,
}

/// Broker-reported position lifecycle state fed to [`TseService::on_position_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerPositionState {
    BuyRequested,
    LongOpen,
    SellRequested,
    Closed,
    BuyFailed,
}

#[derive(Debug, Clone)]
pub struct PositionUpdateEvent {
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub broker_state: BrokerPositionState,
    pub current_price: Decimal,
    pub current_profit_rate: Decimal,
    pub max_profit_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Strategy events and commands emitted by one call into the engine.
#[derive(Debug, Clone, Default)]
pub struct TseOutputs {
    pub events: Vec<StrategyEvent>,
    pub commands: Vec<Command>,
}

impl TseOutputs {
    fn merge(&mut self, other: TseOutputs) {
        self.events.extend(other.events);
        self.commands.extend(other.commands);
    }
}

pub struct TseService {
    trading_date: NaiveDate,
    symbols: Vec<SymbolContext>,
    portfolio: PortfolioContext,
    scheduler: SymbolScanScheduler,
    /// Set by the quote loop's health model; blocks new buy entries while true.
    degraded: bool,
    event_seq: u64,
}

impl TseService {
    /// Construction invariant: `1 ≤ |watchSymbols| ≤ 20` (spec.md §4.6).
    pub fn new(trading_date: NaiveDate, watch_symbols: &[String]) -> ktengine_core::Result<Self> {
        if watch_symbols.is_empty() || watch_symbols.len() > 20 {
            return Err(ktengine_core::EngineError::CsmSymbolCountOutOfRange(
                watch_symbols.len(),
            ));
        }
        let symbols = watch_symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| SymbolContext::new(symbol.clone(), index as u32 + 1))
            .collect();
        Ok(TseService {
            trading_date,
            symbols,
            portfolio: PortfolioContext::default(),
            scheduler: SymbolScanScheduler::new(),
            degraded: false,
            event_seq: 0,
        })
    }

    pub fn portfolio(&self) -> &PortfolioContext {
        &self.portfolio
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolContext> {
        self.symbols.iter().find(|ctx| ctx.symbol == symbol)
    }

    pub fn set_degraded(&mut self, degraded: bool) {
        self.degraded = degraded;
    }

    /// Hard-reset for day rollover (`tse/service.py::on_day_changed`): a
    /// fresh `SymbolContext` per symbol and a fresh singleton
    /// `PortfolioContext`, not an incremental carry-over.
    pub fn on_day_changed(&mut self, new_date: NaiveDate, watch_symbols: &[String]) -> ktengine_core::Result<()> {
        *self = TseService::new(new_date, watch_symbols)?;
        Ok(())
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|ctx| ctx.symbol == symbol)
    }

    fn next_event_id(&mut self, symbol: &str) -> String {
        self.event_seq += 1;
        format!("se-{}-{}-{}", symbol, self.trading_date.format("%Y%m%d"), self.event_seq)
    }

    fn next_command_id(&mut self, symbol: &str) -> String {
        self.event_seq += 1;
        format!("cmd-{}-{}-{}", symbol, self.trading_date.format("%Y%m%d"), self.event_seq)
    }

    #[allow(clippy::too_many_arguments)]
    fn strategy_event(
        &mut self,
        symbol: &str,
        event_type: StrategyEventType,
        occurred_at: DateTime<Utc>,
        base_price: Option<Decimal>,
        local_low: Option<Decimal>,
        current_price: Option<Decimal>,
    ) -> StrategyEvent {
        StrategyEvent {
            event_id: self.next_event_id(symbol),
            occurred_at,
            trading_date: self.trading_date,
            symbol: symbol.to_string(),
            event_type,
            base_price,
            local_low,
            current_price,
            metrics: HashMap::new(),
        }
    }

    /// Feed one quote tick through the entry-detection pipeline (spec.md
    /// §4.6 "On quote(e)", steps 1–2). Drop rules, reference capture, drop
    /// detection, tracked-low updates, and rebound enqueue all happen here;
    /// the actual buy-candidate drain (step 3) is [`TseService::drain_buy_candidate`],
    /// called once per poll cycle after every symbol's quote has been fed —
    /// this is what makes scenario 2 of spec.md §8 (two symbols rebounding
    /// at the identical `(occurredAt, sequence)`) resolve by `watchRank`
    /// rather than by quote-arrival order within the cycle.
    pub fn on_quote(&mut self, quote: QuoteEvent) -> TseOutputs {
        let mut outputs = TseOutputs::default();

        if quote.trading_date != self.trading_date {
            return outputs;
        }
        if !rules::is_positive_price(quote.price) {
            return outputs;
        }
        if quote.occurred_at.time() < REFERENCE_CAPTURE_TIME {
            return outputs;
        }
        let Some(idx) = self.symbol_index(&quote.symbol) else {
            return outputs;
        };

        self.symbols[idx].last_quote_at = Some(quote.occurred_at);
        self.symbols[idx].last_sequence = quote.sequence;

        if self.symbols[idx].reference_price.is_none() {
            self.symbols[idx].reference_price = Some(quote.price);
            self.symbols[idx].state = SymbolState::Tracking;
            return outputs;
        }

        if self.degraded {
            return outputs;
        }
        if !(self.portfolio.gate_open && self.portfolio.state == PortfolioState::NoPosition) {
            return outputs;
        }

        let reference = self.symbols[idx].reference_price.expect("checked above");
        if let Some(drop) = rules::drop_rate(reference, quote.price) {
            let trackable = matches!(
                self.symbols[idx].state,
                SymbolState::Tracking | SymbolState::BuyCandidate
            );
            if trackable && rules::should_enter_buy_candidate(drop.as_decimal()) {
                if self.symbols[idx].state != SymbolState::BuyCandidate {
                    self.symbols[idx].state = SymbolState::BuyCandidate;
                    self.symbols[idx].tracked_low = Some(quote.price);
                    let event = self.strategy_event(
                        &quote.symbol,
                        StrategyEventType::BuyCandidateEntered,
                        quote.occurred_at,
                        Some(reference),
                        Some(quote.price),
                        Some(quote.price),
                    );
                    outputs.events.push(event);
                }
            }
        }

        if self.symbols[idx].state == SymbolState::BuyCandidate {
            let tracked_low = self.symbols[idx].tracked_low.expect("buy candidate has a tracked low");
            if rules::should_update_tracked_low(quote.price, tracked_low) {
                self.symbols[idx].tracked_low = Some(quote.price);
                let event = self.strategy_event(
                    &quote.symbol,
                    StrategyEventType::LocalLowUpdated,
                    quote.occurred_at,
                    None,
                    Some(quote.price),
                    Some(quote.price),
                );
                outputs.events.push(event);
            }

            let tracked_low = self.symbols[idx].tracked_low.expect("buy candidate has a tracked low");
            if let Some(rebound) = rules::rebound_rate(tracked_low, quote.price) {
                if rules::should_trigger_rebound_buy(rebound.as_decimal()) {
                    self.scheduler.enqueue(ReboundCandidate {
                        symbol: quote.symbol.clone(),
                        occurred_at: quote.occurred_at,
                        sequence: quote.sequence,
                        watch_rank: self.symbols[idx].watch_rank,
                        price: quote.price,
                    });
                }
            }
        }

        outputs
    }

    /// Drain at most one rebound-buy candidate (spec.md §4.6 step 3). Called
    /// once per poll cycle by the quote monitoring loop, after every watched
    /// symbol's quote for that cycle has gone through [`TseService::on_quote`].
    pub fn drain_buy_candidate(&mut self, now: DateTime<Utc>) -> TseOutputs {
        let mut outputs = TseOutputs::default();
        if !(self.portfolio.gate_open && self.portfolio.state == PortfolioState::NoPosition) {
            return outputs;
        }
        let Some(candidate) = self.scheduler.drain_one() else {
            return outputs;
        };
        let Some(idx) = self.symbol_index(&candidate.symbol) else {
            return outputs;
        };
        if self.symbols[idx].state != SymbolState::BuyCandidate {
            return outputs;
        }

        self.portfolio.gate_open = false;
        self.portfolio.state = PortfolioState::BuyRequested;
        self.portfolio.active_symbol = Some(candidate.symbol.clone());
        self.symbols[idx].state = SymbolState::BuyTriggered;

        let event = self.strategy_event(
            &candidate.symbol,
            StrategyEventType::BuySignal,
            now,
            None,
            None,
            Some(candidate.price),
        );
        outputs.events.push(event);
        outputs.commands.push(Command::PlaceBuy(PlaceBuyOrderCommand {
            command_id: self.next_command_id(&candidate.symbol),
            trading_date: self.trading_date,
            symbol: candidate.symbol,
            order_price: candidate.price,
            reason_code: REASON_TSE_REBOUND_BUY_SIGNAL,
        }));
        outputs
    }

    /// spec.md §4.6 "On position update(e)".
    pub fn on_position_update(&mut self, event: PositionUpdateEvent) -> TseOutputs {
        let mut outputs = TseOutputs::default();

        if event.trading_date != self.trading_date {
            return outputs;
        }
        if self.portfolio.active_symbol.as_deref() != Some(event.symbol.as_str()) {
            return outputs;
        }

        match event.broker_state {
            BrokerPositionState::BuyRequested => self.portfolio.state = PortfolioState::BuyRequested,
            BrokerPositionState::LongOpen => self.portfolio.state = PortfolioState::PositionOpen,
            BrokerPositionState::SellRequested => self.portfolio.state = PortfolioState::SellRequested,
            BrokerPositionState::Closed => self.portfolio.state = PortfolioState::PositionClosed,
            BrokerPositionState::BuyFailed => {
                self.portfolio.state = PortfolioState::NoPosition;
                self.portfolio.gate_open = true;
                self.portfolio.active_symbol = None;
                return outputs;
            }
        }

        if !self.portfolio.min_profit_locked
            && rules::should_lock_min_profit(event.current_profit_rate)
        {
            self.portfolio.min_profit_locked = true;
            let locked = self.strategy_event(
                &event.symbol,
                StrategyEventType::MinProfitLocked,
                event.occurred_at,
                None,
                None,
                Some(event.current_price),
            );
            outputs.events.push(locked);
        }

        if self.portfolio.min_profit_locked
            && !self.portfolio.sell_signaled
            && rules::should_emit_sell_signal(
                self.portfolio.min_profit_locked,
                event.current_profit_rate,
                event.max_profit_rate,
            )
        {
            self.portfolio.sell_signaled = true;
            let signal = self.strategy_event(
                &event.symbol,
                StrategyEventType::SellSignal,
                event.occurred_at,
                None,
                None,
                Some(event.current_price),
            );
            outputs.events.push(signal);
            outputs.commands.push(Command::PlaceSell(PlaceSellOrderCommand {
                command_id: self.next_command_id(&event.symbol),
                trading_date: self.trading_date,
                symbol: event.symbol,
                order_price: event.current_price,
                reason_code: REASON_TSE_PROFIT_PRESERVATION_BREAK,
            }));
        }

        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn at(date: NaiveDate, hh: u32, mm: u32, ss: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(hh, mm, ss).unwrap())
    }

    fn warmup_reference(svc: &mut TseService, date: NaiveDate, symbol: &str, price: &str, seq: u64) {
        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: symbol.to_string(),
            price: dec(price),
            occurred_at: at(date, 9, 3, 0),
            sequence: seq,
        });
    }

    #[test]
    fn scenario_1_single_symbol_drop_then_rebound_triggers_one_buy() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let mut svc = TseService::new(date, &["005930".to_string()]).unwrap();
        warmup_reference(&mut svc, date, "005930", "100", 1);

        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "005930".into(),
            price: dec("99"),
            occurred_at: at(date, 9, 5, 0),
            sequence: 2,
        });
        let outputs = svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "005930".into(),
            price: dec("99.198"),
            occurred_at: at(date, 9, 5, 1),
            sequence: 3,
        });
        assert!(outputs.commands.is_empty());

        let drained = svc.drain_buy_candidate(at(date, 9, 5, 1));
        assert_eq!(drained.commands.len(), 1);
        match &drained.commands[0] {
            Command::PlaceBuy(cmd) => assert_eq!(cmd.order_price, dec("99.198")),
            _ => panic!("expected a buy command"),
        }
        assert_eq!(svc.symbol("005930").unwrap().state, SymbolState::BuyTriggered);
        assert!(!svc.portfolio().gate_open);
    }

    #[test]
    fn scenario_2_simultaneous_rebound_breaks_tie_by_watch_rank() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let mut svc =
            TseService::new(date, &["005930".to_string(), "000660".to_string()]).unwrap();
        warmup_reference(&mut svc, date, "005930", "100", 1);
        warmup_reference(&mut svc, date, "000660", "200", 1);

        let tick = at(date, 9, 6, 0);
        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "005930".into(),
            price: dec("99"),
            occurred_at: at(date, 9, 5, 30),
            sequence: 2,
        });
        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "000660".into(),
            price: dec("198"),
            occurred_at: at(date, 9, 5, 30),
            sequence: 2,
        });

        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "000660".into(),
            price: dec("198.396"),
            occurred_at: tick,
            sequence: 3,
        });
        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "005930".into(),
            price: dec("99.198"),
            occurred_at: tick,
            sequence: 3,
        });

        let drained = svc.drain_buy_candidate(tick);
        match &drained.commands[0] {
            Command::PlaceBuy(cmd) => assert_eq!(cmd.symbol, "005930"),
            _ => panic!("expected a buy command"),
        }
        assert!(svc.drain_buy_candidate(tick).commands.is_empty());
    }

    #[test]
    fn scenario_3_sell_signal_fires_once_on_preservation_break() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let mut svc = TseService::new(date, &["005930".to_string()]).unwrap();
        svc.portfolio.state = PortfolioState::PositionOpen;
        svc.portfolio.gate_open = false;
        svc.portfolio.active_symbol = Some("005930".to_string());

        let locked = svc.on_position_update(PositionUpdateEvent {
            trading_date: date,
            symbol: "005930".into(),
            broker_state: BrokerPositionState::LongOpen,
            current_price: dec("101"),
            current_profit_rate: dec("1.0"),
            max_profit_rate: dec("1.0"),
            occurred_at: at(date, 9, 30, 0),
        });
        assert!(svc.portfolio().min_profit_locked);
        assert!(locked.commands.is_empty());

        let sold = svc.on_position_update(PositionUpdateEvent {
            trading_date: date,
            symbol: "005930".into(),
            broker_state: BrokerPositionState::LongOpen,
            current_price: dec("100.8"),
            current_profit_rate: dec("0.80"),
            max_profit_rate: dec("1.00"),
            occurred_at: at(date, 10, 0, 0),
        });
        assert_eq!(sold.commands.len(), 1);

        let no_repeat = svc.on_position_update(PositionUpdateEvent {
            trading_date: date,
            symbol: "005930".into(),
            broker_state: BrokerPositionState::LongOpen,
            current_price: dec("100.7"),
            current_profit_rate: dec("0.70"),
            max_profit_rate: dec("1.00"),
            occurred_at: at(date, 10, 5, 0),
        });
        assert!(no_repeat.commands.is_empty());
    }

    #[test]
    fn degraded_mode_blocks_new_buy_entries() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let mut svc = TseService::new(date, &["005930".to_string()]).unwrap();
        warmup_reference(&mut svc, date, "005930", "100", 1);
        svc.set_degraded(true);

        svc.on_quote(QuoteEvent {
            trading_date: date,
            symbol: "005930".into(),
            price: dec("99"),
            occurred_at: at(date, 9, 5, 0),
            sequence: 2,
        });
        assert_eq!(svc.symbol("005930").unwrap().state, SymbolState::Tracking);
    }

    #[test]
    fn construction_rejects_empty_or_oversized_watchlists() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        assert!(TseService::new(date, &[]).is_err());
        let too_many: Vec<String> = (0..21).map(|i| format!("{:06}", i)).collect();
        assert!(TseService::new(date, &too_many).is_err());
    }
}
