//! Rebound-buy candidate scheduler.
//!
//! Orders candidates by strict `(occurredAt, sequence, watchRank)` ascending
//! (spec.md §5's ordering guarantee) using a binary min-heap, same shape as
//! the teacher's `BinaryHeap<PrioritizedOrder>` in `trade_executor.rs` but
//! ordered the opposite way: earliest candidate wins here, not highest
//! priority. Holds symbol keys, not pointers (spec.md §9).

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct ReboundCandidate {
    pub symbol: String,
    pub occurred_at: DateTime<Utc>,
    pub sequence: u64,
    pub watch_rank: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct HeapEntry {
    occurred_at: DateTime<Utc>,
    sequence: u64,
    watch_rank: u32,
    symbol: String,
    price: Decimal,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the natural order so the
        // earliest (occurredAt, sequence, watchRank) tuple pops first.
        other
            .occurred_at
            .cmp(&self.occurred_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.watch_rank.cmp(&self.watch_rank))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct SymbolScanScheduler {
    heap: BinaryHeap<HeapEntry>,
}

impl SymbolScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, candidate: ReboundCandidate) {
        self.heap.push(HeapEntry {
            occurred_at: candidate.occurred_at,
            sequence: candidate.sequence,
            watch_rank: candidate.watch_rank,
            symbol: candidate.symbol,
            price: candidate.price,
        });
    }

    /// Pop the earliest-queued candidate, if any.
    pub fn drain_one(&mut self) -> Option<ReboundCandidate> {
        self.heap.pop().map(|entry| ReboundCandidate {
            symbol: entry.symbol,
            occurred_at: entry.occurred_at,
            sequence: entry.sequence,
            watch_rank: entry.watch_rank,
            price: entry.price,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn earliest_occurred_at_wins() {
        let mut scheduler = SymbolScanScheduler::new();
        scheduler.enqueue(ReboundCandidate {
            symbol: "000660".into(),
            occurred_at: at(5),
            sequence: 1,
            watch_rank: 2,
            price: Decimal::from(50000),
        });
        scheduler.enqueue(ReboundCandidate {
            symbol: "005930".into(),
            occurred_at: at(1),
            sequence: 1,
            watch_rank: 1,
            price: Decimal::from(70000),
        });
        assert_eq!(scheduler.drain_one().unwrap().symbol, "005930");
        assert_eq!(scheduler.drain_one().unwrap().symbol, "000660");
        assert!(scheduler.drain_one().is_none());
    }

    #[test]
    fn ties_on_occurred_at_and_sequence_break_by_watch_rank() {
        let mut scheduler = SymbolScanScheduler::new();
        let t = at(10);
        scheduler.enqueue(ReboundCandidate {
            symbol: "000660".into(),
            occurred_at: t,
            sequence: 1,
            watch_rank: 2,
            price: Decimal::from(50000),
        });
        scheduler.enqueue(ReboundCandidate {
            symbol: "005930".into(),
            occurred_at: t,
            sequence: 1,
            watch_rank: 1,
            price: Decimal::from(70000),
        });
        // scenario 2 of spec.md §8: the lower watchRank (first listed) wins.
        assert_eq!(scheduler.drain_one().unwrap().symbol, "005930");
    }
}
