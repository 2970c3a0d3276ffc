//! Position ledger
//!
//! Exclusive owner of the position set and its lifecycle state machine
//! (Open -> Closed, one way). All mutation goes through `&mut self`, so
//! `open`, `close`, and `exit_due` can never interleave and the open count
//! is never read stale during an open decision. A Closed transition is
//! durably recorded in the state store before the position leaves active
//! tracking.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::state::StateStore;
use crate::types::{
    ExitReason, LedgerError, Position, PositionId, PositionStatus, SpreadCandidate, SpreadMetrics,
};

pub struct PositionLedger {
    store: StateStore,
    positions: HashMap<PositionId, Position>,
    max_positions: usize,
    seq: u64,
}

impl PositionLedger {
    pub fn new(store: StateStore, max_positions: usize) -> Self {
        PositionLedger {
            store,
            positions: HashMap::new(),
            max_positions,
            seq: 0,
        }
    }

    /// Reload Open positions from the state store after a restart.
    pub fn recover(&mut self) -> Result<usize, LedgerError> {
        let recovered = self.store.load_open_positions()?;
        let count = recovered.len();
        for pos in recovered {
            info!(
                "Recovered position: {} {}x {}/{} exp {}",
                pos.id, pos.quantity, pos.short_leg.strike, pos.long_leg.strike, pos.expiry_date
            );
            self.positions.insert(pos.id.clone(), pos);
        }
        Ok(count)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Snapshot of the Open positions, oldest entry first.
    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by_key(|p| p.entry_time);
        positions
    }

    /// Sum of max risk across Open positions, in points per contract.
    pub fn total_open_risk(&self) -> f64 {
        self.positions
            .values()
            .map(|p| p.max_risk() * p.quantity as f64)
            .sum()
    }

    /// Record a confirmed fill as a new Open position.
    ///
    /// Fails with `PositionLimitExceeded` at the configured limit rather
    /// than queuing. The position is persisted before it enters the active
    /// set.
    pub fn open(
        &mut self,
        candidate: &SpreadCandidate,
        metrics: &SpreadMetrics,
        quantity: u32,
        expiry_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<PositionId, LedgerError> {
        if self.positions.len() >= self.max_positions {
            return Err(LedgerError::PositionLimitExceeded {
                limit: self.max_positions,
            });
        }

        let id = self.next_id(now);
        let position = Position {
            id: id.clone(),
            short_leg: candidate.short_leg,
            long_leg: candidate.long_leg,
            quantity,
            entry_time: now,
            credit_received: metrics.net_credit,
            profit_target_price: metrics.profit_target_price,
            expiry_date,
            status: PositionStatus::Open,
        };

        self.store.save_open(&position)?;
        self.positions.insert(id.clone(), position);
        Ok(id)
    }

    /// Ids are time-derived with a ledger-local sequence so opens within the
    /// same tick never collide.
    fn next_id(&mut self, now: DateTime<Utc>) -> PositionId {
        self.seq += 1;
        PositionId::new(format!("SPX_BPS_{}_{}", now.timestamp_millis(), self.seq))
    }

    /// Decide whether a position is due to exit.
    ///
    /// ProfitTarget fires when the current closing debit is at or under the
    /// target price; ExpiryApproaching when the position is within `min_dte`
    /// calendar days of expiry. ProfitTarget wins when both hold.
    pub fn exit_due(
        &self,
        position: &Position,
        now: DateTime<Utc>,
        current_spread_value: f64,
        min_dte: i64,
    ) -> Option<ExitReason> {
        if current_spread_value <= position.profit_target_price {
            return Some(ExitReason::ProfitTarget);
        }
        if position.days_to_expiry(now) <= min_dte {
            return Some(ExitReason::ExpiryApproaching);
        }
        None
    }

    /// Transition a position to Closed and drop it from active tracking.
    ///
    /// Unknown or already-closed ids fail with `UnknownPosition`; a double
    /// close is a caller bug to surface, not absorb.
    pub fn close(
        &mut self,
        id: &PositionId,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        if !self.positions.contains_key(id) {
            return Err(LedgerError::UnknownPosition(id.to_string()));
        }

        // Durable record precedes removal from the active set.
        self.store.record_close(id, reason, now)?;

        let mut position = self
            .positions
            .remove(id)
            .ok_or_else(|| LedgerError::UnknownPosition(id.to_string()))?;
        position.status = PositionStatus::Closed;
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptionQuote;
    use chrono::{Duration, TimeZone};

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 19).unwrap()
    }

    fn candidate() -> SpreadCandidate {
        SpreadCandidate::new(
            OptionQuote {
                strike: 4500.0,
                bid: 11.5,
                ask: 12.5,
                expiry: expiry(),
            },
            OptionQuote {
                strike: 4490.0,
                bid: 4.9,
                ask: 5.1,
                expiry: expiry(),
            },
        )
        .unwrap()
    }

    fn metrics() -> SpreadMetrics {
        SpreadMetrics {
            net_credit: 7.0,
            max_risk: 3.0,
            profit_target_price: 3.5,
            risk_reward_ratio: 7.0 / 3.0,
        }
    }

    fn ledger(max_positions: usize) -> PositionLedger {
        PositionLedger::new(StateStore::open_in_memory().unwrap(), max_positions)
    }

    #[test]
    fn test_open_enforces_position_limit() {
        let mut ledger = ledger(2);
        let now = Utc::now();
        ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();

        let err = ledger.open(&candidate(), &metrics(), 1, expiry(), now);
        assert!(matches!(
            err,
            Err(LedgerError::PositionLimitExceeded { limit: 2 })
        ));
        assert_eq!(ledger.open_count(), 2);
    }

    #[test]
    fn test_same_tick_ids_are_unique() {
        let mut ledger = ledger(5);
        let now = Utc::now();
        let a = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        let b = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_close_decrements_count_by_one() {
        let mut ledger = ledger(5);
        let now = Utc::now();
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        assert_eq!(ledger.open_count(), 2);

        let closed = ledger.close(&id, ExitReason::ProfitTarget, now).unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn test_double_close_fails_with_unknown_position() {
        let mut ledger = ledger(5);
        let now = Utc::now();
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        ledger.close(&id, ExitReason::ProfitTarget, now).unwrap();

        let err = ledger.close(&id, ExitReason::ProfitTarget, now);
        assert!(matches!(err, Err(LedgerError::UnknownPosition(_))));
    }

    #[test]
    fn test_close_unknown_id_fails() {
        let mut ledger = ledger(5);
        let err = ledger.close(
            &PositionId::new("missing"),
            ExitReason::ProfitTarget,
            Utc::now(),
        );
        assert!(matches!(err, Err(LedgerError::UnknownPosition(_))));
    }

    #[test]
    fn test_exit_due_profit_target() {
        let mut ledger = ledger(5);
        let now = Utc::now();
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        let pos = ledger.open_positions().into_iter().find(|p| p.id == id).unwrap();

        assert_eq!(
            ledger.exit_due(&pos, now, 3.5, 7),
            Some(ExitReason::ProfitTarget)
        );
        assert_eq!(ledger.exit_due(&pos, now, 3.49, 7), Some(ExitReason::ProfitTarget));
    }

    #[test]
    fn test_exit_due_expiry_regardless_of_value() {
        let mut ledger = ledger(5);
        // entry 2025-09-13, expiry 2025-09-19: six days out, min_dte 7
        let now = Utc.with_ymd_and_hms(2025, 9, 13, 15, 0, 0).unwrap();
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        let pos = ledger.open_positions().into_iter().find(|p| p.id == id).unwrap();

        // spread value well above target
        assert_eq!(
            ledger.exit_due(&pos, now, 6.5, 7),
            Some(ExitReason::ExpiryApproaching)
        );
    }

    #[test]
    fn test_exit_due_profit_target_takes_priority() {
        let mut ledger = ledger(5);
        let now = Utc.with_ymd_and_hms(2025, 9, 13, 15, 0, 0).unwrap();
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        let pos = ledger.open_positions().into_iter().find(|p| p.id == id).unwrap();

        // both conditions hold; the profitable exit wins
        assert_eq!(
            ledger.exit_due(&pos, now, 2.0, 7),
            Some(ExitReason::ProfitTarget)
        );
    }

    #[test]
    fn test_exit_due_none_when_neither_holds() {
        let mut ledger = ledger(5);
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 15, 0, 0).unwrap();
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        let pos = ledger.open_positions().into_iter().find(|p| p.id == id).unwrap();

        assert_eq!(ledger.exit_due(&pos, now, 6.5, 7), None);
    }

    #[test]
    fn test_recover_restores_open_positions() {
        let store = StateStore::open_in_memory().unwrap();
        let now = Utc::now();

        let mut ledger = PositionLedger::new(store.clone(), 5);
        let id = ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        ledger.open(&candidate(), &metrics(), 2, expiry(), now).unwrap();
        ledger.close(&id, ExitReason::ProfitTarget, now).unwrap();

        let mut recovered = PositionLedger::new(store, 5);
        assert_eq!(recovered.recover().unwrap(), 1);
        assert_eq!(recovered.open_count(), 1);
        assert_eq!(recovered.open_positions()[0].quantity, 2);
    }

    #[test]
    fn test_recovery_respects_position_limit() {
        let store = StateStore::open_in_memory().unwrap();
        let now = Utc::now();

        let mut ledger = PositionLedger::new(store.clone(), 5);
        ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();
        ledger.open(&candidate(), &metrics(), 1, expiry(), now).unwrap();

        let mut recovered = PositionLedger::new(store, 2);
        recovered.recover().unwrap();
        let err = recovered.open(&candidate(), &metrics(), 1, expiry(), now + Duration::days(1));
        assert!(matches!(
            err,
            Err(LedgerError::PositionLimitExceeded { limit: 2 })
        ));
    }
}
