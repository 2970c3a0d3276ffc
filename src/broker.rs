//! Brokerage collaborator interfaces
//!
//! The engine talks to the outside world through two narrow capabilities:
//! `MarketData` for history and chain snapshots, `Execution` for order
//! submission. One concrete implementation exists per brokerage (see the
//! `alpaca` module); the engine depends only on these traits.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::types::{BrokerError, ChainSnapshot, Position, PriceBar, SpreadCandidate};

/// A confirmed order fill
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub fill_price: f64,
    pub filled_at: DateTime<Utc>,
}

/// Terminal outcome of one order attempt.
///
/// `Timeout` means the order is unconfirmed: the caller must not record an
/// open or close for it, and makes a fresh decision next tick. `Rejected`
/// is terminal for the attempt; there is no automatic retry at different
/// pricing.
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Filled(OrderConfirmation),
    Timeout,
    Rejected(String),
}

/// Historical prices and option chain snapshots
#[allow(async_fn_in_trait)]
pub trait MarketData {
    async fn price_history(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, BrokerError>;

    /// Snapshot of put quotes at the listed expiry nearest to
    /// `target_expiry_days` out.
    async fn chain_snapshot(
        &self,
        symbol: &str,
        target_expiry_days: u32,
    ) -> Result<ChainSnapshot, BrokerError>;
}

/// Spread order submission with bounded-wait confirmation
#[allow(async_fn_in_trait)]
pub trait Execution {
    async fn submit_entry(
        &self,
        candidate: &SpreadCandidate,
        quantity: u32,
    ) -> Result<OrderOutcome, BrokerError>;

    async fn submit_exit(&self, position: &Position) -> Result<OrderOutcome, BrokerError>;
}

/// Simulated execution for paper trading: every order fills immediately at
/// its limit price (entry at the mid credit, exit at the requested debit).
pub struct PaperExecution {
    next_order_id: AtomicU64,
}

impl PaperExecution {
    pub fn new() -> Self {
        PaperExecution {
            next_order_id: AtomicU64::new(1),
        }
    }

    fn confirmation(&self, fill_price: f64) -> OrderConfirmation {
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        OrderConfirmation {
            order_id: format!("PAPER-{id}"),
            fill_price,
            filled_at: Utc::now(),
        }
    }
}

impl Default for PaperExecution {
    fn default() -> Self {
        Self::new()
    }
}

impl Execution for PaperExecution {
    async fn submit_entry(
        &self,
        candidate: &SpreadCandidate,
        quantity: u32,
    ) -> Result<OrderOutcome, BrokerError> {
        let credit = candidate.short_leg.mid() - candidate.long_leg.mid();
        let confirmation = self.confirmation(credit);
        info!(
            "[PAPER] SELL {}x {}/{} put spread @ {:.2} credit ({})",
            quantity,
            candidate.short_leg.strike,
            candidate.long_leg.strike,
            credit,
            confirmation.order_id
        );
        Ok(OrderOutcome::Filled(confirmation))
    }

    async fn submit_exit(&self, position: &Position) -> Result<OrderOutcome, BrokerError> {
        let confirmation = self.confirmation(position.profit_target_price);
        info!(
            "[PAPER] BUY to close {} @ {:.2} debit ({})",
            position.id, confirmation.fill_price, confirmation.order_id
        );
        Ok(OrderOutcome::Filled(confirmation))
    }
}
