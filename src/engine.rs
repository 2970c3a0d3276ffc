//! Strategy engine
//!
//! One logical pass per tick: evaluate exits for every open position, then
//! evaluate a possible entry. The engine is stateless between ticks except
//! through the position ledger, and depends on the brokerage only through
//! the `MarketData` and `Execution` traits.
//!
//! Error discipline: no-signal / no-candidate outcomes are logged and
//! dropped; transient collaborator failures skip the affected step until
//! the next scheduled tick; ledger invariant violations propagate.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::broker::{Execution, MarketData, OrderOutcome};
use crate::config::{Config, RiskConfig, StrategyConfig, TradingHours};
use crate::indicators;
use crate::ledger::PositionLedger;
use crate::signal;
use crate::spread;
use crate::types::{ExitReason, Position, SpreadMetrics};

/// Index option contract multiplier: one point of premium is $100
const CONTRACT_MULTIPLIER: f64 = 100.0;

pub struct StrategyEngine<M, E> {
    strategy: StrategyConfig,
    risk: RiskConfig,
    hours: TradingHours,
    market: M,
    execution: E,
    ledger: PositionLedger,
}

impl<M: MarketData, E: Execution> StrategyEngine<M, E> {
    pub fn new(config: &Config, market: M, execution: E, ledger: PositionLedger) -> Self {
        StrategyEngine {
            strategy: config.strategy.clone(),
            risk: config.risk.clone(),
            hours: config.hours.clone(),
            market,
            execution,
            ledger,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Run one tick: exits first, then at most one entry attempt.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.evaluate_exits(now).await?;
        self.evaluate_entry(now).await?;
        Ok(())
    }

    async fn evaluate_exits(&mut self, now: DateTime<Utc>) -> Result<()> {
        for position in self.ledger.open_positions() {
            let target_dte = position.days_to_expiry(now).max(0) as u32;

            let chain = match self
                .market
                .chain_snapshot(&self.strategy.symbol, target_dte)
                .await
            {
                Ok(chain) => chain,
                Err(e) => {
                    warn!("Chain unavailable for {}: {}; retrying next tick", position.id, e);
                    continue;
                }
            };

            if chain.expiry != position.expiry_date {
                warn!(
                    "Snapshot expiry {} does not match position {} expiry {}; skipping",
                    chain.expiry, position.id, position.expiry_date
                );
                continue;
            }

            let value = match spread::reprice(
                &chain,
                position.short_leg.strike,
                position.long_leg.strike,
            ) {
                Some(value) => value,
                None => {
                    warn!("Strikes missing from snapshot for {}; skipping", position.id);
                    continue;
                }
            };

            let Some(reason) = self
                .ledger
                .exit_due(&position, now, value, self.risk.min_dte)
            else {
                debug!(
                    "Holding {}: value {:.2} vs target {:.2}, {} DTE",
                    position.id,
                    value,
                    position.profit_target_price,
                    position.days_to_expiry(now)
                );
                continue;
            };

            info!("Exit due for {} ({reason}): spread value {:.2}", position.id, value);
            self.submit_exit(&position, reason, now).await?;
        }
        Ok(())
    }

    async fn submit_exit(
        &mut self,
        position: &Position,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.execution.submit_exit(position).await {
            Ok(OrderOutcome::Filled(confirmation)) => {
                // Close is recorded only after the broker confirms the fill.
                let closed = self.ledger.close(&position.id, reason, now)?;
                info!(
                    "Closed {} @ {:.2} debit, credit was {:.2} ({})",
                    closed.id, confirmation.fill_price, closed.credit_received, confirmation.order_id
                );
            }
            Ok(OrderOutcome::Timeout) => {
                warn!(
                    "Exit order for {} unconfirmed; position stays open for next tick",
                    position.id
                );
            }
            Ok(OrderOutcome::Rejected(why)) => {
                warn!("Exit order for {} rejected: {why}", position.id);
            }
            Err(e) => {
                warn!(
                    "Exit submission for {} failed: {e}; position stays open for next tick",
                    position.id
                );
            }
        }
        Ok(())
    }

    async fn evaluate_entry(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.ledger.open_count() >= self.risk.max_positions {
            debug!("At position limit ({}); no entry check", self.risk.max_positions);
            return Ok(());
        }
        if !self.hours.contains(now.time()) {
            debug!("Outside trading hours; no entry check");
            return Ok(());
        }

        let bars = match self
            .market
            .price_history(&self.strategy.symbol, self.strategy.lookback_days)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!("Price history unavailable: {e}; retrying next tick");
                return Ok(());
            }
        };

        let points = indicators::rsi(&bars, self.strategy.rsi_period)?;
        if let Some(latest) = points.last() {
            info!("Current RSI: {:.2}", latest.value);
        }

        if !signal::entry_signal(&points, self.strategy.rsi_threshold)? {
            debug!("No entry signal");
            return Ok(());
        }

        let Some(last_bar) = bars.last() else {
            return Ok(());
        };
        let current_price = last_bar.close;
        info!(
            "Entry signal: RSI crossed below {:.1} at price {:.2}",
            self.strategy.rsi_threshold, current_price
        );

        let chain = match self
            .market
            .chain_snapshot(&self.strategy.symbol, self.strategy.days_to_expiry)
            .await
        {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Chain unavailable: {e}; retrying next tick");
                return Ok(());
            }
        };

        let Some(candidate) = spread::select(
            &chain,
            current_price,
            self.strategy.spread_width,
            self.strategy.strike_proximity,
        ) else {
            info!("No viable spread candidate near {:.2}; no trade", current_price);
            return Ok(());
        };

        let metrics = spread::price(&candidate, self.strategy.profit_target);
        if !self.acceptable(&metrics) {
            return Ok(());
        }

        info!(
            "Submitting entry: {}/{} exp {} credit {:.2} risk {:.2} rr {:.2}",
            candidate.short_leg.strike,
            candidate.long_leg.strike,
            chain.expiry,
            metrics.net_credit,
            metrics.max_risk,
            metrics.risk_reward_ratio
        );

        match self
            .execution
            .submit_entry(&candidate, self.strategy.position_size)
            .await
        {
            Ok(OrderOutcome::Filled(confirmation)) => {
                // A position exists only once the broker confirms the fill.
                let id = self.ledger.open(
                    &candidate,
                    &metrics,
                    self.strategy.position_size,
                    chain.expiry,
                    now,
                )?;
                info!(
                    "Opened {} @ {:.2} credit, target {:.2} ({})",
                    id, confirmation.fill_price, metrics.profit_target_price, confirmation.order_id
                );
            }
            Ok(OrderOutcome::Timeout) => {
                warn!("Entry order unconfirmed; no position recorded");
            }
            Ok(OrderOutcome::Rejected(why)) => {
                warn!("Entry order rejected: {why}; fresh evaluation next tick");
            }
            Err(e) => {
                warn!("Entry submission failed: {e}; no position recorded");
            }
        }
        Ok(())
    }

    /// Entry acceptability: positive credit, per-trade risk under the
    /// ceiling, and total open risk (existing positions plus this one)
    /// under the portfolio ceiling.
    fn acceptable(&self, metrics: &SpreadMetrics) -> bool {
        if metrics.net_credit <= 0.0 {
            info!("Candidate has non-positive credit ({:.2}); no trade", metrics.net_credit);
            return false;
        }

        let trade_risk =
            metrics.max_risk * self.strategy.position_size as f64 * CONTRACT_MULTIPLIER;
        if trade_risk > self.risk.max_risk_per_trade {
            info!(
                "Candidate risk {:.0} exceeds per-trade ceiling {:.0}; no trade",
                trade_risk, self.risk.max_risk_per_trade
            );
            return false;
        }

        let portfolio_risk = self.ledger.total_open_risk() * CONTRACT_MULTIPLIER + trade_risk;
        if portfolio_risk > self.risk.max_portfolio_risk {
            info!(
                "Total open risk {:.0} would exceed portfolio ceiling {:.0}; no trade",
                portfolio_risk, self.risk.max_portfolio_risk
            );
            return false;
        }

        true
    }
}
