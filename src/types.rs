//! Core data types used across the trading system

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for price bars
#[derive(Debug, Error)]
pub enum PriceBarValidationError {
    #[error("close ({0}) must be positive")]
    NonPositiveClose(f64),

    #[error("close ({0}) must be finite")]
    NonFiniteClose(f64),
}

/// Errors from indicator computation
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("insufficient data: need at least {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },
}

/// Errors from signal detection
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("insufficient history: need at least 2 oscillator points, got {0}")]
    InsufficientHistory(usize),
}

/// Errors from the position ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("position limit exceeded: {limit} positions already open")]
    PositionLimitExceeded { limit: usize },

    #[error("unknown position: {0}")]
    UnknownPosition(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Errors from brokerage collaborators
///
/// Both variants are transient: the engine skips the affected step for the
/// current tick and retries on the next scheduled tick.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("brokerage request timed out")]
    Timeout,
}

/// Validation errors for spread candidates
#[derive(Debug, Error)]
pub enum SpreadValidationError {
    #[error("short strike ({short}) must be above long strike ({long})")]
    ShortNotAboveLong { short: f64, long: f64 },

    #[error("legs must share an expiry: short {short}, long {long}")]
    ExpiryMismatch { short: NaiveDate, long: NaiveDate },
}

/// Daily closing price for the underlying
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PriceBar {
    /// Create a new bar with validation
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Result<Self, PriceBarValidationError> {
        if !close.is_finite() {
            return Err(PriceBarValidationError::NonFiniteClose(close));
        }
        if close <= 0.0 {
            return Err(PriceBarValidationError::NonPositiveClose(close));
        }
        Ok(Self { timestamp, close })
    }

    /// Create a bar without validation (for trusted sources)
    pub fn new_unchecked(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self { timestamp, close }
    }
}

/// One oscillator observation, defined once the lookback window is filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorPoint {
    pub timestamp: DateTime<Utc>,
    /// RSI value in [0, 100]
    pub value: f64,
}

/// Put option quote from a chain snapshot; not persisted across ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub bid: f64,
    pub ask: f64,
    pub expiry: NaiveDate,
}

impl OptionQuote {
    /// Mid price between bid and ask
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Option chain snapshot with its resolved expiry
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub expiry: NaiveDate,
    pub quotes: Vec<OptionQuote>,
}

/// Bull put spread: short the higher strike, long the lower strike
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpreadCandidate {
    pub short_leg: OptionQuote,
    pub long_leg: OptionQuote,
}

impl SpreadCandidate {
    /// Create a candidate, enforcing the strike and expiry invariants
    pub fn new(
        short_leg: OptionQuote,
        long_leg: OptionQuote,
    ) -> Result<Self, SpreadValidationError> {
        if short_leg.strike <= long_leg.strike {
            return Err(SpreadValidationError::ShortNotAboveLong {
                short: short_leg.strike,
                long: long_leg.strike,
            });
        }
        if short_leg.expiry != long_leg.expiry {
            return Err(SpreadValidationError::ExpiryMismatch {
                short: short_leg.expiry,
                long: long_leg.expiry,
            });
        }
        Ok(Self {
            short_leg,
            long_leg,
        })
    }

    /// Distance between the strikes in points
    pub fn strike_width(&self) -> f64 {
        self.short_leg.strike - self.long_leg.strike
    }
}

/// Derived spread metrics, recomputed on every evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadMetrics {
    pub net_credit: f64,
    pub max_risk: f64,
    pub profit_target_price: f64,
    pub risk_reward_ratio: f64,
}

/// Position identifier, monotonic-time-derived
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(String);

impl PositionId {
    pub fn new(s: impl Into<String>) -> Self {
        PositionId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position lifecycle state; one-way Open -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An open or closed spread position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub short_leg: OptionQuote,
    pub long_leg: OptionQuote,
    pub quantity: u32,
    pub entry_time: DateTime<Utc>,
    pub credit_received: f64,
    pub profit_target_price: f64,
    pub expiry_date: NaiveDate,
    pub status: PositionStatus,
}

impl Position {
    /// Calendar days until expiry, truncated toward zero
    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry_date - now.date_naive()).num_days()
    }

    /// Maximum loss per spread in points: strike width minus credit received
    pub fn max_risk(&self) -> f64 {
        (self.short_leg.strike - self.long_leg.strike) - self.credit_received
    }
}

/// Why a position is due to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    ProfitTarget,
    ExpiryApproaching,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::ExpiryApproaching => "expiry_approaching",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(strike: f64, bid: f64, ask: f64) -> OptionQuote {
        OptionQuote {
            strike,
            bid,
            ask,
            expiry: NaiveDate::from_ymd_opt(2025, 9, 19).unwrap(),
        }
    }

    #[test]
    fn test_price_bar_rejects_non_positive_close() {
        let err = PriceBar::new(Utc::now(), 0.0);
        assert!(matches!(
            err,
            Err(PriceBarValidationError::NonPositiveClose(_))
        ));
    }

    #[test]
    fn test_option_quote_mid() {
        let q = quote(4500.0, 11.0, 13.0);
        assert_eq!(q.mid(), 12.0);
    }

    #[test]
    fn test_spread_candidate_requires_short_above_long() {
        let err = SpreadCandidate::new(quote(4490.0, 5.0, 5.2), quote(4500.0, 11.0, 13.0));
        assert!(matches!(
            err,
            Err(SpreadValidationError::ShortNotAboveLong { .. })
        ));
    }

    #[test]
    fn test_spread_candidate_requires_matching_expiry() {
        let mut long = quote(4490.0, 5.0, 5.2);
        long.expiry = NaiveDate::from_ymd_opt(2025, 9, 26).unwrap();
        let err = SpreadCandidate::new(quote(4500.0, 11.0, 13.0), long);
        assert!(matches!(
            err,
            Err(SpreadValidationError::ExpiryMismatch { .. })
        ));
    }

    #[test]
    fn test_strike_width() {
        let candidate =
            SpreadCandidate::new(quote(4500.0, 11.0, 13.0), quote(4490.0, 5.0, 5.2)).unwrap();
        assert_eq!(candidate.strike_width(), 10.0);
    }
}
