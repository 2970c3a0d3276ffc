//! Configuration management
//!
//! JSON configuration with environment variable support for API
//! credentials. All settings are plain numeric/boolean/string values and
//! are validated up front, before the engine starts.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub hours: TradingHours,
}

impl Config {
    /// Load configuration from a JSON file, overlaying API credentials from
    /// the environment when present.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(api_key) = std::env::var("ALPACA_API_KEY") {
            config.broker.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("ALPACA_API_SECRET") {
            config.broker.api_secret = Some(api_secret);
        }

        Ok(config)
    }

    /// Validate all settings, reporting every violation at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let s = &self.strategy;
        if s.rsi_threshold <= 0.0 || s.rsi_threshold >= 100.0 {
            errors.push("strategy.rsi_threshold must be between 0 and 100".to_string());
        }
        if s.rsi_period < 2 {
            errors.push("strategy.rsi_period must be at least 2".to_string());
        }
        if s.lookback_days as usize <= s.rsi_period {
            errors.push("strategy.lookback_days must exceed rsi_period".to_string());
        }
        if s.profit_target <= 0.0 || s.profit_target >= 1.0 {
            errors.push("strategy.profit_target must be between 0 and 1".to_string());
        }
        if s.position_size == 0 {
            errors.push("strategy.position_size must be greater than 0".to_string());
        }
        if s.spread_width <= 0.0 {
            errors.push("strategy.spread_width must be greater than 0".to_string());
        }
        if s.strike_proximity <= 0.0 {
            errors.push("strategy.strike_proximity must be greater than 0".to_string());
        }

        let r = &self.risk;
        if r.max_positions == 0 {
            errors.push("risk.max_positions must be greater than 0".to_string());
        }
        if r.min_dte >= s.days_to_expiry as i64 {
            errors.push("risk.min_dte must be below strategy.days_to_expiry".to_string());
        }
        if r.max_risk_per_trade <= 0.0 {
            errors.push("risk.max_risk_per_trade must be greater than 0".to_string());
        }
        if r.max_portfolio_risk < r.max_risk_per_trade {
            errors.push("risk.max_portfolio_risk must be at least max_risk_per_trade".to_string());
        }

        if self.hours.market_open >= self.hours.market_close {
            errors.push("hours.market_open must precede hours.market_close".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Configuration errors:\n{}", errors.join("\n"))
        }
    }
}

/// Strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Underlying symbol; SPY bars proxy the SPX index
    pub symbol: String,
    pub rsi_period: usize,
    pub rsi_threshold: f64,
    /// Days of price history fetched for the oscillator
    pub lookback_days: u32,
    /// Target days to expiration for new spreads
    pub days_to_expiry: u32,
    /// Width of the spread in points
    pub spread_width: f64,
    /// Short leg must sit within this many points of the current price
    pub strike_proximity: f64,
    /// Fraction of the credit taken as profit (0.5 = close at half the credit)
    pub profit_target: f64,
    /// Contracts per trade
    pub position_size: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            symbol: "SPY".to_string(),
            rsi_period: 14,
            rsi_threshold: 35.0,
            lookback_days: 100,
            days_to_expiry: 14,
            spread_width: 10.0,
            strike_proximity: 20.0,
            profit_target: 0.5,
            position_size: 1,
        }
    }
}

/// Risk management limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum number of concurrent open positions
    pub max_positions: usize,
    /// Minimum days to expiry before a position is force-closed
    pub min_dte: i64,
    /// Maximum risk per trade in dollars
    pub max_risk_per_trade: f64,
    /// Maximum total open risk in dollars
    pub max_portfolio_risk: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_positions: 5,
            min_dte: 7,
            max_risk_per_trade: 1000.0,
            max_portfolio_risk: 5000.0,
        }
    }
}

/// Brokerage connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    pub trading_base_url: String,
    pub data_base_url: String,
    /// Seconds to wait for an order fill before treating it as unconfirmed
    pub order_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            api_key: None,
            api_secret: None,
            trading_base_url: "https://paper-api.alpaca.markets".to_string(),
            data_base_url: "https://data.alpaca.markets".to_string(),
            order_timeout_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

/// Trading hours window, compared against the tick timestamp's clock time.
/// Defaults are 9:30-16:00 ET expressed in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingHours {
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
}

impl Default for TradingHours {
    fn default() -> Self {
        TradingHours {
            market_open: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
        }
    }
}

impl TradingHours {
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.market_open <= t && t <= self.market_close
    }
}
