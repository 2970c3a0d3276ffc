//! RSI monitor command
//!
//! Watches the oscillator and reports entry signals without submitting any
//! orders. Useful for sanity-checking the data feed and strategy settings
//! before enabling trading.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{info, warn};

use options_strategies::alpaca::AlpacaClient;
use options_strategies::broker::MarketData;
use options_strategies::{indicators, signal, Config};

pub fn run(config_path: String, interval_secs: u64) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, interval_secs))
}

async fn run_async(config_path: String, interval_secs: u64) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    config.validate()?;

    let strategy = &config.strategy;
    let client = AlpacaClient::new(&config.broker, strategy.symbol.clone())?;

    info!(
        "RSI monitor: {} with RSI({}) threshold {:.1}, checking every {}s",
        strategy.symbol, strategy.rsi_period, strategy.rsi_threshold, interval_secs
    );

    loop {
        match client
            .price_history(&strategy.symbol, strategy.lookback_days)
            .await
        {
            Ok(bars) => {
                let points = indicators::rsi(&bars, strategy.rsi_period)?;
                let fired = signal::entry_signal(&points, strategy.rsi_threshold)?;

                // rsi() guarantees at least one point on success
                if let (Some(point), Some(bar)) = (points.last(), bars.last()) {
                    info!(
                        "{}: price {:.2}, RSI({}) {:.2}",
                        strategy.symbol, bar.close, strategy.rsi_period, point.value
                    );

                    if fired {
                        info!("SIGNAL DETECTED: RSI crossed below {:.1}", strategy.rsi_threshold);
                        info!(
                            "Consider a bull put spread: sell near {:.0}, buy {:.0} lower, {} DTE, {:.0}% target",
                            bar.close,
                            strategy.spread_width,
                            strategy.days_to_expiry,
                            strategy.profit_target * 100.0
                        );
                    } else {
                        info!(
                            "No signal (RSI {:+.1} vs threshold); waiting",
                            point.value - strategy.rsi_threshold
                        );
                    }
                }
            }
            Err(e) => {
                warn!("Failed to fetch market data: {e}; retrying next check");
            }
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Monitor stopped by user");
                break;
            }
        }
    }

    Ok(())
}
