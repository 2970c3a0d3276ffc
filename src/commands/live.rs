//! Live trading command
//!
//! Tick driver for the strategy engine: a fixed-interval async loop with
//! graceful shutdown. Each tick is awaited to completion before the next
//! select, so a stop signal never interrupts an in-flight position
//! evaluation or leaves an order half-confirmed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};

use options_strategies::alpaca::AlpacaClient;
use options_strategies::broker::{Execution, MarketData, PaperExecution};
use options_strategies::engine::StrategyEngine;
use options_strategies::ledger::PositionLedger;
use options_strategies::state::StateStore;
use options_strategies::Config;

pub fn run(
    config_path: String,
    paper: bool,
    live: bool,
    interval_secs: u64,
    state_db: String,
) -> Result<()> {
    if !paper && !live {
        anyhow::bail!("Must specify either --paper or --live mode");
    }
    if paper && live {
        anyhow::bail!("Cannot specify both --paper and --live modes");
    }

    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, paper, interval_secs, state_db))
}

async fn run_async(
    config_path: String,
    paper_mode: bool,
    interval_secs: u64,
    state_db: String,
) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    config.validate()?;

    let mode_str = if paper_mode { "PAPER" } else { "LIVE" };
    info!("SPX bull put credit spread bot - {} mode", mode_str);
    info!(
        "Underlying: {} | RSI {} < {} | {} DTE, {} wide, {:.0}% target",
        config.strategy.symbol,
        config.strategy.rsi_period,
        config.strategy.rsi_threshold,
        config.strategy.days_to_expiry,
        config.strategy.spread_width,
        config.strategy.profit_target * 100.0
    );
    info!(
        "Limits: {} positions, min {} DTE, {:.0}/trade, {:.0}/portfolio",
        config.risk.max_positions,
        config.risk.min_dte,
        config.risk.max_risk_per_trade,
        config.risk.max_portfolio_risk
    );

    if !paper_mode {
        warn!("LIVE TRADING MODE - REAL MONEY AT RISK!");
        warn!("Press Ctrl+C within 10 seconds to abort...");
        for i in (1..=10).rev() {
            info!("Starting in {} seconds...", i);
            sleep(Duration::from_secs(1)).await;
        }
    }

    let store = StateStore::open(&state_db)?;
    let mut ledger = PositionLedger::new(store, config.risk.max_positions);
    let recovered = ledger.recover()?;
    if recovered > 0 {
        info!("Recovered {} open positions from {}", recovered, state_db);
    }

    let client = AlpacaClient::new(&config.broker, config.strategy.symbol.clone())?;

    if paper_mode {
        let engine = StrategyEngine::new(&config, client, PaperExecution::new(), ledger);
        run_loop(engine, &config, interval_secs).await
    } else {
        let execution = client.clone();
        let engine = StrategyEngine::new(&config, client, execution, ledger);
        run_loop(engine, &config, interval_secs).await
    }
}

async fn run_loop<M: MarketData, E: Execution>(
    mut engine: StrategyEngine<M, E>,
    config: &Config,
    interval_secs: u64,
) -> Result<()> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let mut cycle_interval = interval(Duration::from_secs(interval_secs));
    let mut cycle: u64 = 0;

    info!("Starting trading loop...");

    loop {
        tokio::select! {
            _ = cycle_interval.tick() => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    break;
                }

                let now = Utc::now();
                if !config.hours.contains(now.time()) {
                    debug!("Outside trading hours; idle");
                    continue;
                }

                cycle += 1;
                info!("--- tick {} ---", cycle);

                // Invariant violations abort the loop: continuing after one
                // risks duplicate or inconsistent positions.
                engine
                    .tick(now)
                    .await
                    .with_context(|| format!("tick {cycle} failed"))?;

                info!(
                    "Tick {} complete: {} open positions",
                    cycle,
                    engine.ledger().open_count()
                );
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!(
        "Live trading session ended with {} open positions",
        engine.ledger().open_count()
    );
    Ok(())
}
