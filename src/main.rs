//! Options trading strategies - main entry point
//!
//! This binary provides two subcommands:
//! - live: Run the bull put spread bot (paper or real)
//! - monitor: Watch the RSI signal without trading

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "options-strategies")]
#[command(about = "Automated bull put credit spread trading on an index proxy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run live trading
    Live {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/spx_bull_put.json")]
        config: String,

        /// Paper trading mode (safe, no real money)
        #[arg(long)]
        paper: bool,

        /// Live trading mode (CAUTION - REAL MONEY!)
        #[arg(long)]
        live: bool,

        /// Tick interval in seconds
        #[arg(long, default_value = "60")]
        interval: u64,

        /// State database path
        #[arg(long, default_value = "state.db")]
        state_db: String,
    },

    /// Watch the RSI entry signal without submitting orders
    Monitor {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/spx_bull_put.json")]
        config: String,

        /// Check interval in seconds
        #[arg(long, default_value = "300")]
        interval: u64,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Live { .. } => "live",
        Commands::Monitor { .. } => "monitor",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Live {
            config,
            paper,
            live,
            interval,
            state_db,
        } => commands::live::run(config, paper, live, interval, state_db),

        Commands::Monitor { config, interval } => commands::monitor::run(config, interval),
    }
}
