//! Alpaca brokerage integration
//!
//! Concrete `MarketData` + `Execution` implementation over the Alpaca REST
//! API. SPY bars proxy the SPX index.

pub mod client;
pub mod types;

pub use client::AlpacaClient;
