//! Alpaca API wire types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct BarsResponse {
    pub bars: Vec<Bar>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Bar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

#[derive(Debug, Deserialize)]
pub struct ContractsResponse {
    pub option_contracts: Vec<OptionContract>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    /// Alpaca serializes strikes as strings
    pub strike_price: String,
    pub expiration_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuotesResponse {
    pub quotes: HashMap<String, LatestQuote>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatestQuote {
    #[serde(rename = "bp")]
    pub bid: f64,
    #[serde(rename = "ap")]
    pub ask: f64,
}

#[derive(Debug, Serialize)]
pub struct OrderLeg {
    pub symbol: String,
    pub ratio_qty: String,
    pub side: String, // "buy" or "sell"
}

#[derive(Debug, Serialize)]
pub struct OrderRequest {
    pub order_class: String, // "mleg"
    pub qty: String,
    #[serde(rename = "type")]
    pub order_type: String, // "limit" or "market"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    pub time_in_force: String,
    pub legs: Vec<OrderLeg>,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub filled_avg_price: Option<String>,
}
