//! Alpaca REST client
//!
//! HTTP client for market data and multi-leg option orders. Transport
//! failures surface as the transient `BrokerError` kinds; an order that
//! cannot be confirmed within the configured timeout is reported as
//! `OrderOutcome::Timeout` and never recorded by the caller.

use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use super::types::{
    BarsResponse, ContractsResponse, LatestQuotesResponse, OptionContract, OrderLeg, OrderRequest,
    OrderResponse,
};
use crate::broker::{Execution, MarketData, OrderConfirmation, OrderOutcome};
use crate::config::BrokerConfig;
use crate::types::{BrokerError, ChainSnapshot, OptionQuote, Position, PriceBar, SpreadCandidate};

/// Seconds between order-status polls while awaiting a fill
const FILL_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AlpacaClient {
    http: Client,
    api_key: String,
    api_secret: String,
    trading_base: String,
    data_base: String,
    /// Underlying used to build option symbols for order legs
    underlying: String,
    order_timeout: Duration,
}

impl AlpacaClient {
    pub fn new(config: &BrokerConfig, underlying: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(AlpacaClient {
            http,
            api_key: config.api_key.clone().unwrap_or_default(),
            api_secret: config.api_secret.clone().unwrap_or_default(),
            trading_base: config.trading_base_url.clone(),
            data_base: config.data_base_url.clone(),
            underlying: underlying.into(),
            order_timeout: Duration::from_secs(config.order_timeout_secs),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse, BrokerError> {
        let url = format!("{}/v2/orders/{}", self.trading_base, order_id);
        let response = self.get(&url).send().await.map_err(transport_error)?;
        response
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)
    }

    async fn cancel_order(&self, order_id: &str) {
        let url = format!("{}/v2/orders/{}", self.trading_base, order_id);
        if let Err(e) = self
            .http
            .delete(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .send()
            .await
        {
            warn!("Failed to cancel order {order_id}: {e}");
        }
    }

    /// Place an order and poll its status until fill, terminal rejection,
    /// or the bounded confirmation wait runs out.
    async fn place_and_await(&self, order: &OrderRequest) -> Result<OrderOutcome, BrokerError> {
        let url = format!("{}/v2/orders", self.trading_base);
        let response = self
            .post(&url)
            .json(order)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            let body = response.text().await.unwrap_or_default();
            return Ok(OrderOutcome::Rejected(body));
        }
        let placed: OrderResponse = response
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        debug!("Order {} placed, awaiting fill", placed.id);

        let deadline = tokio::time::Instant::now() + self.order_timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                // Unconfirmed: cancel best-effort and report a timeout so the
                // caller records nothing.
                self.cancel_order(&placed.id).await;
                return Ok(OrderOutcome::Timeout);
            }

            match self.get_order(&placed.id).await {
                Ok(order) => match order.status.as_str() {
                    "filled" => {
                        let fill_price = order
                            .filled_avg_price
                            .as_deref()
                            .and_then(|p| p.parse().ok())
                            .unwrap_or(0.0);
                        return Ok(OrderOutcome::Filled(OrderConfirmation {
                            order_id: order.id,
                            fill_price,
                            filled_at: Utc::now(),
                        }));
                    }
                    "rejected" | "canceled" | "expired" => {
                        return Ok(OrderOutcome::Rejected(order.status));
                    }
                    other => debug!("Order {} still {}", order.id, other),
                },
                Err(e) => warn!("Order status poll failed: {e}"),
            }

            tokio::time::sleep(FILL_POLL_INTERVAL).await;
        }
    }
}

impl MarketData for AlpacaClient {
    async fn price_history(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>, BrokerError> {
        let start = (Utc::now() - ChronoDuration::days(lookback_days as i64)).date_naive();
        let url = format!(
            "{}/v2/stocks/{}/bars?timeframe=1Day&start={}&limit=10000&adjustment=split",
            self.data_base, symbol, start
        );

        let response = self.get(&url).send().await.map_err(transport_error)?;
        let body: BarsResponse = response
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        let bars: Vec<PriceBar> = body
            .bars
            .iter()
            .map(|b| PriceBar::new_unchecked(b.timestamp, b.close))
            .collect();

        if bars.is_empty() {
            return Err(BrokerError::DataUnavailable(format!(
                "no bars returned for {symbol}"
            )));
        }
        debug!("Fetched {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }

    async fn chain_snapshot(
        &self,
        symbol: &str,
        target_expiry_days: u32,
    ) -> Result<ChainSnapshot, BrokerError> {
        let today = Utc::now().date_naive();
        let window_end = today + ChronoDuration::days(2 * target_expiry_days.max(1) as i64);
        let url = format!(
            "{}/v2/options/contracts?underlying_symbols={}&type=put&limit=500\
             &expiration_date_gte={}&expiration_date_lte={}",
            self.trading_base, symbol, today, window_end
        );

        let response = self.get(&url).send().await.map_err(transport_error)?;
        let body: ContractsResponse = response
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        let target_date = today + ChronoDuration::days(target_expiry_days as i64);
        let Some(expiry) = nearest_expiry(&body.option_contracts, target_date) else {
            return Err(BrokerError::DataUnavailable(format!(
                "no put expirations listed for {symbol}"
            )));
        };

        let contracts: Vec<&OptionContract> = body
            .option_contracts
            .iter()
            .filter(|c| c.expiration_date == expiry)
            .collect();

        let symbols: Vec<&str> = contracts.iter().map(|c| c.symbol.as_str()).collect();
        let url = format!(
            "{}/v1beta1/options/quotes/latest?symbols={}",
            self.data_base,
            symbols.join(",")
        );
        let response = self.get(&url).send().await.map_err(transport_error)?;
        let quotes: LatestQuotesResponse = response
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        let mut chain_quotes = Vec::with_capacity(contracts.len());
        for contract in contracts {
            let Some(quote) = quotes.quotes.get(&contract.symbol) else {
                continue;
            };
            let Ok(strike) = contract.strike_price.parse::<f64>() else {
                warn!("Unparseable strike on {}: {}", contract.symbol, contract.strike_price);
                continue;
            };
            chain_quotes.push(OptionQuote {
                strike,
                bid: quote.bid,
                ask: quote.ask,
                expiry,
            });
        }

        if chain_quotes.is_empty() {
            return Err(BrokerError::DataUnavailable(format!(
                "no put quotes for {symbol} at {expiry}"
            )));
        }
        debug!("Chain snapshot: {} put quotes at {}", chain_quotes.len(), expiry);
        Ok(ChainSnapshot {
            expiry,
            quotes: chain_quotes,
        })
    }
}

impl Execution for AlpacaClient {
    async fn submit_entry(
        &self,
        candidate: &SpreadCandidate,
        quantity: u32,
    ) -> Result<OrderOutcome, BrokerError> {
        let credit = candidate.short_leg.mid() - candidate.long_leg.mid();
        let order = OrderRequest {
            order_class: "mleg".to_string(),
            qty: quantity.to_string(),
            order_type: "limit".to_string(),
            limit_price: Some(format!("{:.2}", credit)),
            time_in_force: "day".to_string(),
            legs: vec![
                OrderLeg {
                    symbol: occ_symbol(
                        &self.underlying,
                        candidate.short_leg.expiry,
                        candidate.short_leg.strike,
                    ),
                    ratio_qty: "1".to_string(),
                    side: "sell".to_string(),
                },
                OrderLeg {
                    symbol: occ_symbol(
                        &self.underlying,
                        candidate.long_leg.expiry,
                        candidate.long_leg.strike,
                    ),
                    ratio_qty: "1".to_string(),
                    side: "buy".to_string(),
                },
            ],
        };

        self.place_and_await(&order).await
    }

    async fn submit_exit(&self, position: &Position) -> Result<OrderOutcome, BrokerError> {
        // Exits unwind the spread at market: buy back the short leg, sell
        // the long leg.
        let order = OrderRequest {
            order_class: "mleg".to_string(),
            qty: position.quantity.to_string(),
            order_type: "market".to_string(),
            limit_price: None,
            time_in_force: "day".to_string(),
            legs: vec![
                OrderLeg {
                    symbol: occ_symbol(
                        &self.underlying,
                        position.short_leg.expiry,
                        position.short_leg.strike,
                    ),
                    ratio_qty: "1".to_string(),
                    side: "buy".to_string(),
                },
                OrderLeg {
                    symbol: occ_symbol(
                        &self.underlying,
                        position.long_leg.expiry,
                        position.long_leg.strike,
                    ),
                    ratio_qty: "1".to_string(),
                    side: "sell".to_string(),
                },
            ],
        };

        self.place_and_await(&order).await
    }
}

fn transport_error(e: reqwest::Error) -> BrokerError {
    if e.is_timeout() {
        BrokerError::Timeout
    } else {
        BrokerError::DataUnavailable(e.to_string())
    }
}

/// Listed expiry nearest to the target date
fn nearest_expiry(contracts: &[OptionContract], target: NaiveDate) -> Option<NaiveDate> {
    contracts
        .iter()
        .map(|c| c.expiration_date)
        .min_by_key(|expiry| (*expiry - target).num_days().abs())
}

/// OCC option symbol: root + YYMMDD + P + strike in thousandths, 8 digits
fn occ_symbol(underlying: &str, expiry: NaiveDate, strike: f64) -> String {
    format!(
        "{}{}P{:08}",
        underlying,
        expiry.format("%y%m%d"),
        (strike * 1000.0).round() as u64
    )
}
