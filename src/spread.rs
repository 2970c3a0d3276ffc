//! Bull put spread construction and pricing
//!
//! The selector picks a short leg near the money and a long leg one spread
//! width below it from a single-expiry chain snapshot. Selection is fully
//! deterministic: minimal strike distance wins, ties go to the higher
//! strike. Failing to find either leg is a normal no-trade outcome.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::types::{ChainSnapshot, OptionQuote, SpreadCandidate, SpreadMetrics};

/// How far the long leg may sit from its target strike, in points
pub const LONG_LEG_STRIKE_TOLERANCE: f64 = 5.0;

/// Select a spread candidate from a chain snapshot.
///
/// Short leg: the quote with minimal `|strike - current_price|` among quotes
/// within `proximity` points of the current price. Long leg: the quote with
/// minimal distance to `short.strike - spread_width`, within a fixed
/// tolerance, strictly below the short strike. Returns `None` when either
/// leg cannot be found.
pub fn select(
    chain: &ChainSnapshot,
    current_price: f64,
    spread_width: f64,
    proximity: f64,
) -> Option<SpreadCandidate> {
    let short_leg = match nearest_strike(&chain.quotes, chain, current_price, proximity) {
        Some(q) => q,
        None => {
            debug!(
                current_price,
                proximity, "no short leg within proximity of current price"
            );
            return None;
        }
    };

    let target = short_leg.strike - spread_width;
    let below_short: Vec<OptionQuote> = chain
        .quotes
        .iter()
        .filter(|q| q.strike < short_leg.strike)
        .copied()
        .collect();
    let long_leg = match nearest_strike(&below_short, chain, target, LONG_LEG_STRIKE_TOLERANCE) {
        Some(q) => q,
        None => {
            debug!(target, "no long leg within tolerance of target strike");
            return None;
        }
    };

    // Both legs come from the snapshot's single expiry, so the constructor
    // invariants hold by construction.
    SpreadCandidate::new(short_leg, long_leg).ok()
}

/// Quote with minimal distance to `target` within `tolerance`; ties break
/// toward the higher strike for reproducibility.
fn nearest_strike(
    quotes: &[OptionQuote],
    chain: &ChainSnapshot,
    target: f64,
    tolerance: f64,
) -> Option<OptionQuote> {
    quotes
        .iter()
        .filter(|q| q.expiry == chain.expiry && (q.strike - target).abs() <= tolerance)
        .min_by_key(|q| {
            (
                OrderedFloat((q.strike - target).abs()),
                Reverse(OrderedFloat(q.strike)),
            )
        })
        .copied()
}

/// Compute credit, risk, and exit targets for a candidate spread.
///
/// `risk_reward_ratio` is 0 for degenerate spreads (`max_risk <= 0`) so
/// callers can filter without handling a special error.
pub fn price(candidate: &SpreadCandidate, profit_target_fraction: f64) -> SpreadMetrics {
    let net_credit = candidate.short_leg.mid() - candidate.long_leg.mid();
    let max_risk = candidate.strike_width() - net_credit;
    let profit_target_price = net_credit * (1.0 - profit_target_fraction);
    let risk_reward_ratio = if max_risk > 0.0 {
        net_credit / max_risk
    } else {
        0.0
    };

    SpreadMetrics {
        net_credit,
        max_risk,
        profit_target_price,
        risk_reward_ratio,
    }
}

/// Current mid-price debit to close a spread, repriced from a fresh snapshot.
///
/// Returns `None` when either strike is missing from the snapshot, in which
/// case the caller skips the evaluation for this tick.
pub fn reprice(chain: &ChainSnapshot, short_strike: f64, long_strike: f64) -> Option<f64> {
    let short = quote_at(&chain.quotes, short_strike)?;
    let long = quote_at(&chain.quotes, long_strike)?;
    Some(short.mid() - long.mid())
}

fn quote_at(quotes: &[OptionQuote], strike: f64) -> Option<&OptionQuote> {
    quotes.iter().find(|q| (q.strike - strike).abs() < 1e-9)
}
