//! Technical indicators
//!
//! Wilder-smoothed RSI over daily closing prices. The oscillator drives
//! the oversold entry signal; values live in [0, 100].

use crate::types::{IndicatorError, OscillatorPoint, PriceBar};

/// Calculate RSI (Relative Strength Index) with Wilder smoothing.
///
/// Requires at least `period + 1` bars. The first point is emitted for the
/// bar at index `period`, once the lookback window is filled. Average gain
/// and loss are seeded with the simple mean of the first `period` changes,
/// then blended one bar at a time with weight `1/period`.
///
/// Pure function of its input; no state is carried between calls.
pub fn rsi(bars: &[PriceBar], period: usize) -> Result<Vec<OscillatorPoint>, IndicatorError> {
    let required = period + 1;
    if period == 0 || bars.len() < required {
        return Err(IndicatorError::InsufficientData {
            required: required.max(2),
            actual: bars.len(),
        });
    }

    let mut gains = Vec::with_capacity(bars.len() - 1);
    let mut losses = Vec::with_capacity(bars.len() - 1);
    for w in bars.windows(2) {
        let change = w[1].close - w[0].close;
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut points = Vec::with_capacity(bars.len() - period);
    points.push(OscillatorPoint {
        timestamp: bars[period].timestamp,
        value: oscillator_value(avg_gain, avg_loss),
    });

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        points.push(OscillatorPoint {
            timestamp: bars[i + 1].timestamp,
            value: oscillator_value(avg_gain, avg_loss),
        });
    }

    Ok(points)
}

fn oscillator_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
