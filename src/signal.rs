//! Entry signal detection
//!
//! A trade signal is a downward crossing of the oscillator through the
//! configured threshold, not merely a reading below it. An oscillator that
//! lingers in oversold territory fires exactly once, on the crossing tick,
//! which prevents stacking duplicate entries while RSI stays low.

use crate::types::{OscillatorPoint, SignalError};

/// Check whether the most recent oscillator observation crossed below the
/// threshold.
///
/// Fires iff the latest value is strictly below `threshold` and the
/// immediately preceding value was at or above it.
pub fn entry_signal(points: &[OscillatorPoint], threshold: f64) -> Result<bool, SignalError> {
    if points.len() < 2 {
        return Err(SignalError::InsufficientHistory(points.len()));
    }

    let current = points[points.len() - 1].value;
    let previous = points[points.len() - 2].value;

    Ok(current < threshold && previous >= threshold)
}
