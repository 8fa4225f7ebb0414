//! Feature derivation over ordered candle sequences.
//!
//! A single left-to-right pass turns `n` candles into `n` index-aligned
//! [`FeatureVector`]s. Index `i` may look back at candles `[i-23 .. i]`
//! (the regime window is the widest), never forward. Every division whose
//! denominator can be zero resolves to a documented default instead of
//! propagating NaN/Infinity — a non-finite value entering the training
//! matrix would silently poison gradient-based training.

use vigil_core::types::Candle;

use crate::vector::FeatureVector;
use crate::FeatureError;

/// Volume surge threshold in percent; `volume_spike` measures the excess
/// above it.
const VOLUME_SURGE_THRESHOLD: f64 = 30.0;

/// RSI look-back window (trailing candles, inclusive of the current one).
const RSI_WINDOW: usize = 14;

/// Bollinger band look-back window.
const BOLLINGER_WINDOW: usize = 20;

/// Market regime look-back window.
const REGIME_WINDOW: usize = 24;

/// Derive one feature vector per candle.
///
/// The output is index-aligned with the input. Fails only on an empty
/// input; numeric edge cases (zero closes, zero volumes, flat windows)
/// resolve to per-feature defaults.
pub fn build_features(candles: &[Candle]) -> Result<Vec<FeatureVector>, FeatureError> {
    if candles.is_empty() {
        return Err(FeatureError::EmptyCandles);
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut out: Vec<FeatureVector> = Vec::with_capacity(candles.len());

    for (i, c) in candles.iter().enumerate() {
        let price_change = if i == 0 {
            0.0
        } else {
            pct_change(candles[i - 1].close, c.close)
        };
        let volume_change = if i == 0 {
            0.0
        } else {
            pct_change(candles[i - 1].volume, c.volume)
        };
        let volatility = if c.high > c.low && c.close != 0.0 {
            (c.high - c.low) / c.close * 100.0
        } else {
            0.0
        };
        let price_acceleration = if i < 2 {
            0.0
        } else {
            price_change - out[i - 1].price_change
        };
        let volume_spike = if i == 0 {
            0.0
        } else {
            (volume_change - VOLUME_SURGE_THRESHOLD).max(0.0)
        };
        let price_gap = if i == 0 || candles[i - 1].close == 0.0 {
            0.0
        } else {
            (c.open - candles[i - 1].close).abs() / candles[i - 1].close * 100.0
        };
        let price_momentum = if i < 3 {
            0.0
        } else {
            pct_change(candles[i - 3].close, c.close)
        };
        let volume_momentum = if i < 3 {
            0.0
        } else {
            pct_change(candles[i - 3].volume, c.volume)
        };

        let rsi = rsi(&closes[i.saturating_sub(RSI_WINDOW - 1)..=i]);
        let bollinger_position =
            bollinger_position(&closes[i.saturating_sub(BOLLINGER_WINDOW - 1)..=i], c.close);
        let market_regime = market_regime(&closes[i.saturating_sub(REGIME_WINDOW - 1)..=i]);

        let funding_rate_proxy = ((price_change / 10.0).tanh() * 0.5
            + (volume_change / 50.0).tanh() * 0.3
            + (volatility / 5.0).tanh() * 0.2)
            * 0.01;
        let open_interest_proxy = (c.volume + 1.0).ln() / 10.0 * 0.4
            + c.trade_count as f64 / 1000.0 * 0.3
            + price_change.abs() / 10.0 * 0.3;

        out.push(FeatureVector {
            price_change: finite_or_zero(price_change),
            volume: finite_or_zero(c.volume),
            funding_rate_proxy: finite_or_zero(funding_rate_proxy),
            open_interest_proxy: finite_or_zero(open_interest_proxy),
            price_acceleration: finite_or_zero(price_acceleration),
            volume_spike: finite_or_zero(volume_spike),
            price_gap: finite_or_zero(price_gap),
            price_momentum: finite_or_zero(price_momentum),
            volume_momentum: finite_or_zero(volume_momentum),
            rsi: finite_or_zero(rsi),
            bollinger_position: finite_or_zero(bollinger_position),
            market_regime: finite_or_zero(market_regime),
            volume_change: finite_or_zero(volume_change),
            volatility: finite_or_zero(volatility),
        });
    }

    Ok(out)
}

/// Percent change from `prev` to `cur`; 0 when `prev` is 0.
pub fn pct_change(prev: f64, cur: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (cur - prev) / prev * 100.0
    }
}

/// Replace NaN/Infinity with 0 so no non-finite value reaches the matrix.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Mean and population standard deviation of a slice.
///
/// Returns `(0, 0)` for an empty slice.
fn mean_and_pop_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Relative Strength Index over a trailing close window.
///
/// With fewer than 2 points there is no movement to measure: returns the
/// neutral 50. The zero-loss check precedes the zero-gain check, so a
/// perfectly flat window (gains and losses both 0) yields 100.
fn rsi(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 50.0;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let diff = pair[1] - pair[0];
        if diff >= 0.0 {
            gains += diff;
        } else {
            losses += -diff;
        }
    }
    if losses == 0.0 {
        return 100.0;
    }
    if gains == 0.0 {
        return 0.0;
    }
    // Average gain / average loss — the window counts cancel.
    let rs = gains / losses;
    100.0 - 100.0 / (1.0 + rs)
}

/// Position of `close` within the 20-period Bollinger band.
///
/// Neutral 0 until a full window is available. -1 at or below the lower
/// band, 1 at or above the upper band, otherwise the signed distance from
/// the mean scaled by the band half-width. The lower-band check runs
/// first, so a zero-width band (flat window) yields -1.
fn bollinger_position(window: &[f64], close: f64) -> f64 {
    if window.len() < BOLLINGER_WINDOW {
        return 0.0;
    }
    let (mean, std) = mean_and_pop_std(window);
    let upper = mean + 2.0 * std;
    let lower = mean - 2.0 * std;
    if close <= lower {
        return -1.0;
    }
    if close >= upper {
        return 1.0;
    }
    if upper == mean {
        0.0
    } else {
        (close - mean) / (upper - mean)
    }
}

/// Trend regime over the 24-period close window.
///
/// Neutral 0 until a full window is available. ±1 when the total percent
/// move across the window exceeds twice the single-step return volatility,
/// otherwise 0.
fn market_regime(window: &[f64]) -> f64 {
    if window.len() < REGIME_WINDOW {
        return 0.0;
    }
    let first = window[0];
    let last = window[window.len() - 1];
    let total_change = if first == 0.0 {
        0.0
    } else {
        (last - first) / first * 100.0
    };

    let returns: Vec<f64> = window
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();
    let (_, std) = mean_and_pop_std(&returns);
    let volatility = std * 100.0;

    if total_change.abs() > 2.0 * volatility {
        total_change.signum()
    } else {
        0.0
    }
}
