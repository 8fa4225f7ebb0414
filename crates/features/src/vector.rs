//! Feature vector for candle anomaly detection.
//!
//! Twelve inputs summarizing one candle plus bounded history. All values
//! are raw (un-normalized); [`MinMaxStats`](crate::normalize::MinMaxStats)
//! maps them into [0, 1] before they reach the autoencoder.

use serde::{Deserialize, Serialize};

/// Fixed-width array of the encoded features, in canonical order.
pub type FeatureArray = [f64; FeatureVector::NUM_FEATURES];

/// Numeric summary of one candle plus up to 24 candles of history.
///
/// The twelve canonical fields are encoded into the model input via
/// [`to_array`](Self::to_array). `volume_change` and `volatility` are
/// derived alongside them — they feed `volume_spike` and
/// `funding_rate_proxy` — but are carried only as diagnostics and are not
/// part of the encoded vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Close-to-close percent change vs the previous candle.
    pub price_change: f64,
    /// Raw traded volume of the candle.
    pub volume: f64,
    /// Funding-rate proxy blended from tanh-squashed change signals.
    pub funding_rate_proxy: f64,
    /// Open-interest proxy blended from log-volume, trade count, and
    /// absolute price change.
    pub open_interest_proxy: f64,
    /// Change in `price_change` vs the previous candle.
    pub price_acceleration: f64,
    /// Volume change above the 30% surge threshold, floored at 0.
    pub volume_spike: f64,
    /// Absolute percent gap between this open and the previous close.
    pub price_gap: f64,
    /// 3-period close momentum, percent.
    pub price_momentum: f64,
    /// 3-period volume momentum, percent.
    pub volume_momentum: f64,
    /// 14-period Relative Strength Index, in [0, 100].
    pub rsi: f64,
    /// Position within the 20-period Bollinger band, in [-1, 1].
    pub bollinger_position: f64,
    /// 24-period trend regime: -1, 0, or 1.
    pub market_regime: f64,

    // ── Diagnostics (not encoded) ──────────────────────────────────────
    /// Volume percent change vs the previous candle.
    pub volume_change: f64,
    /// Candle range as a percent of the close.
    pub volatility: f64,
}

impl FeatureVector {
    /// Number of encoded features.
    pub const NUM_FEATURES: usize = 12;

    /// Canonical names of the encoded features, index-aligned with
    /// [`to_array`](Self::to_array).
    pub const FEATURE_NAMES: [&'static str; Self::NUM_FEATURES] = [
        "price_change",
        "volume",
        "funding_rate_proxy",
        "open_interest_proxy",
        "price_acceleration",
        "volume_spike",
        "price_gap",
        "price_momentum",
        "volume_momentum",
        "rsi",
        "bollinger_position",
        "market_regime",
    ];

    /// Convert to a fixed-size array in canonical feature order.
    pub fn to_array(&self) -> FeatureArray {
        [
            self.price_change,
            self.volume,
            self.funding_rate_proxy,
            self.open_interest_proxy,
            self.price_acceleration,
            self.volume_spike,
            self.price_gap,
            self.price_momentum,
            self.volume_momentum,
            self.rsi,
            self.bollinger_position,
            self.market_regime,
        ]
    }
}

/// Convert a feature-vector sequence into the raw matrix form consumed by
/// normalization and the model.
pub fn feature_matrix(vectors: &[FeatureVector]) -> Vec<FeatureArray> {
    vectors.iter().map(FeatureVector::to_array).collect()
}
