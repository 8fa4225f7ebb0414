//! OHLCV candle type.
//!
//! A [`Candle`] is one open/high/low/close/volume observation for a fixed
//! time bucket. Candle sequences are the sole input to the feature
//! pipeline; retrieval from a market-data endpoint is a collaborator
//! concern and out of scope here.

use serde::{Deserialize, Serialize};

/// One OHLCV observation for a fixed time bucket.
///
/// Immutable once produced by the data source. Sequences handed to the
/// feature pipeline must be strictly ordered by timestamp with no
/// duplicates — see [`validate_series`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time in milliseconds since epoch.
    pub timestamp: i64,
    /// Open price.
    pub open: f64,
    /// Highest traded price in the bucket.
    pub high: f64,
    /// Lowest traded price in the bucket.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded base-asset volume.
    pub volume: f64,
    /// Number of trades in the bucket.
    pub trade_count: u64,
}

/// Candle sequence validation errors.
#[derive(Debug, thiserror::Error)]
pub enum CandleError {
    /// Timestamps are not strictly increasing.
    #[error("candle at index {index} has timestamp {timestamp} <= previous {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: i64,
        previous: i64,
    },
    /// A price or volume field is NaN or infinite.
    #[error("candle at index {index} contains a non-finite field")]
    NonFinite { index: usize },
}

/// Check that a candle sequence is strictly timestamp-ordered and that all
/// numeric fields are finite.
///
/// The feature pipeline assumes both properties; callers assembling candles
/// from external sources should validate once at the boundary.
pub fn validate_series(candles: &[Candle]) -> Result<(), CandleError> {
    for (i, c) in candles.iter().enumerate() {
        let fields = [c.open, c.high, c.low, c.close, c.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(CandleError::NonFinite { index: i });
        }
        if i > 0 {
            let prev = candles[i - 1].timestamp;
            if c.timestamp <= prev {
                return Err(CandleError::OutOfOrder {
                    index: i,
                    timestamp: c.timestamp,
                    previous: prev,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            trade_count: 10,
        }
    }

    #[test]
    fn test_ordered_series_passes() {
        let series = vec![candle(1000, 50.0), candle(2000, 51.0), candle(3000, 49.0)];
        assert!(validate_series(&series).is_ok());
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let series = vec![candle(1000, 50.0), candle(1000, 51.0)];
        let err = validate_series(&series).unwrap_err();
        assert!(matches!(err, CandleError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut series = vec![candle(1000, 50.0), candle(2000, 51.0)];
        series[1].volume = f64::NAN;
        let err = validate_series(&series).unwrap_err();
        assert!(matches!(err, CandleError::NonFinite { index: 1 }));
    }

    #[test]
    fn test_serde_round_trip() {
        let c = candle(1706000000000, 42000.0);
        let json = serde_json::to_string(&c).unwrap();
        let back: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
