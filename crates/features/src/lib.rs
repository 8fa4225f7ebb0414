//! # vigil-features
//!
//! Turns ordered OHLCV candle sequences into fixed-width numeric feature
//! vectors and normalizes them into the [0, 1] range the autoencoder
//! consumes.
//!
//! The pipeline is a pair of pure transformations:
//! `&[Candle]` → [`build_features`] → `Vec<FeatureVector>` →
//! [`MinMaxStats::fit`] + [`MinMaxStats::transform_matrix`] → normalized
//! matrix. No state is retained between calls beyond the fitted
//! [`MinMaxStats`], which must be treated as read-only after fitting so
//! inference-time values stay comparable to training-time values.

pub mod engineer;
pub mod normalize;
pub mod vector;

pub use engineer::build_features;
pub use normalize::MinMaxStats;
pub use vector::{feature_matrix, FeatureArray, FeatureVector};

/// Feature pipeline input errors.
///
/// These abort the triggering operation immediately; no partial output is
/// produced. Numeric edge cases (zero denominators, degenerate ranges) are
/// *not* errors — they resolve to documented defaults locally.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// An empty candle sequence was passed to feature derivation.
    #[error("candle sequence is empty")]
    EmptyCandles,
    /// An empty feature matrix was passed to normalization fitting.
    #[error("feature matrix is empty")]
    EmptyMatrix,
}
