//! Model error taxonomy.

/// Errors surfaced by model construction, training, inference, and
/// persistence.
///
/// Input and state errors abort the triggering operation with no partial
/// state mutation; nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A row's width does not match the model's configured input width.
    #[error("input row {row} has width {got}, model expects {expected}")]
    InvalidInputShape {
        row: usize,
        expected: usize,
        got: usize,
    },
    /// An empty matrix was passed where at least one row is required.
    #[error("matrix is empty")]
    EmptyMatrix,
    /// Inference was requested before training.
    #[error("model has not been trained")]
    NotTrained,
    /// Classification was requested before threshold calibration.
    #[error("model has no calibrated threshold")]
    NotCalibrated,
    /// A persisted bundle does not match the architecture it declares.
    #[error("model bundle does not match architecture: {0}")]
    BundleMismatch(String),
    /// Tensor backend failure.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}
