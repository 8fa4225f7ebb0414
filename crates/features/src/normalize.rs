//! Min/max normalization fitted once over a training feature matrix.
//!
//! Stats are fitted on the training set and saved to a JSON sidecar file
//! alongside the model bundle. Inference **must** reuse the same fitted
//! stats — re-fitting would make inference-time values incomparable to
//! training-time values.

use crate::vector::{FeatureArray, FeatureVector};
use crate::FeatureError;

/// Per-feature min/max fitted over a fixed feature-vector dataset.
///
/// Invariant: `max[i] >= min[i]` for every feature. A degenerate range
/// (`max == min`) normalizes every input to 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MinMaxStats {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl MinMaxStats {
    /// Fit per-feature min and max across the whole dataset.
    pub fn fit(rows: &[FeatureArray]) -> Result<Self, FeatureError> {
        if rows.is_empty() {
            return Err(FeatureError::EmptyMatrix);
        }
        let mut min = [f64::INFINITY; FeatureVector::NUM_FEATURES];
        let mut max = [f64::NEG_INFINITY; FeatureVector::NUM_FEATURES];
        for row in rows {
            for i in 0..FeatureVector::NUM_FEATURES {
                min[i] = min[i].min(row[i]);
                max[i] = max[i].max(row[i]);
            }
        }
        Ok(Self {
            min: min.to_vec(),
            max: max.to_vec(),
        })
    }

    /// Map a raw feature vector into [0, 1] per feature.
    ///
    /// Degenerate ranges map to 0 for any input.
    pub fn transform(&self, raw: &FeatureArray) -> FeatureArray {
        let mut out = [0.0; FeatureVector::NUM_FEATURES];
        for i in 0..FeatureVector::NUM_FEATURES {
            let range = self.max[i] - self.min[i];
            if range > 0.0 {
                out[i] = (raw[i] - self.min[i]) / range;
            }
        }
        out
    }

    /// Exact algebraic inverse of [`transform`](Self::transform) where
    /// `max > min`; degenerate features invert to their fitted min.
    ///
    /// Diagnostics only — the runtime pipeline never denormalizes.
    pub fn inverse(&self, norm: &FeatureArray) -> FeatureArray {
        let mut out = [0.0; FeatureVector::NUM_FEATURES];
        for i in 0..FeatureVector::NUM_FEATURES {
            out[i] = norm[i] * (self.max[i] - self.min[i]) + self.min[i];
        }
        out
    }

    /// Transform a whole matrix into the row form the model consumes.
    pub fn transform_matrix(&self, rows: &[FeatureArray]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| self.transform(row).to_vec())
            .collect()
    }

    /// Load normalization stats from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let stats: MinMaxStats = serde_json::from_str(&data)?;
        anyhow::ensure!(
            stats.min.len() == FeatureVector::NUM_FEATURES,
            "norm stats min has {} elements, expected {}",
            stats.min.len(),
            FeatureVector::NUM_FEATURES
        );
        anyhow::ensure!(
            stats.max.len() == FeatureVector::NUM_FEATURES,
            "norm stats max has {} elements, expected {}",
            stats.max.len(),
            FeatureVector::NUM_FEATURES
        );
        Ok(stats)
    }

    /// Save normalization stats to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}
