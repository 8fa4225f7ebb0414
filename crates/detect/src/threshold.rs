//! Anomaly-error threshold calibration.
//!
//! Two estimators run over the trained model's reconstruction errors on
//! its own training set and the smaller wins. The moment-based estimator
//! (`mean + sigma·std`) under-triggers during low-volatility calibration
//! windows; the percentile estimator over-triggers on heavy-tailed small
//! samples. Taking the minimum biases toward higher sensitivity: more
//! true anomalies caught at the cost of more false positives.

use vigil_model::{AnomalyModel, ModelError};

/// Threshold estimator configuration.
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Sigma multiplier for the moment-based estimator.
    pub sigma_multiplier: f64,
    /// Percentile in (0, 1] for the percentile estimator.
    pub percentile: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sigma_multiplier: 1.5,
            percentile: 0.95,
        }
    }
}

/// Derive a threshold from a raw error sample.
///
/// Statistical threshold = sample mean + `sigma_multiplier` · population
/// standard deviation. Percentile threshold = the sorted error at index
/// `floor(percentile · n)` — for small samples this degenerates toward
/// the maximum, which is acceptable. The final threshold is the minimum
/// of the two.
pub fn threshold_from_errors(errors: &[f64], cfg: &ThresholdConfig) -> Result<f64, ModelError> {
    if errors.is_empty() {
        return Err(ModelError::EmptyMatrix);
    }
    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
    let statistical = mean + cfg.sigma_multiplier * variance.sqrt();

    let mut sorted = errors.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((cfg.percentile * n).floor() as usize).min(errors.len() - 1);
    let percentile = sorted[idx];

    Ok(statistical.min(percentile))
}

/// Calibrate a trained model against its own training matrix.
///
/// Computes per-row reconstruction MSE via the model, derives the
/// threshold, stores it on the model, and returns it.
pub fn calibrate(
    model: &mut AnomalyModel,
    train_rows: &[Vec<f64>],
    cfg: &ThresholdConfig,
) -> Result<f64, ModelError> {
    let errors = model.reconstruction_errors(train_rows)?;
    let threshold = threshold_from_errors(&errors, cfg)?;
    model.set_threshold(threshold);
    tracing::info!(
        threshold,
        samples = train_rows.len(),
        "calibrated anomaly threshold"
    );
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_errors_rejected() {
        let err = threshold_from_errors(&[], &ThresholdConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::EmptyMatrix));
    }

    #[test]
    fn test_single_error_degenerates_to_it() {
        // mean + 1.5·0 and the 95th percentile both collapse to the value.
        let t = threshold_from_errors(&[0.25], &ThresholdConfig::default()).unwrap();
        assert!((t - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_estimator_wins_on_bimodal_sample() {
        // Half zeros, half tens: statistical = 5 + 1.5·5 = 12.5, while the
        // 95th-percentile value is 10. The minimum keeps the sensitive one.
        let mut errors = vec![0.0; 10];
        errors.extend(vec![10.0; 10]);
        let t = threshold_from_errors(&errors, &ThresholdConfig::default()).unwrap();
        assert!((t - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_statistical_estimator_wins_on_heavy_tail() {
        // One huge outlier: the 95th percentile lands on it, but the
        // moment-based estimate stays below.
        let mut errors = vec![1.0; 19];
        errors.push(100.0);
        let t = threshold_from_errors(&errors, &ThresholdConfig::default()).unwrap();
        assert!(t < 100.0);
    }

    #[test]
    fn test_threshold_is_monotonic_in_scale() {
        let errors: Vec<f64> = (1..=50).map(|i| i as f64 * 0.01).collect();
        let cfg = ThresholdConfig::default();
        let base = threshold_from_errors(&errors, &cfg).unwrap();
        for c in [0.5, 2.0, 17.0] {
            let scaled: Vec<f64> = errors.iter().map(|e| e * c).collect();
            let t = threshold_from_errors(&scaled, &cfg).unwrap();
            assert!(
                (t - base * c).abs() < 1e-9 * c,
                "scaling by {c}: expected {}, got {t}",
                base * c
            );
        }
    }

    #[test]
    fn test_small_sample_percentile_degenerates_to_max() {
        // n=3: floor(0.95·3) = 2, the maximum.
        let errors = vec![0.1, 0.2, 0.3];
        let cfg = ThresholdConfig {
            sigma_multiplier: 1000.0, // force the percentile branch to win
            percentile: 0.95,
        };
        let t = threshold_from_errors(&errors, &cfg).unwrap();
        assert!((t - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_index_clamped_for_full_percentile() {
        // percentile = 1.0 → floor(n) would be out of bounds without the clamp.
        let errors = vec![0.1, 0.2, 0.3, 0.4];
        let cfg = ThresholdConfig {
            sigma_multiplier: 1000.0,
            percentile: 1.0,
        };
        let t = threshold_from_errors(&errors, &cfg).unwrap();
        assert!((t - 0.4).abs() < 1e-12);
    }
}
