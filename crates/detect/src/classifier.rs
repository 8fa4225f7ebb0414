//! Severity classification with per-feature attribution.
//!
//! Scores a normalized matrix against a trained, calibrated model: each
//! row gets a reconstruction error, a severity tier, the absolute
//! per-feature reconstruction gap (in feature order — ranking or
//! truncation is a presentation concern), and a heuristic "major event"
//! flag for contribution patterns matching known crash/spike signatures.

use serde::{Deserialize, Serialize};

use vigil_features::FeatureVector;
use vigil_model::{row_mse, AnomalyModel, ModelError};

/// Severity tier of a scored row relative to the calibrated threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

/// Severity tier multipliers applied to the calibrated threshold.
#[derive(Debug, Clone)]
pub struct SeverityConfig {
    pub warning_multiplier: f64,
    pub critical_multiplier: f64,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            warning_multiplier: 1.0,
            critical_multiplier: 1.2,
        }
    }
}

/// Absolute reconstruction gap for one named feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub contribution: f64,
}

/// One scored row. Immutable after creation; consumed by presentation
/// layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Row index in the scored matrix.
    pub index: usize,
    /// Mean squared reconstruction error of the row.
    pub reconstruction_error: f64,
    pub severity: Severity,
    /// Per-feature contributions in feature order, never sorted here.
    pub contributions: Vec<FeatureContribution>,
    /// Heuristic crash/spike signature flag.
    pub is_major_event: bool,
    /// Opaque caller-supplied payload, passed through untouched.
    pub metadata: Option<serde_json::Value>,
}

/// Severity tallies across a scored matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Normal => self.normal += 1,
            Severity::Warning => self.warning += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}

/// Full classification output for one matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    /// All scored rows, sorted by descending error (ties: ascending index).
    pub anomalies: Vec<AnomalyRecord>,
    pub severity_counts: SeverityCounts,
    /// The threshold the severities were derived from.
    pub threshold: f64,
    pub total_samples: usize,
    /// `(warning + critical) / total`.
    pub anomaly_rate: f64,
}

/// Classify one reconstruction error against the scaled threshold.
///
/// Boundaries are inclusive: an error exactly at the warning threshold is
/// `Warning`, exactly at the critical threshold is `Critical`.
pub fn classify_severity(error: f64, threshold: f64, cfg: &SeverityConfig) -> Severity {
    if error >= threshold * cfg.critical_multiplier {
        Severity::Critical
    } else if error >= threshold * cfg.warning_multiplier {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

/// Score a normalized matrix against a trained, calibrated model.
///
/// `metadata`, when provided, is matched to rows by index and passed
/// through opaquely. Fails with a state error if the model is untrained
/// or has no calibrated threshold.
pub fn score(
    model: &AnomalyModel,
    rows: &[Vec<f64>],
    cfg: &SeverityConfig,
    metadata: Option<&[serde_json::Value]>,
) -> Result<ScoreReport, ModelError> {
    let threshold = model.require_threshold()?;
    let reconstructed = model.predict(rows)?;

    let mut records = Vec::with_capacity(rows.len());
    let mut severity_counts = SeverityCounts::default();

    for (index, (original, recon)) in rows.iter().zip(reconstructed.iter()).enumerate() {
        let error = row_mse(original, recon);
        let severity = classify_severity(error, threshold, cfg);
        severity_counts.add(severity);

        let contributions: Vec<FeatureContribution> = original
            .iter()
            .zip(recon.iter())
            .enumerate()
            .map(|(i, (o, r))| FeatureContribution {
                feature: feature_name(i),
                contribution: (o - r).abs(),
            })
            .collect();

        records.push(AnomalyRecord {
            index,
            reconstruction_error: error,
            severity,
            is_major_event: is_major_event(error, threshold, &contributions),
            contributions,
            metadata: metadata.and_then(|m| m.get(index).cloned()),
        });
    }

    sort_by_error_desc(&mut records);

    let total_samples = rows.len();
    let flagged = severity_counts.warning + severity_counts.critical;
    Ok(ScoreReport {
        anomalies: records,
        severity_counts,
        threshold,
        total_samples,
        anomaly_rate: flagged as f64 / total_samples as f64,
    })
}

/// Canonical feature name for a column index.
fn feature_name(index: usize) -> String {
    FeatureVector::FEATURE_NAMES
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("feature_{index}"))
}

fn contribution_of(contributions: &[FeatureContribution], name: &str) -> f64 {
    contributions
        .iter()
        .find(|c| c.feature == name)
        .map(|c| c.contribution)
        .unwrap_or(0.0)
}

/// Crash/spike signature heuristic.
///
/// Requires the error to exceed twice the threshold, plus one of: at
/// least three strong contributions, a price-change + volume-spike pair,
/// or a price-acceleration + volume pair.
fn is_major_event(error: f64, threshold: f64, contributions: &[FeatureContribution]) -> bool {
    if error <= 2.0 * threshold {
        return false;
    }
    let strong = contributions
        .iter()
        .filter(|c| c.contribution > 0.3)
        .count();
    if strong >= 3 {
        return true;
    }
    if contribution_of(contributions, "price_change") > 0.4
        && contribution_of(contributions, "volume_spike") > 0.2
    {
        return true;
    }
    contribution_of(contributions, "price_acceleration") > 0.3
        && contribution_of(contributions, "volume") > 0.2
}

/// Descending error, ascending original index on ties.
fn sort_by_error_desc(records: &mut [AnomalyRecord]) {
    records.sort_by(|a, b| {
        b.reconstruction_error
            .partial_cmp(&a.reconstruction_error)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.index.cmp(&b.index))
    });
}
