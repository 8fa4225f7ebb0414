//! Ensemble training and majority-vote scoring.
//!
//! A fixed collection of independently configured autoencoders trains
//! strictly one after another on the same matrices (no shared mutable
//! state), then votes per row on severity. Per-feature contributions, the
//! major-event flag, and the reported threshold come from the first
//! member only — a documented limitation, not an aggregate.

use serde::{Deserialize, Serialize};

use vigil_model::{AnomalyModel, EpochStats, ModelParams, TrainOptions};

use crate::classifier::{
    self, FeatureContribution, Severity, SeverityConfig, SeverityCounts,
};
use crate::threshold::{self, ThresholdConfig};
use crate::DetectError;

/// Per-row vote tally across ensemble members.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleVote {
    pub normal_votes: usize,
    pub warning_votes: usize,
    pub critical_votes: usize,
    /// Share of members agreeing with the plurality tier.
    pub confidence: f64,
    /// Mean of member reconstruction errors at this row.
    pub averaged_error: f64,
}

/// One ensemble-scored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleRecord {
    pub index: usize,
    /// Majority-vote severity.
    pub severity: Severity,
    pub vote: EnsembleVote,
    /// First member's contributions, in feature order.
    pub contributions: Vec<FeatureContribution>,
    /// First member's major-event flag.
    pub is_major_event: bool,
    pub metadata: Option<serde_json::Value>,
}

/// Full ensemble classification output for one matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleReport {
    /// All scored rows, sorted by descending averaged error.
    pub anomalies: Vec<EnsembleRecord>,
    pub severity_counts: SeverityCounts,
    /// First member's calibrated threshold.
    pub threshold: f64,
    pub total_samples: usize,
    pub anomaly_rate: f64,
}

/// The default three-member roster derived from a base configuration:
/// the baseline, a higher-dropout / lower-learning-rate member, and a
/// wider member with latent size 3. Seeds are offset so the members
/// start from independent parameters.
pub fn default_member_params(base: &ModelParams) -> Vec<ModelParams> {
    let regularized = ModelParams {
        dropout_rate: 0.3,
        learning_rate: 0.0005,
        seed: base.seed.wrapping_add(1),
        ..base.clone()
    };
    let wide = ModelParams {
        encoder_units: vec![24, 12, 6],
        latent_size: 3,
        decoder_units: vec![6, 12, 24],
        seed: base.seed.wrapping_add(2),
        ..base.clone()
    };
    vec![base.clone(), regularized, wide]
}

/// A fixed-size collection of independently configured models.
pub struct Ensemble {
    members: Vec<AnomalyModel>,
}

impl std::fmt::Debug for Ensemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ensemble")
            .field("members", &self.members)
            .finish()
    }
}

impl Ensemble {
    /// Build one model per member configuration.
    pub fn new(member_params: Vec<ModelParams>) -> Result<Self, DetectError> {
        if member_params.is_empty() {
            return Err(DetectError::EmptyEnsemble);
        }
        let members = member_params
            .into_iter()
            .map(AnomalyModel::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { members })
    }

    /// Build the default three-member ensemble from a base configuration.
    pub fn with_default_members(base: &ModelParams) -> Result<Self, DetectError> {
        Self::new(default_member_params(base))
    }

    pub fn members(&self) -> &[AnomalyModel] {
        &self.members
    }

    /// Train each member sequentially on the same matrices.
    ///
    /// Every member runs under the same options with its own early
    /// stopping, so each member's epoch count is capped independently.
    pub fn train(
        &mut self,
        train_rows: &[Vec<f64>],
        val_rows: &[Vec<f64>],
        opts: &TrainOptions,
    ) -> Result<Vec<Vec<EpochStats>>, DetectError> {
        let mut histories = Vec::with_capacity(self.members.len());
        for (i, member) in self.members.iter_mut().enumerate() {
            tracing::info!(member = i, "training ensemble member");
            histories.push(member.train(train_rows, val_rows, opts)?);
        }
        Ok(histories)
    }

    /// Calibrate every member against the training matrix.
    ///
    /// Returns the per-member thresholds in roster order.
    pub fn calibrate(
        &mut self,
        train_rows: &[Vec<f64>],
        cfg: &ThresholdConfig,
    ) -> Result<Vec<f64>, DetectError> {
        let mut thresholds = Vec::with_capacity(self.members.len());
        for member in &mut self.members {
            thresholds.push(threshold::calibrate(member, train_rows, cfg)?);
        }
        Ok(thresholds)
    }

    /// Score a matrix with every member and combine severities by
    /// majority vote.
    pub fn score(
        &self,
        rows: &[Vec<f64>],
        cfg: &SeverityConfig,
        metadata: Option<&[serde_json::Value]>,
    ) -> Result<EnsembleReport, DetectError> {
        let reports = self
            .members
            .iter()
            .map(|member| classifier::score(member, rows, cfg, metadata))
            .collect::<Result<Vec<_>, _>>()?;

        // Member reports arrive error-sorted; rebuild per-index views.
        let n_rows = rows.len();
        let by_index: Vec<Vec<&crate::classifier::AnomalyRecord>> = reports
            .iter()
            .map(|report| {
                let mut slots = vec![None; n_rows];
                for record in &report.anomalies {
                    slots[record.index] = Some(record);
                }
                slots.into_iter().map(|r| r.expect("record per row")).collect()
            })
            .collect();

        let mut records = Vec::with_capacity(n_rows);
        let mut severity_counts = SeverityCounts::default();

        for index in 0..n_rows {
            let member_severities: Vec<Severity> =
                by_index.iter().map(|m| m[index].severity).collect();
            let (severity, mut vote) = combine_votes(&member_severities);
            vote.averaged_error = by_index
                .iter()
                .map(|m| m[index].reconstruction_error)
                .sum::<f64>()
                / self.members.len() as f64;
            severity_counts.add(severity);

            let first = by_index[0][index];
            records.push(EnsembleRecord {
                index,
                severity,
                vote,
                contributions: first.contributions.clone(),
                is_major_event: first.is_major_event,
                metadata: first.metadata.clone(),
            });
        }

        records.sort_by(|a, b| {
            b.vote
                .averaged_error
                .partial_cmp(&a.vote.averaged_error)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.index.cmp(&b.index))
        });

        let flagged = severity_counts.warning + severity_counts.critical;
        Ok(EnsembleReport {
            anomalies: records,
            severity_counts,
            threshold: reports[0].threshold,
            total_samples: n_rows,
            anomaly_rate: flagged as f64 / n_rows as f64,
        })
    }
}

/// Majority-vote combination of member severities.
///
/// `critical` needs critical votes ≥ ceil(n/2); otherwise `warning` needs
/// warning votes ≥ ceil(n/2), or warning+critical votes ≥ ceil(n/2)
/// combined; otherwise `normal`. The returned vote's `averaged_error` is
/// left at 0 for the caller to fill.
pub fn combine_votes(member_severities: &[Severity]) -> (Severity, EnsembleVote) {
    let n = member_severities.len();
    let mut normal_votes = 0;
    let mut warning_votes = 0;
    let mut critical_votes = 0;
    for severity in member_severities {
        match severity {
            Severity::Normal => normal_votes += 1,
            Severity::Warning => warning_votes += 1,
            Severity::Critical => critical_votes += 1,
        }
    }

    let majority = n.div_ceil(2);
    let severity = if n == 0 {
        Severity::Normal
    } else if critical_votes >= majority {
        Severity::Critical
    } else if warning_votes >= majority || warning_votes + critical_votes >= majority {
        Severity::Warning
    } else {
        Severity::Normal
    };

    let confidence = if n == 0 {
        0.0
    } else {
        normal_votes.max(warning_votes).max(critical_votes) as f64 / n as f64
    };

    (
        severity,
        EnsembleVote {
            normal_votes,
            warning_votes,
            critical_votes,
            confidence,
            averaged_error: 0.0,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Severity::{Critical, Normal, Warning};

    fn combined(votes: &[Severity]) -> Severity {
        combine_votes(votes).0
    }

    #[test]
    fn test_majority_n3() {
        assert_eq!(combined(&[Critical, Critical, Normal]), Critical);
        // One warning vote is below ceil(3/2) = 2, and warning+critical is
        // also 1: normal wins.
        assert_eq!(combined(&[Warning, Normal, Normal]), Normal);
        assert_eq!(combined(&[Warning, Warning, Normal]), Warning);
        // Mixed elevated votes combine toward warning.
        assert_eq!(combined(&[Warning, Critical, Normal]), Warning);
        assert_eq!(combined(&[Normal, Normal, Normal]), Normal);
    }

    #[test]
    fn test_majority_n4() {
        // ceil(4/2) = 2.
        assert_eq!(combined(&[Critical, Critical, Normal, Normal]), Critical);
        assert_eq!(combined(&[Critical, Warning, Normal, Normal]), Warning);
        assert_eq!(combined(&[Warning, Warning, Normal, Normal]), Warning);
        assert_eq!(combined(&[Warning, Normal, Normal, Normal]), Normal);
    }

    #[test]
    fn test_majority_n5() {
        // ceil(5/2) = 3.
        assert_eq!(
            combined(&[Critical, Critical, Critical, Normal, Normal]),
            Critical
        );
        // Two criticals miss the bar alone but carry the combined count.
        assert_eq!(
            combined(&[Critical, Critical, Warning, Normal, Normal]),
            Warning
        );
        assert_eq!(
            combined(&[Warning, Critical, Normal, Normal, Normal]),
            Normal
        );
    }

    #[test]
    fn test_confidence_is_plurality_share() {
        let (_, vote) = combine_votes(&[Critical, Critical, Normal]);
        assert_eq!(vote.critical_votes, 2);
        assert_eq!(vote.normal_votes, 1);
        assert!((vote.confidence - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_roster_variants() {
        let base = ModelParams::default();
        let roster = default_member_params(&base);
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0], base);
        assert_eq!(roster[1].dropout_rate, 0.3);
        assert_eq!(roster[1].learning_rate, 0.0005);
        assert_eq!(roster[2].latent_size, 3);
        assert_eq!(roster[2].encoder_units, vec![24, 12, 6]);
        // Members must start from independent parameters.
        assert_ne!(roster[1].seed, roster[0].seed);
        assert_ne!(roster[2].seed, roster[0].seed);
    }

    #[test]
    fn test_empty_roster_rejected() {
        assert!(matches!(
            Ensemble::new(Vec::new()).unwrap_err(),
            DetectError::EmptyEnsemble
        ));
    }
}
