//! # vigil-detect
//!
//! The scoring half of the Vigil pipeline: calibrates an anomaly-error
//! threshold from a trained model's behavior on its own training set,
//! classifies new feature vectors into severity tiers with per-feature
//! attribution, and combines several independently configured models by
//! majority vote.
//!
//! Data flow: normalized matrix → [`threshold::calibrate`] →
//! [`classifier::score`] (single model) or [`ensemble::Ensemble::score`]
//! (majority vote) → ranked anomaly records.

pub mod classifier;
pub mod ensemble;
pub mod threshold;

pub use classifier::{
    AnomalyRecord, FeatureContribution, ScoreReport, Severity, SeverityConfig, SeverityCounts,
};
pub use ensemble::{Ensemble, EnsembleRecord, EnsembleReport, EnsembleVote};
pub use threshold::ThresholdConfig;

use vigil_model::ModelError;

/// Errors surfaced by the detection layer.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// An ensemble was constructed with no members.
    #[error("ensemble requires at least one member")]
    EmptyEnsemble,
    /// Underlying model failure (input, state, or backend).
    #[error(transparent)]
    Model(#[from] ModelError),
}
