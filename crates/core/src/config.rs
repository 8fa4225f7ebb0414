//! Layered configuration for the Vigil anomaly detection platform.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults (the documented model and threshold defaults)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `VIGIL_`, nested with `__`)
//!
//! All values an integrator may tune live here: training schedule, network
//! architecture, threshold calibration, severity multipliers, and the
//! ensemble switch.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

// ── Default value functions ────────────────────────────────────────────

/// Default training epochs: 30.
fn default_epochs() -> usize {
    30
}

/// Default mini-batch size: 64 rows.
fn default_batch_size() -> usize {
    64
}

/// Default early-stopping patience: 5 epochs.
fn default_patience() -> usize {
    5
}

/// Default learning rate: 1e-3.
fn default_learning_rate() -> f64 {
    0.001
}

/// Default dropout rate: 0.2.
fn default_dropout_rate() -> f64 {
    0.2
}

/// Default encoder layer widths.
fn default_encoder_units() -> Vec<usize> {
    vec![16, 8, 4]
}

/// Default decoder layer widths (mirror of the encoder).
fn default_decoder_units() -> Vec<usize> {
    vec![4, 8, 16]
}

/// Default latent bottleneck width: 2.
fn default_latent_size() -> usize {
    2
}

/// Default parameter initialization seed.
fn default_seed() -> u64 {
    42
}

/// Default statistical-threshold sigma multiplier: 1.5.
fn default_sigma_multiplier() -> f64 {
    1.5
}

/// Default error percentile for the percentile threshold: 0.95.
fn default_percentile() -> f64 {
    0.95
}

/// Default warning severity multiplier: 1.0 (the calibrated threshold).
fn default_warning_multiplier() -> f64 {
    1.0
}

/// Default critical severity multiplier: 1.2.
fn default_critical_multiplier() -> f64 {
    1.2
}

/// Default train/validation split ratio: 0.8.
fn default_train_ratio() -> f64 {
    0.8
}

// ── Configuration structs ──────────────────────────────────────────────

/// Top-level application configuration.
///
/// Aggregates the network architecture, training schedule, threshold
/// calibration, severity tiers, and ensemble settings into a single
/// loadable unit.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Autoencoder architecture and optimizer settings.
    pub model: ModelConfig,
    /// Training schedule.
    pub training: TrainingConfig,
    /// Anomaly threshold calibration.
    pub threshold: ThresholdConfig,
    /// Severity tier multipliers.
    pub severity: SeverityConfig,
    /// Ensemble settings.
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    /// Dataset handling.
    pub data: DataConfig,
}

/// Autoencoder architecture and optimizer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Encoder dense layer widths, outermost first.
    #[serde(default = "default_encoder_units")]
    pub encoder_units: Vec<usize>,
    /// Latent bottleneck width.
    #[serde(default = "default_latent_size")]
    pub latent_size: usize,
    /// Decoder dense layer widths, innermost first.
    #[serde(default = "default_decoder_units")]
    pub decoder_units: Vec<usize>,
    /// Dropout rate for the two dropout sites, active during training only.
    #[serde(default = "default_dropout_rate")]
    pub dropout_rate: f64,
    /// Fixed optimizer learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Parameter initialization seed, for reproducible training runs.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Training schedule configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Maximum number of epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Mini-batch size in rows.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive non-improving epochs before early stopping.
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,
}

/// Threshold calibration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Sigma multiplier for the moment-based threshold estimator.
    #[serde(default = "default_sigma_multiplier")]
    pub sigma_multiplier: f64,
    /// Percentile (0, 1] for the percentile threshold estimator.
    #[serde(default = "default_percentile")]
    pub percentile: f64,
}

/// Severity tier configuration.
///
/// A row's reconstruction error is compared against the calibrated
/// threshold scaled by these multipliers.
#[derive(Debug, Clone, Deserialize)]
pub struct SeverityConfig {
    /// Warning tier multiplier.
    #[serde(default = "default_warning_multiplier")]
    pub warning_multiplier: f64,
    /// Critical tier multiplier.
    #[serde(default = "default_critical_multiplier")]
    pub critical_multiplier: f64,
}

/// Ensemble configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnsembleConfig {
    /// Score with the three-member ensemble instead of a single model.
    #[serde(default)]
    pub enabled: bool,
}

/// Dataset handling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Fraction of the feature matrix used for training; the remainder is
    /// the validation split.
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults (the documented model and threshold values).
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment variable overrides with prefix `VIGIL_` and `__` as
    ///    the nesting separator (e.g., `VIGIL_TRAINING__EPOCHS=50`).
    ///
    /// After loading, validates cross-field invariants.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            // Model
            .set_default("model.encoder_units", vec![16i64, 8, 4])?
            .set_default("model.latent_size", 2i64)?
            .set_default("model.decoder_units", vec![4i64, 8, 16])?
            .set_default("model.dropout_rate", 0.2)?
            .set_default("model.learning_rate", 0.001)?
            .set_default("model.seed", 42i64)?
            // Training
            .set_default("training.epochs", 30i64)?
            .set_default("training.batch_size", 64i64)?
            .set_default("training.early_stopping_patience", 5i64)?
            // Threshold
            .set_default("threshold.sigma_multiplier", 1.5)?
            .set_default("threshold.percentile", 0.95)?
            // Severity
            .set_default("severity.warning_multiplier", 1.0)?
            .set_default("severity.critical_multiplier", 1.2)?
            // Ensemble
            .set_default("ensemble.enabled", false)?
            // Data
            .set_default("data.train_ratio", 0.8)?;

        // ── Layer 2: TOML file ─────────────────────────────────────
        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (VIGIL_ prefix) ─────────────
        // The prefix separator must be set explicitly to `_` because the
        // `config` crate defaults it to the nesting separator when one is
        // provided. Without this, `VIGIL_TRAINING__EPOCHS` would be matched
        // against prefix `vigil__` instead of `vigil_`.
        builder = builder.add_source(
            Environment::with_prefix("VIGIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate configuration invariants.
    fn validate(&self) -> Result<()> {
        if self.model.encoder_units.is_empty() || self.model.decoder_units.is_empty() {
            bail!("encoder_units and decoder_units must be non-empty");
        }
        if self.model.latent_size == 0 {
            bail!("latent_size must be at least 1");
        }
        if !(0.0..1.0).contains(&self.model.dropout_rate) {
            bail!(
                "dropout_rate must be in [0, 1), got {}",
                self.model.dropout_rate
            );
        }
        if self.model.learning_rate <= 0.0 {
            bail!(
                "learning_rate must be positive, got {}",
                self.model.learning_rate
            );
        }
        if self.training.epochs == 0 || self.training.batch_size == 0 {
            bail!("epochs and batch_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.threshold.percentile) || self.threshold.percentile == 0.0 {
            bail!(
                "percentile must be in (0, 1], got {}",
                self.threshold.percentile
            );
        }
        if self.threshold.sigma_multiplier < 0.0 {
            bail!(
                "sigma_multiplier must be non-negative, got {}",
                self.threshold.sigma_multiplier
            );
        }
        if self.severity.critical_multiplier < self.severity.warning_multiplier {
            bail!(
                "critical_multiplier ({}) must be >= warning_multiplier ({})",
                self.severity.critical_multiplier,
                self.severity.warning_multiplier
            );
        }
        if !(0.0..1.0).contains(&self.data.train_ratio) || self.data.train_ratio == 0.0 {
            bail!(
                "train_ratio must be in (0, 1), got {}",
                self.data.train_ratio
            );
        }
        Ok(())
    }
}
