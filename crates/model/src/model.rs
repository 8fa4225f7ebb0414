//! Trained-model lifecycle: construction, training, inference.
//!
//! [`AnomalyModel`] owns the learned weights (a [`VarMap`]), its immutable
//! [`ModelParams`], and the calibrated anomaly threshold (absent until
//! calibration). Lifecycle: constructed untrained → trained (weights set)
//! → calibrated (threshold set). A model instance is single-writer:
//! training is synchronous and never runs concurrently on one instance.
//!
//! Parameter initialization is driven by a seeded generator so that two
//! models built from identical params are identical before training —
//! with dropout disabled, repeated training runs on the same data then
//! reproduce the same losses exactly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::{loss, optim, Optimizer, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::autoencoder::Autoencoder;
use crate::error::ModelError;
use crate::params::ModelParams;

/// Cooperative cancellation flag for training.
///
/// Checked only at epoch boundaries — a partial epoch always completes
/// before the loop stops. Clone freely; all clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next epoch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-epoch training progress event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Mean mini-batch reconstruction MSE over the epoch.
    pub train_loss: f64,
    /// Reconstruction MSE on the validation matrix (no dropout, no update).
    pub val_loss: f64,
}

/// Training schedule options.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Mini-batch size in rows (clamped to the training set size).
    pub batch_size: usize,
    /// Consecutive non-improving epochs before early stopping.
    pub patience: usize,
    /// Seed for the per-epoch mini-batch shuffle.
    pub shuffle_seed: u64,
    /// Cooperative stop flag, checked at epoch boundaries.
    pub cancel: CancelFlag,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 30,
            batch_size: 64,
            patience: 5,
            shuffle_seed: 42,
            cancel: CancelFlag::new(),
        }
    }
}

/// Mean squared difference between a row and its reconstruction.
pub fn row_mse(original: &[f64], reconstructed: &[f64]) -> f64 {
    if original.is_empty() {
        return 0.0;
    }
    original
        .iter()
        .zip(reconstructed.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / original.len() as f64
}

/// The autoencoder together with its weights, params, and threshold.
pub struct AnomalyModel {
    params: ModelParams,
    device: Device,
    varmap: VarMap,
    net: Autoencoder,
    threshold: Option<f64>,
    trained: bool,
}

impl std::fmt::Debug for AnomalyModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyModel")
            .field("params", &self.params)
            .field("threshold", &self.threshold)
            .field("trained", &self.trained)
            .finish_non_exhaustive()
    }
}

impl AnomalyModel {
    /// Build an untrained model with seed-deterministic initial parameters.
    pub fn new(params: ModelParams) -> Result<Self, ModelError> {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = Autoencoder::new(&params, vb)?;
        seed_parameters(&mut varmap, params.seed, &device)?;
        Ok(Self {
            params,
            device,
            varmap,
            net,
            threshold: None,
            trained: false,
        })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// The calibrated anomaly threshold, if calibration has run.
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Store the calibrated threshold.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = Some(threshold);
    }

    /// The threshold, or [`ModelError::NotCalibrated`].
    pub fn require_threshold(&self) -> Result<f64, ModelError> {
        self.threshold.ok_or(ModelError::NotCalibrated)
    }

    /// Train on shuffled mini-batches, minimizing reconstruction MSE.
    ///
    /// See [`train_with_progress`](Self::train_with_progress); this variant
    /// discards progress events.
    pub fn train(
        &mut self,
        train_rows: &[Vec<f64>],
        val_rows: &[Vec<f64>],
        opts: &TrainOptions,
    ) -> Result<Vec<EpochStats>, ModelError> {
        self.train_with_progress(train_rows, val_rows, opts, |_| {})
    }

    /// Train on shuffled mini-batches, minimizing reconstruction MSE, with
    /// a per-epoch progress callback.
    ///
    /// After each epoch the validation loss is computed (dropout off, no
    /// parameter update) and `on_epoch` is invoked — the epoch loop is
    /// strictly sequential, and this callback is the only point where a
    /// host may interleave other work. Early stopping halts once
    /// `opts.patience` consecutive epochs fail to improve on the best
    /// validation loss seen. `opts.cancel` stops the loop at the next
    /// epoch boundary.
    pub fn train_with_progress(
        &mut self,
        train_rows: &[Vec<f64>],
        val_rows: &[Vec<f64>],
        opts: &TrainOptions,
        mut on_epoch: impl FnMut(&EpochStats),
    ) -> Result<Vec<EpochStats>, ModelError> {
        self.check_rows(train_rows, self.params.input_width)?;
        self.check_rows(val_rows, self.params.input_width)?;

        let width = self.params.input_width;
        let n_train = train_rows.len();
        let batch_size = opts.batch_size.max(1).min(n_train);
        let val_x = self.to_tensor(val_rows, width)?;

        let mut optimizer = optim::AdamW::new(
            self.varmap.all_vars(),
            optim::ParamsAdamW {
                lr: self.params.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let mut history: Vec<EpochStats> = Vec::new();
        let mut best_val = f64::MAX;
        let mut patience_counter = 0usize;

        for epoch in 0..opts.epochs {
            // Reshuffle every epoch; the seed offset keeps runs reproducible.
            let indices = shuffle_indices(n_train, opts.shuffle_seed.wrapping_add(epoch as u64));

            let mut epoch_loss = 0.0;
            let mut n_batches = 0usize;
            for batch_start in (0..n_train).step_by(batch_size) {
                let batch_end = (batch_start + batch_size).min(n_train);
                let mut batch = Vec::with_capacity((batch_end - batch_start) * width);
                for &idx in &indices[batch_start..batch_end] {
                    batch.extend(train_rows[idx].iter().map(|&v| v as f32));
                }
                let x = Tensor::from_vec(batch, (batch_end - batch_start, width), &self.device)?;

                let recon = self.net.forward_t(&x, true)?;
                let mse = loss::mse(&recon, &x)?;
                optimizer.backward_step(&mse)?;

                epoch_loss += mse.to_vec0::<f32>()? as f64;
                n_batches += 1;
            }
            let train_loss = epoch_loss / n_batches as f64;

            let val_recon = self.net.forward_t(&val_x, false)?;
            let val_loss = loss::mse(&val_recon, &val_x)?.to_vec0::<f32>()? as f64;

            let stats = EpochStats {
                epoch,
                train_loss,
                val_loss,
            };
            tracing::debug!(epoch, train_loss, val_loss, "epoch complete");
            on_epoch(&stats);
            history.push(stats);

            if val_loss < best_val {
                best_val = val_loss;
                patience_counter = 0;
            } else {
                patience_counter += 1;
                if patience_counter >= opts.patience {
                    tracing::info!(
                        epoch,
                        patience = opts.patience,
                        best_val,
                        "early stopping: validation loss stopped improving"
                    );
                    break;
                }
            }

            if opts.cancel.is_cancelled() {
                tracing::info!(epoch, "training cancelled at epoch boundary");
                break;
            }
        }

        if !history.is_empty() {
            self.trained = true;
        }
        Ok(history)
    }

    /// Reconstruct a matrix (forward pass only, no dropout).
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.ensure_trained()?;
        let x = self.to_tensor(rows, self.params.input_width)?;
        let recon = self.net.forward_t(&x, false)?;
        Ok(tensor_to_rows(&recon)?)
    }

    /// Project a matrix into the latent space. Diagnostics path.
    pub fn encode(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.ensure_trained()?;
        let x = self.to_tensor(rows, self.params.input_width)?;
        let z = self.net.encode(&x)?;
        Ok(tensor_to_rows(&z)?)
    }

    /// Reconstruct from latent-space rows. Diagnostics path.
    pub fn decode(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.ensure_trained()?;
        let z = self.to_tensor(rows, self.params.latent_size)?;
        let recon = self.net.decode(&z)?;
        Ok(tensor_to_rows(&recon)?)
    }

    /// Per-row reconstruction MSE for a matrix.
    pub fn reconstruction_errors(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let recon = self.predict(rows)?;
        Ok(rows
            .iter()
            .zip(recon.iter())
            .map(|(orig, rec)| row_mse(orig, rec))
            .collect())
    }

    pub(crate) fn ensure_trained(&self) -> Result<(), ModelError> {
        if self.trained {
            Ok(())
        } else {
            Err(ModelError::NotTrained)
        }
    }

    pub(crate) fn mark_trained(&mut self) {
        self.trained = true;
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub(crate) fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn set_threshold_opt(&mut self, threshold: Option<f64>) {
        self.threshold = threshold;
    }

    fn check_rows(&self, rows: &[Vec<f64>], width: usize) -> Result<(), ModelError> {
        if rows.is_empty() {
            return Err(ModelError::EmptyMatrix);
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(ModelError::InvalidInputShape {
                    row: i,
                    expected: width,
                    got: row.len(),
                });
            }
        }
        Ok(())
    }

    fn to_tensor(&self, rows: &[Vec<f64>], width: usize) -> Result<Tensor, ModelError> {
        self.check_rows(rows, width)?;
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            flat.extend(row.iter().map(|&v| v as f32));
        }
        Ok(Tensor::from_vec(flat, (rows.len(), width), &self.device)?)
    }
}

fn tensor_to_rows(t: &Tensor) -> Result<Vec<Vec<f64>>, candle_core::Error> {
    let rows = t.to_vec2::<f32>()?;
    Ok(rows
        .into_iter()
        .map(|r| r.into_iter().map(|v| v as f64).collect())
        .collect())
}

/// Overwrite all network parameters with seed-deterministic values:
/// uniform Glorot-style weights, zero biases.
fn seed_parameters(varmap: &mut VarMap, seed: u64, device: &Device) -> Result<(), ModelError> {
    // Sorted traversal so the generator stream is independent of hash order.
    let mut entries: Vec<(String, Vec<usize>)> = varmap
        .data()
        .lock()
        .unwrap()
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().dims().to_vec()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut rng = Lcg(seed);
    for (name, dims) in entries {
        let count: usize = dims.iter().product();
        let values: Vec<f32> = if dims.len() == 2 {
            // Linear weight, shape (out, in).
            let limit = (6.0 / (dims[0] + dims[1]) as f64).sqrt();
            (0..count)
                .map(|_| ((rng.next_f64() * 2.0 - 1.0) * limit) as f32)
                .collect()
        } else {
            vec![0.0; count]
        };
        let tensor = Tensor::from_vec(values, dims, device)?;
        varmap.set_one(&name, &tensor)?;
    }
    Ok(())
}

/// Fisher-Yates shuffle driven by a seeded LCG, for reproducible batches.
fn shuffle_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = seed;
    for i in (1..n).rev() {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = (rng >> 33) as usize % (i + 1);
        indices.swap(i, j);
    }
    indices
}

/// Minimal LCG used only for parameter initialization.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}
