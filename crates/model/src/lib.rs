//! # vigil-model
//!
//! The trainable compression model at the heart of Vigil: a small
//! feed-forward autoencoder that learns to reconstruct normalized feature
//! vectors. Candles whose reconstruction error is unusually large are the
//! anomaly candidates scored by `vigil-detect`.
//!
//! The crate covers the model lifecycle end to end: architecture
//! construction from [`ModelParams`], mini-batch training with early
//! stopping, progress events, and cooperative cancellation
//! ([`AnomalyModel::train_with_progress`]), inference
//! ([`AnomalyModel::predict`] / [`encode`](AnomalyModel::encode) /
//! [`decode`](AnomalyModel::decode)), and single-blob persistence
//! ([`ModelBundle`]).

mod autoencoder;
mod bundle;
mod error;
mod model;
mod params;

pub use bundle::{ModelBundle, WeightTensor};
pub use error::ModelError;
pub use model::{row_mse, AnomalyModel, CancelFlag, EpochStats, TrainOptions};
pub use params::ModelParams;
