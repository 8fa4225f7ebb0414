//! Immutable model configuration consumed at build time.

use serde::{Deserialize, Serialize};

/// Architecture and optimizer configuration for one autoencoder.
///
/// Consumed once when the model is built; the trained model carries its
/// params so a persisted bundle is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Width of the input (and reconstructed) vectors.
    pub input_width: usize,
    /// Encoder dense layer widths, outermost first.
    pub encoder_units: Vec<usize>,
    /// Latent bottleneck width.
    pub latent_size: usize,
    /// Decoder dense layer widths, innermost first.
    pub decoder_units: Vec<usize>,
    /// Dropout rate for the two dropout sites, active during training only.
    pub dropout_rate: f64,
    /// Fixed optimizer learning rate.
    pub learning_rate: f64,
    /// Parameter initialization seed.
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            // The canonical candle feature width.
            input_width: 12,
            encoder_units: vec![16, 8, 4],
            latent_size: 2,
            decoder_units: vec![4, 8, 16],
            dropout_rate: 0.2,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}
