//! Feed-forward autoencoder network definition.
//!
//! Architecture: ReLU encoder stack over `encoder_units`, a ReLU latent
//! bottleneck, a ReLU decoder stack over `decoder_units`, and a linear
//! output layer back to the input width. One dropout site sits after the
//! first encoder layer and one after the penultimate decoder layer; both
//! are active only during training.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder};

use crate::params::ModelParams;

/// Encoder → latent → decoder network built over a [`VarBuilder`].
pub struct Autoencoder {
    encoder: Vec<Linear>,
    latent: Linear,
    decoder: Vec<Linear>,
    output: Linear,
    dropout: Dropout,
}

impl Autoencoder {
    /// Build the network with freshly initialized (or builder-supplied)
    /// parameters.
    pub fn new(params: &ModelParams, vb: VarBuilder<'_>) -> Result<Self> {
        let mut encoder = Vec::with_capacity(params.encoder_units.len());
        let mut width = params.input_width;
        for (i, &units) in params.encoder_units.iter().enumerate() {
            encoder.push(linear(width, units, vb.pp(format!("enc{i}")))?);
            width = units;
        }
        let latent = linear(width, params.latent_size, vb.pp("latent"))?;

        let mut decoder = Vec::with_capacity(params.decoder_units.len());
        width = params.latent_size;
        for (i, &units) in params.decoder_units.iter().enumerate() {
            decoder.push(linear(width, units, vb.pp(format!("dec{i}")))?);
            width = units;
        }
        let output = linear(width, params.input_width, vb.pp("out"))?;

        Ok(Self {
            encoder,
            latent,
            decoder,
            output,
            dropout: Dropout::new(params.dropout_rate as f32),
        })
    }

    /// Encoder half: input → latent representation.
    pub fn encode(&self, x: &Tensor) -> Result<Tensor> {
        self.encode_t(x, false)
    }

    fn encode_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = x.clone();
        for (i, layer) in self.encoder.iter().enumerate() {
            x = layer.forward(&x)?.relu()?;
            if i == 0 {
                x = self.dropout.forward(&x, train)?;
            }
        }
        self.latent.forward(&x)?.relu()
    }

    /// Decoder half: latent representation → reconstruction.
    ///
    /// The output layer is linear; reconstructed values are not clipped.
    pub fn decode(&self, z: &Tensor) -> Result<Tensor> {
        self.decode_t(z, false)
    }

    fn decode_t(&self, z: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = z.clone();
        let last = self.decoder.len().saturating_sub(1);
        for (i, layer) in self.decoder.iter().enumerate() {
            x = layer.forward(&x)?.relu()?;
            if i == last {
                x = self.dropout.forward(&x, train)?;
            }
        }
        self.output.forward(&x)
    }

    /// Full reconstruction pass. `train` enables the dropout sites.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let z = self.encode_t(x, train)?;
        self.decode_t(&z, train)
    }
}
