//! Single-blob model persistence.
//!
//! A [`ModelBundle`] is the self-describing unit the platform persists:
//! architecture params, named weight tensors, the calibrated threshold,
//! and a save timestamp. The storage backend is a collaborator concern —
//! this module only defines the byte-level contract plus thin file
//! helpers for the CLI.

use std::collections::BTreeSet;
use std::path::Path;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::AnomalyModel;
use crate::params::ModelParams;

/// Current bundle format version.
const BUNDLE_VERSION: u32 = 1;

/// One named weight tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Self-describing persistence blob for a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    /// Format version for forward compatibility.
    pub version: u32,
    /// Architecture and optimizer params the weights were trained under.
    pub params: ModelParams,
    /// Calibrated anomaly threshold, if calibration had run.
    pub threshold: Option<f64>,
    /// Save timestamp, milliseconds since epoch.
    pub saved_at: i64,
    /// All learned parameters, sorted by name.
    pub weights: Vec<WeightTensor>,
}

impl ModelBundle {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let bundle: ModelBundle = serde_json::from_slice(bytes)?;
        anyhow::ensure!(
            bundle.version == BUNDLE_VERSION,
            "unsupported bundle version {}, expected {}",
            bundle.version,
            BUNDLE_VERSION
        );
        Ok(bundle)
    }

    /// Write the bundle to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read a bundle from a file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl AnomalyModel {
    /// Capture the trained model as a persistable bundle.
    ///
    /// Serializing an untrained model is a state error; a trained but
    /// uncalibrated model serializes with `threshold: None`.
    pub fn to_bundle(&self) -> Result<ModelBundle, ModelError> {
        self.ensure_trained()?;
        let data = self.varmap().data().lock().unwrap();
        let mut weights = Vec::with_capacity(data.len());
        for (name, var) in data.iter() {
            let tensor = var.as_tensor();
            weights.push(WeightTensor {
                name: name.clone(),
                shape: tensor.dims().to_vec(),
                data: tensor.flatten_all()?.to_vec1::<f32>()?,
            });
        }
        weights.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ModelBundle {
            version: BUNDLE_VERSION,
            params: self.params().clone(),
            threshold: self.threshold(),
            saved_at: chrono::Utc::now().timestamp_millis(),
            weights,
        })
    }

    /// Rebuild a trained model from a bundle.
    ///
    /// The bundle's declared params drive architecture construction; its
    /// weight names must match that architecture exactly.
    pub fn from_bundle(bundle: &ModelBundle) -> Result<Self, ModelError> {
        let mut model = Self::new(bundle.params.clone())?;

        let expected: BTreeSet<String> = model
            .varmap()
            .data()
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let got: BTreeSet<String> = bundle.weights.iter().map(|w| w.name.clone()).collect();
        if expected != got {
            let missing: Vec<_> = expected.difference(&got).cloned().collect();
            let extra: Vec<_> = got.difference(&expected).cloned().collect();
            return Err(ModelError::BundleMismatch(format!(
                "missing tensors {missing:?}, unexpected tensors {extra:?}"
            )));
        }

        let device = model.device().clone();
        for w in &bundle.weights {
            let tensor = Tensor::from_vec(w.data.clone(), w.shape.clone(), &device)?;
            model.varmap_mut().set_one(&w.name, &tensor)?;
        }

        model.mark_trained();
        model.set_threshold_opt(bundle.threshold);
        Ok(model)
    }
}
