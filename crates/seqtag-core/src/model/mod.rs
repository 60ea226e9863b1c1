//! # Taggers
//!
//! Both architectures share the [`SequenceTagger`] capability. The variant is
//! picked once, from [`ModelKind`], when the [`Tagger`] is built.

pub mod baseline;
pub mod crf;
pub mod encoder;
pub mod hparams;

use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use tracing::info;

use crate::data::batch::Batch;
use crate::error::{Result, TaggerError};

pub use baseline::{BaselineModel, masked_cross_entropy};
pub use crf::CrfModel;
pub use encoder::{EmissionNetwork, RecurrentEncoder};
pub use hparams::{HyperParameters, ModelKind};

/// What every tagger can do.
pub trait SequenceTagger {
    /// `[batch, seq_len]` ids → `[batch, seq_len, num_classes]` scores.
    /// Dropout is active only when `train` is set.
    fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor>;

    /// Scalar training loss for a batch.
    fn compute_loss(&self, batch: &Batch, train: bool) -> Result<Tensor>;

    /// Predicted label ids per example, truncated to each example's length.
    fn decode(&self, batch: &Batch) -> Result<Vec<Vec<u32>>>;
}

/// The tagger architecture, chosen once at startup.
#[derive(Debug, Clone)]
pub enum TaggerModel {
    Baseline(BaselineModel),
    Crf(CrfModel),
}

impl SequenceTagger for TaggerModel {
    fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            TaggerModel::Baseline(model) => model.forward(inputs, train),
            TaggerModel::Crf(model) => model.forward(inputs, train),
        }
    }

    fn compute_loss(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        match self {
            TaggerModel::Baseline(model) => model.compute_loss(batch, train),
            TaggerModel::Crf(model) => model.compute_loss(batch, train),
        }
    }

    fn decode(&self, batch: &Batch) -> Result<Vec<Vec<u32>>> {
        match self {
            TaggerModel::Baseline(model) => model.decode(batch),
            TaggerModel::Crf(model) => model.decode(batch),
        }
    }
}

/// A tagger together with the parameter store it owns.
pub struct Tagger {
    varmap: VarMap,
    hparams: HyperParameters,
    model: TaggerModel,
    device: Device,
}

impl Tagger {
    /// Build a freshly initialised tagger, copying in pretrained embeddings
    /// when the hyperparameters carry them.
    pub fn new(hparams: HyperParameters, device: &Device) -> Result<Self> {
        hparams.validate()?;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let model = match hparams.kind {
            ModelKind::Baseline => TaggerModel::Baseline(BaselineModel::new(&hparams, vb)?),
            ModelKind::Crf => TaggerModel::Crf(CrfModel::new(&hparams, vb)?),
        };

        if let Some(matrix) = &hparams.embeddings {
            info!("initializing embeddings from pretrained");
            let matrix = matrix.to_device(device)?.to_dtype(DType::F32)?;
            varmap.set_one(EmissionNetwork::EMBEDDING_WEIGHT, &matrix)?;
        }

        Ok(Self {
            varmap,
            hparams,
            model,
            device: device.clone(),
        })
    }

    pub fn hparams(&self) -> &HyperParameters {
        &self.hparams
    }

    pub fn kind(&self) -> ModelKind {
        self.hparams.kind
    }

    pub fn model(&self) -> &TaggerModel {
        &self.model
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Every trainable parameter, for the optimizer.
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn num_parameters(&self) -> usize {
        self.varmap.all_vars().iter().map(|var| var.elem_count()).sum()
    }

    /// One line per parameter with its shape, sorted by name.
    pub fn summary(&self) -> String {
        let data = self
            .varmap
            .data()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();

        let mut out = format!("{} (\n", self.hparams.model_name);
        for name in names {
            let var = &data[name];
            out.push_str(&format!(
                "  ({name}): shape={:?}, parameters={}\n",
                var.dims(),
                var.elem_count()
            ));
        }
        out.push(')');
        out
    }

    /// Write the parameter-only snapshot as safetensors.
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Overwrite every parameter from a safetensors snapshot.
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TaggerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("weights file {} not found", path.display()),
            )));
        }
        self.varmap.load(path)?;
        Ok(())
    }
}

impl SequenceTagger for Tagger {
    fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        self.model.forward(inputs, train)
    }

    fn compute_loss(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        self.model.compute_loss(batch, train)
    }

    fn decode(&self, batch: &Batch) -> Result<Vec<Vec<u32>>> {
        self.model.decode(batch)
    }
}

impl std::fmt::Debug for Tagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tagger")
            .field("hparams", &self.hparams)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
