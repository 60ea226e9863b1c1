//! BiLSTM emissions decoded by a linear-chain CRF.

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::crf::layer::CrfLayer;
use crate::data::batch::Batch;
use crate::data::vocab::PAD_ID;
use crate::error::Result;
use crate::model::SequenceTagger;
use crate::model::encoder::EmissionNetwork;
use crate::model::hparams::HyperParameters;

#[derive(Debug, Clone)]
pub struct CrfModel {
    network: EmissionNetwork,
    crf: CrfLayer,
}

impl CrfModel {
    pub fn new(hparams: &HyperParameters, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            network: EmissionNetwork::new(hparams, vb.clone())?,
            crf: CrfLayer::new(hparams.num_classes, vb.pp("crf"))?,
        })
    }

    pub fn crf(&self) -> &CrfLayer {
        &self.crf
    }

    /// Per-sequence log-likelihood of `tags`, `[batch]`.
    pub fn log_probs(&self, inputs: &Tensor, tags: &Tensor, mask: &Tensor, train: bool) -> Result<Tensor> {
        let emissions = self.network.forward(inputs, train)?;
        self.crf.log_likelihood(&emissions, tags, mask)
    }

    /// Decode raw `[batch, seq_len]` ids, treating `<PAD>` as padding.
    pub fn predict(&self, inputs: &Tensor) -> Result<Vec<Vec<u32>>> {
        let lengths: Vec<usize> = inputs
            .to_vec2::<u32>()?
            .iter()
            .map(|row| row.iter().take_while(|&&id| id != PAD_ID).count())
            .collect();
        let emissions = self.network.forward(inputs, false)?;
        self.crf.decode(&emissions, &lengths)
    }
}

impl SequenceTagger for CrfModel {
    fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        self.network.forward(inputs, train)
    }

    /// Negative mean log-likelihood over the batch.
    fn compute_loss(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let llh = self.log_probs(&batch.inputs, &batch.labels, &batch.mask, train)?;
        Ok(llh.mean_all()?.neg()?)
    }

    fn decode(&self, batch: &Batch) -> Result<Vec<Vec<u32>>> {
        let emissions = self.network.forward(&batch.inputs, false)?;
        self.crf.decode(&emissions, &batch.lengths)
    }
}
