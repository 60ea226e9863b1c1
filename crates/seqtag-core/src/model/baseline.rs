//! BiLSTM tagger with an independent softmax per token.

use candle_core::{D, Tensor};
use candle_nn::VarBuilder;

use crate::data::batch::Batch;
use crate::error::{Result, TaggerError};
use crate::model::SequenceTagger;
use crate::model::encoder::EmissionNetwork;
use crate::model::hparams::HyperParameters;

#[derive(Debug, Clone)]
pub struct BaselineModel {
    network: EmissionNetwork,
}

impl BaselineModel {
    pub fn new(hparams: &HyperParameters, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            network: EmissionNetwork::new(hparams, vb)?,
        })
    }
}

impl SequenceTagger for BaselineModel {
    fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        self.network.forward(inputs, train)
    }

    fn compute_loss(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let logits = self.forward(&batch.inputs, train)?;
        masked_cross_entropy(&logits, &batch.labels, &batch.mask)
    }

    fn decode(&self, batch: &Batch) -> Result<Vec<Vec<u32>>> {
        let logits = self.forward(&batch.inputs, false)?;
        let best = logits.argmax(D::Minus1)?.to_vec2::<u32>()?;
        Ok(best
            .into_iter()
            .zip(&batch.lengths)
            .map(|(mut row, &len)| {
                row.truncate(len);
                row
            })
            .collect())
    }
}

/// Token-level cross-entropy averaged over unmasked positions.
///
/// * `logits` - `[batch, seq_len, num_classes]`
/// * `labels` - `[batch, seq_len]` u32
/// * `mask` - `[batch, seq_len]` f32
pub fn masked_cross_entropy(logits: &Tensor, labels: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let (batch, seq_len, num_classes) = logits.dims3()?;
    let positions = batch * seq_len;

    let log_probs = candle_nn::ops::log_softmax(&logits.reshape((positions, num_classes))?, D::Minus1)?;
    let picked = log_probs
        .gather(&labels.reshape((positions, 1))?, 1)?
        .squeeze(1)?;
    let mask = mask.reshape(positions)?;

    let count = mask.sum_all()?.to_scalar::<f32>()?;
    if count <= 0.0 {
        return Err(TaggerError::Shape("batch has no unmasked positions".into()));
    }

    Ok(picked.mul(&mask)?.sum_all()?.neg()?.affine(1.0 / count as f64, 0.0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_masked_cross_entropy_ignores_padding() {
        // Position 1 is padding with a terrible prediction; it must not count.
        let logits = Tensor::new(&[[[2.0f32, 0.0], [-50.0, 50.0]]], &Device::Cpu).unwrap();
        let labels = Tensor::new(&[[0u32, 0]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1f32, 0.]], &Device::Cpu).unwrap();

        let loss = masked_cross_entropy(&logits, &labels, &mask)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let expected = -(2.0f32.exp() / (2.0f32.exp() + 1.0)).ln();
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_fully_masked_batch_is_an_error() {
        let logits = Tensor::new(&[[[1.0f32, 0.0]]], &Device::Cpu).unwrap();
        let labels = Tensor::new(&[[0u32]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[0f32]], &Device::Cpu).unwrap();
        assert!(masked_cross_entropy(&logits, &labels, &mask).is_err());
    }
}
