//! Stacking encoded examples into tensors.

use candle_core::{Device, Tensor};

use crate::data::encode::EncodedExample;
use crate::error::{Result, TaggerError};

/// A mini-batch ready for the models.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, seq_len]` token ids.
    pub inputs: Tensor,
    /// `[batch, seq_len]` gold label ids.
    pub labels: Tensor,
    /// `[batch, seq_len]` f32, 1.0 at real positions and 0.0 at padding.
    pub mask: Tensor,
    /// Real length of each example.
    pub lengths: Vec<usize>,
}

impl Batch {
    pub fn from_examples(examples: &[EncodedExample], device: &Device) -> Result<Self> {
        let Some(first) = examples.first() else {
            return Err(TaggerError::Shape("cannot build an empty batch".into()));
        };
        let seq_len = first.inputs.len();
        if examples
            .iter()
            .any(|e| e.inputs.len() != seq_len || e.labels.len() != seq_len)
        {
            return Err(TaggerError::Shape(
                "examples in a batch must share one padded length".into(),
            ));
        }

        let batch_size = examples.len();
        let inputs: Vec<u32> = examples.iter().flat_map(|e| e.inputs.iter().copied()).collect();
        let labels: Vec<u32> = examples.iter().flat_map(|e| e.labels.iter().copied()).collect();
        let mask: Vec<f32> = examples
            .iter()
            .flat_map(|e| (0..seq_len).map(move |i| if i < e.length { 1.0 } else { 0.0 }))
            .collect();

        Ok(Self {
            inputs: Tensor::from_vec(inputs, (batch_size, seq_len), device)?,
            labels: Tensor::from_vec(labels, (batch_size, seq_len), device)?,
            mask: Tensor::from_vec(mask, (batch_size, seq_len), device)?,
            lengths: examples.iter().map(|e| e.length).collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.lengths.len()
    }

    /// Gold labels as host vectors, truncated to each example's length.
    pub fn gold_labels(&self) -> Result<Vec<Vec<u32>>> {
        let rows = self.labels.to_vec2::<u32>()?;
        Ok(rows
            .into_iter()
            .zip(&self.lengths)
            .map(|(mut row, &len)| {
                row.truncate(len);
                row
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(inputs: Vec<u32>, length: usize) -> EncodedExample {
        EncodedExample {
            labels: inputs.clone(),
            inputs,
            length,
        }
    }

    #[test]
    fn test_batch_shapes_and_mask() {
        let examples = vec![example(vec![5, 6, 0, 0], 2), example(vec![7, 8, 9, 0], 3)];
        let batch = Batch::from_examples(&examples, &Device::Cpu).unwrap();

        assert_eq!(batch.inputs.dims(), &[2, 4]);
        assert_eq!(batch.size(), 2);
        let mask = batch.mask.to_vec2::<f32>().unwrap();
        assert_eq!(mask[0], vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(mask[1], vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(batch.gold_labels().unwrap(), vec![vec![5, 6], vec![7, 8, 9]]);
    }

    #[test]
    fn test_empty_or_ragged_batch_rejected() {
        assert!(Batch::from_examples(&[], &Device::Cpu).is_err());
        let ragged = vec![example(vec![1, 0], 1), example(vec![1, 2, 0], 2)];
        assert!(Batch::from_examples(&ragged, &Device::Cpu).is_err());
    }
}
