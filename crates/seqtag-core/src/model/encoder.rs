//! Embedding → stacked (Bi)LSTM → dropout → linear emission network shared by
//! both tagger variants.

use candle_core::Tensor;
use candle_nn::rnn::{Direction, LSTM, LSTMConfig, RNN, lstm};
use candle_nn::{Dropout, Embedding, Linear, Module, ModuleT, VarBuilder, embedding, linear};

use crate::error::Result;
use crate::model::hparams::HyperParameters;

/// One LSTM layer, optionally paired with a right-to-left twin.
#[derive(Debug, Clone)]
struct EncoderLayer {
    forward: LSTM,
    backward: Option<LSTM>,
}

impl EncoderLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let forward = run_lstm(&self.forward, xs)?;
        match &self.backward {
            None => Ok(forward),
            Some(backward) => {
                let reversed = reverse_time(xs)?;
                let backward = reverse_time(&run_lstm(backward, &reversed)?)?;
                Ok(Tensor::cat(&[&forward, &backward], 2)?)
            }
        }
    }
}

/// Stacked, optionally bidirectional LSTM over `[batch, seq_len, features]`.
///
/// Parameter names follow the `weight_ih_l{k}[_reverse]` convention.
#[derive(Debug, Clone)]
pub struct RecurrentEncoder {
    layers: Vec<EncoderLayer>,
    dropout: f32,
}

impl RecurrentEncoder {
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        bidirectional: bool,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let directions = if bidirectional { 2 } else { 1 };
        let mut layers = Vec::with_capacity(num_layers);

        for layer_idx in 0..num_layers {
            let in_dim = if layer_idx == 0 {
                input_dim
            } else {
                hidden_dim * directions
            };
            let forward = lstm(
                in_dim,
                hidden_dim,
                LSTMConfig {
                    layer_idx,
                    ..Default::default()
                },
                vb.clone(),
            )?;
            let backward = if bidirectional {
                Some(lstm(
                    in_dim,
                    hidden_dim,
                    LSTMConfig {
                        layer_idx,
                        direction: Direction::Backward,
                        ..Default::default()
                    },
                    vb.clone(),
                )?)
            } else {
                None
            };
            layers.push(EncoderLayer { forward, backward });
        }

        // Between-layer dropout only makes sense with more than one layer.
        let dropout = if num_layers > 1 { dropout } else { 0.0 };
        Ok(Self { layers, dropout })
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut hidden = xs.clone();
        for (idx, layer) in self.layers.iter().enumerate() {
            if idx > 0 && train && self.dropout > 0.0 {
                hidden = candle_nn::ops::dropout(&hidden, self.dropout)?;
            }
            hidden = layer.forward(&hidden)?;
        }
        Ok(hidden)
    }
}

fn run_lstm(lstm: &LSTM, xs: &Tensor) -> Result<Tensor> {
    let states = lstm.seq(xs)?;
    Ok(lstm.states_to_tensor(&states)?)
}

/// Reverse the time axis (dim 1).
fn reverse_time(xs: &Tensor) -> Result<Tensor> {
    let seq_len = xs.dim(1)?;
    let order: Vec<u32> = (0..seq_len as u32).rev().collect();
    let order = Tensor::from_vec(order, seq_len, xs.device())?;
    Ok(xs.index_select(&order, 1)?)
}

/// Per-token class scores from token ids.
#[derive(Debug, Clone)]
pub struct EmissionNetwork {
    word_embedding: Embedding,
    encoder: RecurrentEncoder,
    dropout: Dropout,
    classifier: Linear,
}

impl EmissionNetwork {
    /// Parameter name of the embedding table inside the model's `VarMap`.
    pub const EMBEDDING_WEIGHT: &'static str = "word_embedding.weight";

    pub fn new(hparams: &HyperParameters, vb: VarBuilder) -> Result<Self> {
        let word_embedding = embedding(
            hparams.vocab_size,
            hparams.embedding_dim,
            vb.pp("word_embedding"),
        )?;
        let encoder = RecurrentEncoder::new(
            hparams.embedding_dim,
            hparams.hidden_dim,
            hparams.num_layers,
            hparams.bidirectional,
            hparams.dropout,
            vb.pp("lstm"),
        )?;
        let classifier = linear(
            hparams.lstm_output_dim(),
            hparams.num_classes,
            vb.pp("classifier"),
        )?;

        Ok(Self {
            word_embedding,
            encoder,
            dropout: Dropout::new(hparams.dropout),
            classifier,
        })
    }

    /// `[batch, seq_len]` ids → `[batch, seq_len, num_classes]` logits.
    pub fn forward(&self, inputs: &Tensor, train: bool) -> Result<Tensor> {
        let embeddings = self.word_embedding.forward(inputs)?;
        let encoded = self.encoder.forward_t(&embeddings, train)?;
        let encoded = self.dropout.forward_t(&encoded, train)?;
        Ok(self.classifier.forward(&encoded)?)
    }
}
