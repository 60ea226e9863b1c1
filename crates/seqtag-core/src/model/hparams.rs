//! Model hyperparameters.

use std::fmt;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::data::vocab::Vocabularies;
use crate::error::{Result, TaggerError};

/// Which tagger architecture to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// BiLSTM with a softmax classifier per token.
    Baseline,
    /// BiLSTM emissions decoded by a linear-chain CRF.
    Crf,
}

impl ModelKind {
    /// CRF sequences are wrapped in `<BOS>`/`<EOS>`.
    pub fn uses_boundary_markers(self) -> bool {
        matches!(self, ModelKind::Crf)
    }

    pub fn default_name(self) -> &'static str {
        match self {
            ModelKind::Baseline => "BiLSTM",
            ModelKind::Crf => "CRF_BiLSTM",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Baseline => write!(f, "baseline"),
            ModelKind::Crf => write!(f, "crf"),
        }
    }
}

pub const DEFAULT_EMBEDDING_DIM: usize = 300;
pub const DEFAULT_HIDDEN_DIM: usize = 256;
pub const DEFAULT_NUM_LAYERS: usize = 2;
pub const DEFAULT_DROPOUT: f32 = 0.5;

/// Dimensions and data artifacts a tagger is built from.
///
/// Created once per run, before the model, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperParameters {
    pub model_name: String,
    pub kind: ModelKind,
    pub vocab_size: usize,
    pub num_classes: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    pub dropout: f32,
    pub batch_size: usize,
    /// Pretrained `[vocab_size, embedding_dim]` matrix; not persisted since
    /// the trained embedding lives in the weights file.
    #[serde(skip)]
    pub embeddings: Option<Tensor>,
}

impl HyperParameters {
    /// Defaults for a given architecture and vocabulary.
    ///
    /// The embedding dimension follows the pretrained matrix when one is
    /// given.
    pub fn new(
        kind: ModelKind,
        vocabs: &Vocabularies,
        embeddings: Option<Tensor>,
        batch_size: usize,
    ) -> Result<Self> {
        let embedding_dim = match &embeddings {
            Some(matrix) => matrix.dims2()?.1,
            None => DEFAULT_EMBEDDING_DIM,
        };
        let hparams = Self {
            model_name: kind.default_name().to_string(),
            kind,
            vocab_size: vocabs.tokens.len(),
            num_classes: vocabs.labels.len(),
            embedding_dim,
            hidden_dim: DEFAULT_HIDDEN_DIM,
            num_layers: DEFAULT_NUM_LAYERS,
            bidirectional: true,
            dropout: DEFAULT_DROPOUT,
            batch_size,
            embeddings,
        };
        hparams.validate()?;
        Ok(hparams)
    }

    /// Override the recurrent encoder shape.
    #[must_use]
    pub fn with_encoder(mut self, hidden_dim: usize, num_layers: usize, bidirectional: bool) -> Self {
        self.hidden_dim = hidden_dim;
        self.num_layers = num_layers;
        self.bidirectional = bidirectional;
        self
    }

    /// Override the embedding size; only valid without a pretrained matrix.
    #[must_use]
    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    #[must_use]
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Width of the encoder output fed to the classifier.
    pub fn lstm_output_dim(&self) -> usize {
        if self.bidirectional {
            self.hidden_dim * 2
        } else {
            self.hidden_dim
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 || self.num_classes == 0 {
            return Err(TaggerError::Config("vocabularies must not be empty".into()));
        }
        if self.embedding_dim == 0 || self.hidden_dim == 0 || self.num_layers == 0 {
            return Err(TaggerError::Config(
                "embedding dim, hidden dim and layer count must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TaggerError::Config("batch size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TaggerError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if let Some(matrix) = &self.embeddings {
            let dims = matrix.dims2()?;
            if dims != (self.vocab_size, self.embedding_dim) {
                return Err(TaggerError::Shape(format!(
                    "pretrained embeddings are {dims:?}, expected ({}, {})",
                    self.vocab_size, self.embedding_dim
                )));
            }
        }
        Ok(())
    }
}
