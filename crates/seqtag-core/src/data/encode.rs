//! Vocabulary building and fixed-length encoding of tagged sentences.

use tracing::{debug, info};

use crate::data::dataset::{TaggedSentence, TsvDataset};
use crate::data::vocab::{PAD_ID, ReservedTokens, Vocabularies, Vocabulary};
use crate::error::{Result, TaggerError};

/// How sentences are turned into id sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingConfig {
    /// Every encoded sequence has exactly this many positions.
    pub max_len: usize,
    /// Wrap sentences in `<BOS>` / `<EOS>` (CRF variant).
    pub boundary_markers: bool,
}

impl EncodingConfig {
    pub fn new(max_len: usize, boundary_markers: bool) -> Result<Self> {
        let minimum = if boundary_markers { 3 } else { 1 };
        if max_len < minimum {
            return Err(TaggerError::Config(format!(
                "max_len must be at least {minimum}, got {max_len}"
            )));
        }
        Ok(Self {
            max_len,
            boundary_markers,
        })
    }

    /// Room left for sentence content once markers are placed.
    fn content_len(&self) -> usize {
        if self.boundary_markers {
            self.max_len - 2
        } else {
            self.max_len
        }
    }
}

/// A padded pair of input and label id sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub inputs: Vec<u32>,
    pub labels: Vec<u32>,
    /// Number of leading non-padding positions.
    pub length: usize,
}

impl EncodedExample {
    /// 1 at real positions, 0 at padding.
    pub fn mask(&self) -> Vec<u8> {
        (0..self.inputs.len())
            .map(|i| u8::from(i < self.length))
            .collect()
    }
}

/// An encoded split, every example of the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDataset {
    pub examples: Vec<EncodedExample>,
    pub max_len: usize,
}

impl EncodedDataset {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Consecutive slices of at most `batch_size` examples.
    pub fn batches(&self, batch_size: usize) -> std::slice::Chunks<'_, EncodedExample> {
        self.examples.chunks(batch_size.max(1))
    }

    /// Number of batches [`Self::batches`] yields.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.examples.len().div_ceil(batch_size.max(1))
    }
}

/// Builds vocabularies from the training split and encodes every split with them.
#[derive(Debug, Clone)]
pub struct DatasetParser {
    config: EncodingConfig,
    vocabularies: Option<Vocabularies>,
}

impl DatasetParser {
    pub fn new(config: EncodingConfig) -> Self {
        Self {
            config,
            vocabularies: None,
        }
    }

    /// A parser reusing vocabularies from an earlier run (e.g. a checkpoint).
    pub fn with_vocabularies(config: EncodingConfig, vocabularies: Vocabularies) -> Result<Self> {
        if vocabularies.boundary_markers != config.boundary_markers {
            return Err(TaggerError::Config(
                "vocabularies and encoding disagree on boundary markers".into(),
            ));
        }
        Ok(Self {
            config,
            vocabularies: Some(vocabularies),
        })
    }

    pub fn config(&self) -> EncodingConfig {
        self.config
    }

    pub fn vocabularies(&self) -> Option<&Vocabularies> {
        self.vocabularies.as_ref()
    }

    /// Build vocabularies from the training split.
    ///
    /// Only the first call builds; later calls return the existing ones so
    /// that dev/test data can never leak into the vocabulary.
    pub fn build_vocabularies(&mut self, train: &TsvDataset) -> &Vocabularies {
        let boundary_markers = self.config.boundary_markers;
        self.vocabularies.get_or_insert_with(|| {
            let tokens = Vocabulary::build(
                train
                    .sentences
                    .iter()
                    .flat_map(|s| s.tokens.iter().map(String::as_str)),
                ReservedTokens {
                    unknown: true,
                    boundary_markers,
                },
            );
            let labels = Vocabulary::build(
                train
                    .sentences
                    .iter()
                    .flat_map(|s| s.labels.iter().map(String::as_str)),
                ReservedTokens {
                    unknown: false,
                    boundary_markers,
                },
            );
            info!(
                tokens = tokens.len(),
                labels = labels.len(),
                "built vocabularies from training split"
            );
            Vocabularies {
                tokens,
                labels,
                boundary_markers,
            }
        })
    }

    /// Encode every sentence of a split.
    pub fn encode(&self, dataset: &TsvDataset) -> Result<EncodedDataset> {
        let examples = dataset
            .sentences
            .iter()
            .map(|sentence| self.encode_sentence(sentence))
            .collect::<Result<Vec<_>>>()?;

        let truncated = dataset
            .sentences
            .iter()
            .filter(|s| s.len() > self.config.content_len())
            .count();
        if truncated > 0 {
            debug!(truncated, max_len = self.config.max_len, "truncated long sentences");
        }

        Ok(EncodedDataset {
            examples,
            max_len: self.config.max_len,
        })
    }

    /// Encode one sentence: truncate, add markers, pad.
    pub fn encode_sentence(&self, sentence: &TaggedSentence) -> Result<EncodedExample> {
        let vocabs = self
            .vocabularies
            .as_ref()
            .ok_or(TaggerError::MissingVocabulary)?;
        if sentence.tokens.len() != sentence.labels.len() {
            return Err(TaggerError::Shape(format!(
                "sentence has {} tokens but {} labels",
                sentence.tokens.len(),
                sentence.labels.len()
            )));
        }

        let keep = sentence.len().min(self.config.content_len());
        let mut inputs = Vec::with_capacity(self.config.max_len);
        let mut labels = Vec::with_capacity(self.config.max_len);

        if self.config.boundary_markers {
            inputs.push(marker(&vocabs.tokens, vocabs.tokens.bos_id())?);
            labels.push(marker(&vocabs.labels, vocabs.labels.bos_id())?);
        }
        for (token, label) in sentence.tokens[..keep].iter().zip(&sentence.labels[..keep]) {
            inputs.push(vocabs.tokens.encode_token(token));
            labels.push(vocabs.labels.encode_label(label)?);
        }
        if self.config.boundary_markers {
            inputs.push(marker(&vocabs.tokens, vocabs.tokens.eos_id())?);
            labels.push(marker(&vocabs.labels, vocabs.labels.eos_id())?);
        }

        let length = inputs.len();
        inputs.resize(self.config.max_len, PAD_ID);
        labels.resize(self.config.max_len, PAD_ID);

        Ok(EncodedExample {
            inputs,
            labels,
            length,
        })
    }
}

fn marker(vocab: &Vocabulary, id: Option<u32>) -> Result<u32> {
    id.ok_or_else(|| {
        TaggerError::Config(format!(
            "boundary markers requested but vocabulary of {} entries has none",
            vocab.len()
        ))
    })
}
