//! # seqtag Core
//!
//! Sequence labeling (POS / NER tagging) on top of candle. Provides the TSV
//! dataset parser and vocabularies, batching, pretrained embeddings, and the
//! BiLSTM and BiLSTM-CRF taggers.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqtag_core::data::{DatasetParser, EncodingConfig, TsvDataset};
//!
//! let train = TsvDataset::parse_str("The\tDET\ncat\tNOUN\nsat\tVERB\n").unwrap();
//! let mut parser = DatasetParser::new(EncodingConfig::new(5, false).unwrap());
//! parser.build_vocabularies(&train);
//!
//! let encoded = parser.encode(&train).unwrap();
//! assert_eq!(encoded.examples[0].inputs.len(), 5);
//! assert_eq!(encoded.examples[0].length, 3);
//! ```
pub mod crf;
pub mod data;
pub mod error;
pub mod model;

// Re-export primary API
pub use crf::{CrfLayer, TransitionScores, ViterbiDecoder};
pub use data::{
    Batch, DatasetParser, EncodedDataset, EncodedExample, EncodingConfig, TaggedSentence,
    TsvDataset, Vocabularies, Vocabulary,
};
pub use error::{Result, TaggerError};
pub use model::{
    BaselineModel, CrfModel, HyperParameters, ModelKind, SequenceTagger, Tagger, TaggerModel,
};
