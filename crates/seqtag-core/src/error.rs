use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preparing data for, building, or running a tagger.
#[derive(Debug, Error)]
pub enum TaggerError {
    /// A split was encoded before the training vocabularies were built.
    #[error("vocabulary has not been built; build it from the training split first")]
    MissingVocabulary,

    /// A label that the training split never produced.
    #[error("label {label:?} is not in the training label vocabulary")]
    UnknownLabel {
        /// The offending label.
        label: String,
    },

    /// A TSV record could not be interpreted.
    #[error("malformed record at {}:{line}: {reason}", path.display())]
    MalformedRecord {
        /// Source file (or `<memory>` for in-memory input).
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Tensor shapes or mask layout that the models cannot handle.
    #[error("shape error: {0}")]
    Shape(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Candle ML framework error.
    #[error("ML framework error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for seqtag operations.
pub type Result<T> = std::result::Result<T, TaggerError>;
