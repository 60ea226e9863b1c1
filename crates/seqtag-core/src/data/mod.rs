pub mod batch;
pub mod dataset;
pub mod embeddings;
pub mod encode;
pub mod vocab;

pub use batch::Batch;
pub use dataset::{TaggedSentence, TsvDataset};
pub use embeddings::{build_embedding_matrix, load_pretrained_embeddings, read_word_vectors};
pub use encode::{DatasetParser, EncodedDataset, EncodedExample, EncodingConfig};
pub use vocab::{ReservedTokens, Vocabularies, Vocabulary, BOS, EOS, PAD, PAD_ID, UNK};
