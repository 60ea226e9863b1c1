pub mod layer;
pub mod viterbi;

pub use layer::CrfLayer;
pub use viterbi::{TransitionScores, ViterbiDecoder};
