//! # seqtag Trainer
//!
//! Training loop, evaluation and checkpointing for the taggers in
//! `seqtag-core`, plus the end-to-end run behind the `train` binary.

pub mod checkpoint;
pub mod clipping;
pub mod config;
pub mod early_stopping;
pub mod evaluator;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{CheckpointManifest, load_checkpoint, save_checkpoint};
pub use config::{PlateauConfig, RunConfig, TrainingConfig};
pub use evaluator::{EvaluationReport, LabelMetrics, evaluate};
pub use metrics::{JsonlMetricsWriter, MemoryMetrics, MetricsSink};
pub use pipeline::{RunReport, run_training};
pub use trainer::{EpochRecord, Trainer, TrainingReport};
