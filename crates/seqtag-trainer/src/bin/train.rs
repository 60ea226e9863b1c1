use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use seqtag_core::ModelKind;
use seqtag_trainer::{RunConfig, run_training};
use tracing::Level;

/// Train a BiLSTM or BiLSTM-CRF sequence tagger
#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(version)]
struct Cli {
    /// JSON run config; flags given on the command line override it
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding train.tsv, dev.tsv and test.tsv
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for embeddings, checkpoints, metrics and reports
    #[arg(long)]
    resources_dir: Option<PathBuf>,

    /// Word-vector file inside the resources directory
    #[arg(long)]
    embeddings: Option<String>,

    /// Train without pretrained embeddings
    #[arg(long)]
    no_embeddings: bool,

    /// Tagger architecture
    #[arg(short, long, value_parser = parse_kind)]
    model: Option<ModelKind>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    max_len: Option<usize>,

    #[arg(short, long)]
    batch_size: Option<usize>,

    #[arg(short, long)]
    epochs: Option<usize>,

    #[arg(long)]
    embedding_dim: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Shuffle the training set every epoch
    #[arg(long)]
    shuffle: bool,

    /// Stay on the CPU even when CUDA is available
    #[arg(long)]
    cpu: bool,

    /// Log every batch
    #[arg(short, long)]
    verbose: bool,
}

fn parse_kind(value: &str) -> Result<ModelKind, String> {
    match value {
        "baseline" => Ok(ModelKind::Baseline),
        "crf" => Ok(ModelKind::Crf),
        other => Err(format!("unknown model '{other}', expected 'baseline' or 'crf'")),
    }
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(dir) = self.resources_dir {
            config.resources_dir = dir;
        }
        if let Some(file) = self.embeddings {
            config.embeddings_file = Some(file);
        }
        if self.no_embeddings {
            config.embeddings_file = None;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_len) = self.max_len {
            config.max_len = max_len;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(dim) = self.embedding_dim {
            config.embedding_dim = dim;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        config.shuffle |= self.shuffle;
        if self.cpu {
            config.use_gpu = false;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let result = cli.into_config().and_then(run_training);
    if let Err(e) = result {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}
