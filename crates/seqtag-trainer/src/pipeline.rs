//! End-to-end run: data → vocabularies → tagger → training → evaluation.

use std::fs;

use anyhow::{Context, Result};
use candle_core::Device;
use seqtag_core::data::load_pretrained_embeddings;
use seqtag_core::{DatasetParser, EncodingConfig, HyperParameters, Tagger, TsvDataset};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::evaluator::{EvaluationReport, evaluate};
use crate::metrics::JsonlMetricsWriter;
use crate::trainer::{Trainer, TrainingReport};

/// Written next to the checkpoint at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub config: RunConfig,
    pub num_parameters: usize,
    pub training: TrainingReport,
    pub test: EvaluationReport,
}

pub fn select_device(use_gpu: bool) -> Result<Device> {
    if use_gpu {
        Ok(Device::cuda_if_available(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

pub fn run_training(config: RunConfig) -> Result<RunReport> {
    config.validate()?;
    let device = select_device(config.use_gpu)?;
    if !device.is_cpu() {
        device.set_seed(config.seed)?;
    }
    info!(device = ?device, seed = config.seed, model = %config.model, "starting run");

    let train = TsvDataset::from_path(config.train_path())
        .with_context(|| format!("failed to load {}", config.train_path().display()))?;
    let dev = TsvDataset::from_path(config.dev_path())
        .with_context(|| format!("failed to load {}", config.dev_path().display()))?;
    let test = TsvDataset::from_path(config.test_path())
        .with_context(|| format!("failed to load {}", config.test_path().display()))?;

    let encoding = EncodingConfig::new(config.max_len, config.model.uses_boundary_markers())?;
    let mut parser = DatasetParser::new(encoding);
    let vocabularies = parser.build_vocabularies(&train).clone();
    let train_set = parser.encode(&train)?;
    let dev_set = parser.encode(&dev)?;
    let test_set = parser.encode(&test)?;
    info!(
        train = train_set.len(),
        dev = dev_set.len(),
        test = test_set.len(),
        "encoded datasets"
    );

    let embeddings = match config.embeddings_path() {
        Some(path) if path.exists() => Some(load_pretrained_embeddings(
            &path,
            &vocabularies.tokens,
            config.embedding_dim,
            config.seed,
            &device,
        )?),
        Some(path) => {
            warn!(path = %path.display(), "pretrained embeddings not found, training from scratch");
            None
        }
        None => None,
    };

    let mut hparams = HyperParameters::new(config.model, &vocabularies, embeddings, config.batch_size)?
        .with_encoder(config.hidden_dim, config.num_layers, config.bidirectional)
        .with_dropout(config.dropout);
    if hparams.embeddings.is_none() {
        hparams = hparams.with_embedding_dim(config.embedding_dim);
    }
    let model_name = hparams.model_name.clone();

    let tagger = Tagger::new(hparams, &device)?;
    info!("model summary\n{}", tagger.summary());
    let num_parameters = tagger.num_parameters();
    info!(num_parameters, "built {model_name}");

    let mut sink = JsonlMetricsWriter::create(config.metrics_path(&model_name))?;
    let mut trainer = Trainer::new(tagger, vocabularies.clone(), config.training_config(&model_name))?;
    let training = trainer.train(&train_set, &dev_set, &mut sink)?;

    let tagger = trainer.into_tagger();
    let test_report = evaluate(&tagger, &test_set, &vocabularies, config.batch_size)?;
    info!("test performance\n{test_report}");

    let report = RunReport {
        num_parameters,
        training,
        test: test_report,
        config,
    };
    let report_path = report.config.report_path(&model_name);
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&report_path, serde_json::to_vec_pretty(&report)?)
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    info!(path = %report_path.display(), "wrote run report");

    Ok(report)
}
