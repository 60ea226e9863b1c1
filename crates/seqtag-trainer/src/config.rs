//! Run and training configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use seqtag_core::ModelKind;
use seqtag_core::model::hparams::{
    DEFAULT_DROPOUT, DEFAULT_EMBEDDING_DIM, DEFAULT_HIDDEN_DIM, DEFAULT_NUM_LAYERS,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEED: u64 = 1873337;
pub const DEFAULT_MAX_LEN: usize = 80;
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
pub const DEFAULT_CLIP_NORM: f64 = 5.0;

/// Everything one end-to-end run needs. Every field has a default, so a JSON
/// config file only has to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub train_file: String,
    pub dev_file: String,
    pub test_file: String,
    /// Embeddings are read from here; checkpoints, metrics and the report are
    /// written here.
    pub resources_dir: PathBuf,
    /// Word-vector file inside `resources_dir`. Skipped with a warning when
    /// absent.
    pub embeddings_file: Option<String>,
    pub model: ModelKind,
    pub seed: u64,
    pub max_len: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    pub dropout: f32,
    pub learning_rate: f64,
    pub shuffle: bool,
    pub use_gpu: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            train_file: "train.tsv".into(),
            dev_file: "dev.tsv".into(),
            test_file: "test.tsv".into(),
            resources_dir: PathBuf::from("resources"),
            embeddings_file: Some("wiki.en.vec".into()),
            model: ModelKind::Crf,
            seed: DEFAULT_SEED,
            max_len: DEFAULT_MAX_LEN,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: 1,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            hidden_dim: DEFAULT_HIDDEN_DIM,
            num_layers: DEFAULT_NUM_LAYERS,
            bidirectional: true,
            dropout: DEFAULT_DROPOUT,
            learning_rate: DEFAULT_LEARNING_RATE,
            shuffle: false,
            use_gpu: true,
        }
    }
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be positive");
        }
        if self.epochs == 0 {
            bail!("at least one epoch is required");
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            bail!("learning rate must be positive, got {}", self.learning_rate);
        }
        Ok(())
    }

    pub fn train_path(&self) -> PathBuf {
        self.data_dir.join(&self.train_file)
    }

    pub fn dev_path(&self) -> PathBuf {
        self.data_dir.join(&self.dev_file)
    }

    pub fn test_path(&self) -> PathBuf {
        self.data_dir.join(&self.test_file)
    }

    pub fn embeddings_path(&self) -> Option<PathBuf> {
        self.embeddings_file
            .as_ref()
            .map(|file| self.resources_dir.join(file))
    }

    pub fn checkpoint_dir(&self, model_name: &str) -> PathBuf {
        self.resources_dir.join(format!("{model_name}_model"))
    }

    pub fn metrics_path(&self, model_name: &str) -> PathBuf {
        self.resources_dir.join("runs").join(format!("{model_name}.jsonl"))
    }

    pub fn report_path(&self, model_name: &str) -> PathBuf {
        self.resources_dir.join(format!("{model_name}_report.json"))
    }

    pub fn training_config(&self, model_name: &str) -> TrainingConfig {
        let mut config = TrainingConfig::for_kind(self.model, self.epochs);
        config.learning_rate = self.learning_rate;
        config.shuffle_seed = self.shuffle.then_some(self.seed);
        config.checkpoint_dir = Some(self.checkpoint_dir(model_name));
        config
    }
}

/// `ReduceLROnPlateau` settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    /// Relative improvement needed to count as better.
    pub threshold: f64,
    pub min_lr: f64,
    /// Reductions smaller than this are ignored.
    pub eps: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.1,
            patience: 2,
            threshold: 1e-4,
            min_lr: 0.0,
            eps: 1e-8,
        }
    }
}

/// Knobs of the training loop itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Global L2 norm the gradients are clipped to before every step.
    pub clip_norm: f64,
    /// Early-stopping patience in epochs.
    pub patience: usize,
    pub plateau: Option<PlateauConfig>,
    /// Shuffle the training examples every epoch with this seed.
    pub shuffle_seed: Option<u64>,
    /// Where the best model is saved; nothing is saved when unset.
    pub checkpoint_dir: Option<PathBuf>,
}

impl TrainingConfig {
    /// Baseline: patience 5, fixed learning rate.
    /// CRF: patience 10, learning rate reduced on plateau.
    pub fn for_kind(kind: ModelKind, epochs: usize) -> Self {
        let (patience, plateau) = match kind {
            ModelKind::Baseline => (5, None),
            ModelKind::Crf => (10, Some(PlateauConfig::default())),
        };
        Self {
            epochs,
            learning_rate: DEFAULT_LEARNING_RATE,
            clip_norm: DEFAULT_CLIP_NORM,
            patience,
            plateau,
            shuffle_seed: None,
            checkpoint_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reproduce_reference_run() {
        let config = RunConfig::default();
        assert_eq!(config.seed, 1873337);
        assert_eq!(config.max_len, 80);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.epochs, 1);
        assert_eq!(config.model, ModelKind::Crf);
        assert_eq!(config.embedding_dim, 300);
        assert_eq!(config.train_path(), PathBuf::from("data/train.tsv"));
        assert_eq!(
            config.embeddings_path(),
            Some(PathBuf::from("resources/wiki.en.vec"))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{"model": "baseline", "epochs": 3}"#).unwrap();
        assert_eq!(config.model, ModelKind::Baseline);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_presets_per_kind() {
        let baseline = TrainingConfig::for_kind(ModelKind::Baseline, 4);
        assert_eq!(baseline.patience, 5);
        assert!(baseline.plateau.is_none());

        let crf = TrainingConfig::for_kind(ModelKind::Crf, 4);
        assert_eq!(crf.patience, 10);
        assert_eq!(crf.plateau, Some(PlateauConfig::default()));
        assert_eq!(crf.clip_norm, 5.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RunConfig {
            batch_size: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
