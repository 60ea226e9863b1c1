//! Best-model checkpoints.
//!
//! A checkpoint is a directory with the parameter snapshot
//! (`model.safetensors`) and a `manifest.json` holding everything needed to
//! rebuild the tagger around it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use candle_core::Device;
use seqtag_core::{HyperParameters, ModelKind, Tagger, Vocabularies};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CHECKPOINT_VERSION: u32 = 1;
pub const MODEL_FILENAME: &str = "model.safetensors";
pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub version: u32,
    pub model_name: String,
    pub kind: ModelKind,
    pub epoch: usize,
    pub best_val_loss: f64,
    pub hparams: HyperParameters,
    pub vocabularies: Vocabularies,
}

pub fn save_checkpoint<P: AsRef<Path>>(
    dir: P,
    tagger: &Tagger,
    vocabularies: &Vocabularies,
    epoch: usize,
    best_val_loss: f64,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create checkpoint directory {}", dir.display()))?;

    tagger
        .save_weights(dir.join(MODEL_FILENAME))
        .with_context(|| format!("failed to write weights to {}", dir.display()))?;

    let manifest = CheckpointManifest {
        version: CHECKPOINT_VERSION,
        model_name: tagger.hparams().model_name.clone(),
        kind: tagger.kind(),
        epoch,
        best_val_loss,
        hparams: tagger.hparams().clone(),
        vocabularies: vocabularies.clone(),
    };
    let manifest_path = dir.join(MANIFEST_FILENAME);
    fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    info!(dir = %dir.display(), epoch, best_val_loss, "saved checkpoint");
    Ok(dir.to_path_buf())
}

/// Rebuild a tagger from a checkpoint directory.
pub fn load_checkpoint<P: AsRef<Path>>(
    dir: P,
    device: &Device,
) -> Result<(Tagger, CheckpointManifest)> {
    let dir = dir.as_ref();
    let manifest_path = dir.join(MANIFEST_FILENAME);
    let raw = fs::read(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest: CheckpointManifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
    if manifest.version != CHECKPOINT_VERSION {
        bail!(
            "unsupported checkpoint version {} in {}",
            manifest.version,
            dir.display()
        );
    }

    let mut tagger = Tagger::new(manifest.hparams.clone(), device)?;
    tagger
        .load_weights(dir.join(MODEL_FILENAME))
        .with_context(|| format!("failed to load weights from {}", dir.display()))?;

    info!(dir = %dir.display(), epoch = manifest.epoch, "loaded checkpoint");
    Ok((tagger, manifest))
}
