//! Training loop shared by both tagger variants.

use std::path::PathBuf;

use anyhow::{Result, bail};
use candle_core::Var;
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use seqtag_core::{Batch, EncodedDataset, EncodedExample, SequenceTagger, Tagger, Vocabularies};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checkpoint::save_checkpoint;
use crate::clipping::clip_grad_norm;
use crate::config::TrainingConfig;
use crate::early_stopping::EarlyStopping;
use crate::evaluator::evaluate;
use crate::metrics::{LEARNING_RATE, MetricsSink, TRAIN_LOSS, VALID_ACCURACY, VALID_LOSS};
use crate::scheduler::ReduceLrOnPlateau;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Token accuracy on the validation split, reserved labels excluded.
    pub val_accuracy: f64,
    pub learning_rate: f64,
}

/// Outcome of one [`Trainer::train`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub history: Vec<EpochRecord>,
    pub epochs_run: usize,
    /// Mean of the per-epoch training losses.
    pub avg_train_loss: f64,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub best_checkpoint: Option<PathBuf>,
}

pub struct Trainer {
    tagger: Tagger,
    vocabularies: Vocabularies,
    config: TrainingConfig,
    params: Vec<Var>,
    optimizer: AdamW,
    early_stopping: EarlyStopping,
    scheduler: Option<ReduceLrOnPlateau>,
    rng: Option<oorandom::Rand32>,
}

impl Trainer {
    pub fn new(tagger: Tagger, vocabularies: Vocabularies, config: TrainingConfig) -> Result<Self> {
        let params = tagger.trainable_vars();
        let optimizer = AdamW::new(
            params.clone(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        Ok(Self {
            early_stopping: EarlyStopping::new(config.patience),
            scheduler: config.plateau.map(ReduceLrOnPlateau::new),
            rng: config.shuffle_seed.map(oorandom::Rand32::new),
            tagger,
            vocabularies,
            config,
            params,
            optimizer,
        })
    }

    pub fn tagger(&self) -> &Tagger {
        &self.tagger
    }

    pub fn into_tagger(self) -> Tagger {
        self.tagger
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Run up to `config.epochs` epochs, stopping early when the validation
    /// loss stalls.
    pub fn train(
        &mut self,
        train: &EncodedDataset,
        valid: &EncodedDataset,
        sink: &mut dyn MetricsSink,
    ) -> Result<TrainingReport> {
        if train.is_empty() {
            bail!("training set is empty");
        }
        if valid.is_empty() {
            bail!("validation set is empty");
        }

        let epochs = self.config.epochs;
        let batch_size = self.tagger.hparams().batch_size;
        info!(
            model = %self.tagger.hparams().model_name,
            epochs,
            batch_size,
            train_examples = train.len(),
            valid_examples = valid.len(),
            "training"
        );

        let mut history = Vec::with_capacity(epochs);
        let mut best_val_loss = f64::INFINITY;
        let mut best_checkpoint = None;
        let mut stopped_early = false;

        for epoch in 1..=epochs {
            let train_loss = self.train_epoch(train, epoch)?;
            let val_loss = self.evaluate_loss(valid)?;
            let val_accuracy =
                evaluate(&self.tagger, valid, &self.vocabularies, batch_size)?.accuracy;
            let learning_rate = self.optimizer.learning_rate();

            info!(
                "Epoch {epoch}/{epochs} train_loss = {train_loss:.4} val_loss = {val_loss:.4} val_acc = {val_accuracy:.4} lr = {learning_rate:.2e}"
            );
            sink.add_scalar(epoch, TRAIN_LOSS, train_loss)?;
            sink.add_scalar(epoch, VALID_LOSS, val_loss)?;
            sink.add_scalar(epoch, VALID_ACCURACY, val_accuracy)?;
            sink.add_scalar(epoch, LEARNING_RATE, learning_rate)?;

            history.push(EpochRecord {
                epoch,
                train_loss,
                val_loss,
                val_accuracy,
                learning_rate,
            });

            if let Some(scheduler) = self.scheduler.as_mut() {
                if let Some(lr) = scheduler.step(val_loss, learning_rate) {
                    info!("reducing learning rate to {lr:.2e}");
                    self.optimizer.set_learning_rate(lr);
                }
            }

            if val_loss <= best_val_loss {
                best_val_loss = val_loss;
                if let Some(dir) = &self.config.checkpoint_dir {
                    best_checkpoint = Some(save_checkpoint(
                        dir,
                        &self.tagger,
                        &self.vocabularies,
                        epoch,
                        best_val_loss,
                    )?);
                }
            }

            if self.early_stopping.step(val_loss) {
                info!(
                    "early stopping after {epoch} epochs, best val_loss = {best_val_loss:.4}"
                );
                stopped_early = true;
                break;
            }
        }

        let epochs_run = history.len();
        let avg_train_loss =
            history.iter().map(|r| r.train_loss).sum::<f64>() / epochs_run as f64;

        Ok(TrainingReport {
            history,
            epochs_run,
            avg_train_loss,
            best_val_loss,
            stopped_early,
            best_checkpoint,
        })
    }

    /// One pass over `data`; returns the mean batch loss.
    fn train_epoch(&mut self, data: &EncodedDataset, epoch: usize) -> Result<f64> {
        let batch_size = self.tagger.hparams().batch_size;
        let examples = self.epoch_order(&data.examples);
        let num_batches = examples.len().div_ceil(batch_size);
        let device = self.tagger.device().clone();

        let mut total = 0f64;
        for (step, chunk) in examples.chunks(batch_size).enumerate() {
            let batch = Batch::from_examples(chunk, &device)?;
            let loss = self.tagger.compute_loss(&batch, true)?;
            let mut grads = loss.backward()?;
            let norm = clip_grad_norm(&mut grads, &self.params, self.config.clip_norm)?;
            self.optimizer.step(&grads)?;

            let loss = loss.to_scalar::<f32>()? as f64;
            debug!(epoch, step, loss, grad_norm = norm, "batch");
            total += loss;

            if (step + 1) % 100 == 0 {
                info!(
                    "Epoch {epoch}, step {}/{num_batches}, avg loss = {:.4}",
                    step + 1,
                    total / (step + 1) as f64
                );
            }
        }

        Ok(total / num_batches as f64)
    }

    /// Mean batch loss with dropout disabled.
    pub fn evaluate_loss(&self, data: &EncodedDataset) -> Result<f64> {
        if data.is_empty() {
            bail!("cannot evaluate on an empty dataset");
        }
        let batch_size = self.tagger.hparams().batch_size;
        let mut total = 0f64;
        for chunk in data.batches(batch_size) {
            let batch = Batch::from_examples(chunk, self.tagger.device())?;
            total += self.tagger.compute_loss(&batch, false)?.to_scalar::<f32>()? as f64;
        }
        Ok(total / data.num_batches(batch_size) as f64)
    }

    fn epoch_order(&mut self, examples: &[EncodedExample]) -> Vec<EncodedExample> {
        let mut ordered = examples.to_vec();
        if let Some(rng) = self.rng.as_mut() {
            for i in (1..ordered.len()).rev() {
                let j = rng.rand_range(0..(i as u32 + 1)) as usize;
                ordered.swap(i, j);
            }
        }
        ordered
    }
}
