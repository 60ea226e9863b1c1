use std::fs;

use candle_core::Device;
use seqtag_core::{
    DatasetParser, EncodedDataset, EncodingConfig, HyperParameters, ModelKind, SequenceTagger,
    Tagger, TsvDataset, Vocabularies,
};
use seqtag_trainer::metrics::{TRAIN_LOSS, VALID_ACCURACY, VALID_LOSS};
use seqtag_trainer::{
    MemoryMetrics, RunConfig, Trainer, TrainingConfig, evaluate, load_checkpoint, run_training,
};
use tempfile::tempdir;

const TRAIN: &str = "The\tDET\ncat\tNOUN\nsat\tVERB\n\nA\tDET\ndog\tNOUN\nran\tVERB\nhome\tNOUN\n";
const DEV: &str = "The\tDET\ndog\tNOUN\nsat\tVERB\n";

fn prepare(kind: ModelKind) -> (Vocabularies, EncodedDataset, EncodedDataset) {
    let train = TsvDataset::parse_str(TRAIN).unwrap();
    let dev = TsvDataset::parse_str(DEV).unwrap();
    let mut parser =
        DatasetParser::new(EncodingConfig::new(8, kind.uses_boundary_markers()).unwrap());
    let vocabs = parser.build_vocabularies(&train).clone();
    let train = parser.encode(&train).unwrap();
    let dev = parser.encode(&dev).unwrap();
    (vocabs, train, dev)
}

fn small_tagger(kind: ModelKind, vocabs: &Vocabularies) -> Tagger {
    let hparams = HyperParameters::new(kind, vocabs, None, 2)
        .unwrap()
        .with_embedding_dim(8)
        .with_encoder(6, 1, true)
        .with_dropout(0.0);
    Tagger::new(hparams, &Device::Cpu).unwrap()
}

#[test]
fn one_epoch_gives_finite_losses() {
    for kind in [ModelKind::Baseline, ModelKind::Crf] {
        let (vocabs, train, dev) = prepare(kind);
        let tagger = small_tagger(kind, &vocabs);
        let config = TrainingConfig::for_kind(kind, 1);
        let mut trainer = Trainer::new(tagger, vocabs, config).unwrap();
        let mut metrics = MemoryMetrics::default();

        let report = trainer.train(&train, &dev, &mut metrics).unwrap();
        assert_eq!(report.epochs_run, 1);
        assert!(!report.stopped_early);
        assert!(report.avg_train_loss.is_finite(), "{kind}");
        assert!(report.best_val_loss.is_finite(), "{kind}");
        assert_eq!(metrics.values(TRAIN_LOSS).len(), 1);
        assert_eq!(metrics.values(VALID_LOSS), vec![report.history[0].val_loss]);
        let accuracy = report.history[0].val_accuracy;
        assert!((0.0..=1.0).contains(&accuracy), "{kind}: accuracy {accuracy}");
        assert_eq!(metrics.values(VALID_ACCURACY), vec![accuracy]);
        assert!(report.best_checkpoint.is_none());
    }
}

#[test]
fn training_lowers_the_loss() {
    let (vocabs, train, _) = prepare(ModelKind::Crf);
    let tagger = small_tagger(ModelKind::Crf, &vocabs);
    let mut config = TrainingConfig::for_kind(ModelKind::Crf, 30);
    config.learning_rate = 0.05;
    let mut trainer = Trainer::new(tagger, vocabs, config).unwrap();

    let before = trainer.evaluate_loss(&train).unwrap();
    let report = trainer
        .train(&train, &train, &mut MemoryMetrics::default())
        .unwrap();
    assert!(report.best_val_loss < before);
}

#[test]
fn early_stopping_fires_when_validation_never_improves() {
    let (vocabs, train, _) = prepare(ModelKind::Baseline);
    let tagger = small_tagger(ModelKind::Baseline, &vocabs);
    let mut config = TrainingConfig::for_kind(ModelKind::Baseline, 50);
    config.patience = 2;
    // With a zero learning rate every validation loss is identical, which
    // never counts as an improvement.
    config.learning_rate = 0.0;
    let mut trainer = Trainer::new(tagger, vocabs, config).unwrap();

    let report = trainer
        .train(&train, &train, &mut MemoryMetrics::default())
        .unwrap();
    assert!(report.stopped_early);
    assert_eq!(report.epochs_run, 3);
    assert!(report.epochs_run < 50);
}

#[test]
fn best_model_is_checkpointed_and_reloads() {
    let dir = tempdir().unwrap();
    let (vocabs, train, dev) = prepare(ModelKind::Crf);
    let tagger = small_tagger(ModelKind::Crf, &vocabs);
    let mut config = TrainingConfig::for_kind(ModelKind::Crf, 1);
    config.checkpoint_dir = Some(dir.path().join("CRF_BiLSTM_model"));
    let mut trainer = Trainer::new(tagger, vocabs.clone(), config).unwrap();

    let report = trainer
        .train(&train, &dev, &mut MemoryMetrics::default())
        .unwrap();
    let saved = report.best_checkpoint.clone().unwrap();
    assert!(saved.join("model.safetensors").exists());
    assert!(saved.join("manifest.json").exists());

    let (restored, manifest) = load_checkpoint(&saved, &Device::Cpu).unwrap();
    assert_eq!(manifest.epoch, 1);
    assert_eq!(manifest.kind, ModelKind::Crf);
    assert_eq!(manifest.vocabularies, vocabs);
    assert_eq!(manifest.best_val_loss, report.best_val_loss);

    let trained = trainer.into_tagger();
    let batch = seqtag_core::Batch::from_examples(&dev.examples, &Device::Cpu).unwrap();
    assert_eq!(trained.decode(&batch).unwrap(), restored.decode(&batch).unwrap());
}

#[test]
fn zero_batch_size_is_rejected_before_training() {
    let (vocabs, _, _) = prepare(ModelKind::Baseline);
    assert!(HyperParameters::new(ModelKind::Baseline, &vocabs, None, 0).is_err());

    let dir = tempdir().unwrap();
    let config = RunConfig {
        data_dir: dir.path().join("data"),
        resources_dir: dir.path().join("resources"),
        batch_size: 0,
        ..RunConfig::default()
    };
    assert!(run_training(config).is_err());
}

#[test]
fn missing_checkpoint_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(load_checkpoint(dir.path().join("nothing-here"), &Device::Cpu).is_err());
}

#[test]
fn evaluation_scores_every_real_token() {
    let (vocabs, train, dev) = prepare(ModelKind::Crf);
    let tagger = small_tagger(ModelKind::Crf, &vocabs);
    let report = evaluate(&tagger, &dev, &vocabs, 2).unwrap();
    // <BOS>/<EOS> are not scored, so only the three words count.
    assert_eq!(report.num_tokens, 3);
    assert!((0.0..=1.0).contains(&report.accuracy));

    let report = evaluate(&tagger, &train, &vocabs, 1).unwrap();
    assert_eq!(report.num_tokens, 7);
}

#[test]
fn pipeline_runs_end_to_end() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("train.tsv"), TRAIN).unwrap();
    fs::write(data_dir.join("dev.tsv"), DEV).unwrap();
    fs::write(data_dir.join("test.tsv"), DEV).unwrap();

    let resources = dir.path().join("resources");
    fs::create_dir_all(&resources).unwrap();
    fs::write(
        resources.join("vectors.txt"),
        "3 4\nthe 0.1 0.2 0.3 0.4\ncat 0.5 0.6 0.7 0.8\ndog 1 1 1 1\n",
    )
    .unwrap();

    let config = RunConfig {
        data_dir,
        resources_dir: resources.clone(),
        embeddings_file: Some("vectors.txt".into()),
        model: ModelKind::Crf,
        max_len: 8,
        batch_size: 2,
        epochs: 2,
        embedding_dim: 4,
        hidden_dim: 4,
        num_layers: 1,
        shuffle: true,
        use_gpu: false,
        ..RunConfig::default()
    };

    let report = run_training(config).unwrap();
    assert_eq!(report.training.epochs_run, 2);
    assert_eq!(report.test.num_tokens, 3);
    assert!(resources.join("CRF_BiLSTM_report.json").exists());
    assert!(resources.join("runs").join("CRF_BiLSTM.jsonl").exists());
    assert!(resources.join("CRF_BiLSTM_model").join("manifest.json").exists());
}
