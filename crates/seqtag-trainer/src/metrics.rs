//! Scalar metrics written once per epoch.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const TRAIN_LOSS: &str = "train/loss";
pub const VALID_LOSS: &str = "valid/val_loss";
pub const VALID_ACCURACY: &str = "valid/val_accuracy";
pub const LEARNING_RATE: &str = "train/learning_rate";

/// One `(step, tag, value)` sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub step: usize,
    pub tag: String,
    pub value: f64,
}

/// Destination for training curves.
pub trait MetricsSink {
    fn add_scalar(&mut self, step: usize, tag: &str, value: f64) -> Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonlMetricsWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlMetricsWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("failed to create metrics file {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonlMetricsWriter {
    fn add_scalar(&mut self, step: usize, tag: &str, value: f64) -> Result<()> {
        let record = ScalarRecord {
            step,
            tag: tag.to_string(),
            value,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every sample in memory.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    pub records: Vec<ScalarRecord>,
}

impl MemoryMetrics {
    pub fn values(&self, tag: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| r.value)
            .collect()
    }
}

impl MetricsSink for MemoryMetrics {
    fn add_scalar(&mut self, step: usize, tag: &str, value: f64) -> Result<()> {
        self.records.push(ScalarRecord {
            step,
            tag: tag.to_string(),
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("crf.jsonl");
        let mut writer = JsonlMetricsWriter::create(&path).unwrap();
        writer.add_scalar(1, TRAIN_LOSS, 2.5).unwrap();
        writer.add_scalar(1, VALID_LOSS, 3.0).unwrap();

        let contents = fs::read_to_string(writer.path()).unwrap();
        let records: Vec<ScalarRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tag, "valid/val_loss");
        assert_eq!(records[1].value, 3.0);
    }

    #[test]
    fn test_memory_metrics_filters_by_tag() {
        let mut metrics = MemoryMetrics::default();
        metrics.add_scalar(1, TRAIN_LOSS, 1.0).unwrap();
        metrics.add_scalar(1, VALID_LOSS, 2.0).unwrap();
        metrics.add_scalar(2, TRAIN_LOSS, 0.5).unwrap();
        assert_eq!(metrics.values(TRAIN_LOSS), vec![1.0, 0.5]);
    }
}
