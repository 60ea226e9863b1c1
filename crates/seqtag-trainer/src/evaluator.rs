//! Token-level scoring of a trained tagger on a held-out split.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use seqtag_core::{Batch, EncodedDataset, SequenceTagger, Tagger, Vocabularies};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub num_tokens: usize,
    pub per_label: Vec<LabelMetrics>,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "label", "precision", "recall", "f1", "support"
        )?;
        for m in &self.per_label {
            writeln!(
                f,
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "accuracy = {:.4} over {} tokens", self.accuracy, self.num_tokens)?;
        write!(f, "macro F1 = {:.4}", self.macro_f1)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    true_positives: usize,
    predicted: usize,
    support: usize,
}

/// Compare predicted label ids against gold ones.
///
/// Positions whose gold label is reserved (`<PAD>`, `<BOS>`, `<EOS>`) are
/// skipped. A reserved id predicted at a scored position counts as an error
/// but gets no row of its own. Per-label rows cover scored labels that were
/// either present in the gold data or predicted at least once.
pub fn score(gold: &[Vec<u32>], predicted: &[Vec<u32>], vocabularies: &Vocabularies) -> EvaluationReport {
    let scored = vocabularies.scored_labels();
    let mut counts: BTreeMap<u32, Counts> = BTreeMap::new();
    let mut correct = 0usize;
    let mut total = 0usize;

    for (gold_row, pred_row) in gold.iter().zip(predicted) {
        for (&g, &p) in gold_row.iter().zip(pred_row) {
            if !scored.contains(&g) {
                continue;
            }
            total += 1;
            counts.entry(g).or_default().support += 1;
            if scored.contains(&p) {
                counts.entry(p).or_default().predicted += 1;
            }
            if g == p {
                correct += 1;
                counts.entry(g).or_default().true_positives += 1;
            }
        }
    }

    let per_label: Vec<LabelMetrics> = counts
        .into_iter()
        .map(|(id, c)| {
            let precision = ratio(c.true_positives, c.predicted);
            let recall = ratio(c.true_positives, c.support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            LabelMetrics {
                label: vocabularies.labels.token(id).unwrap_or("?").to_string(),
                precision,
                recall,
                f1,
                support: c.support,
            }
        })
        .collect();

    let macro_f1 = if per_label.is_empty() {
        0.0
    } else {
        per_label.iter().map(|m| m.f1).sum::<f64>() / per_label.len() as f64
    };

    EvaluationReport {
        accuracy: ratio(correct, total),
        macro_f1,
        num_tokens: total,
        per_label,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Decode every batch of `data` with dropout off and score the result.
pub fn evaluate(
    tagger: &Tagger,
    data: &EncodedDataset,
    vocabularies: &Vocabularies,
    batch_size: usize,
) -> Result<EvaluationReport> {
    if batch_size == 0 {
        bail!("batch size must be positive");
    }
    let mut gold = Vec::with_capacity(data.len());
    let mut predicted = Vec::with_capacity(data.len());

    for chunk in data.batches(batch_size) {
        let batch = Batch::from_examples(chunk, tagger.device())?;
        gold.extend(batch.gold_labels()?);
        predicted.extend(tagger.decode(&batch)?);
    }

    let report = score(&gold, &predicted, vocabularies);
    info!(
        accuracy = report.accuracy,
        macro_f1 = report.macro_f1,
        tokens = report.num_tokens,
        "evaluation finished"
    );
    Ok(report)
}
