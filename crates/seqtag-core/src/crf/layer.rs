//! Linear-chain CRF output layer.
//!
//! The log-likelihood is built from candle tensor ops so that training can
//! back-propagate through it; decoding copies the scores to the host and runs
//! [`ViterbiDecoder`].

use candle_core::{IndexOp, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::crf::viterbi::{TransitionScores, ViterbiDecoder};
use crate::error::{Result, TaggerError};

/// Learned start, end and pairwise transition scores over `num_tags` labels.
#[derive(Debug, Clone)]
pub struct CrfLayer {
    num_tags: usize,
    start_transitions: Tensor,
    end_transitions: Tensor,
    /// `[num_tags, num_tags]`, indexed `[prev, curr]`.
    transitions: Tensor,
}

impl CrfLayer {
    pub fn new(num_tags: usize, vb: VarBuilder) -> Result<Self> {
        if num_tags == 0 {
            return Err(TaggerError::Config("CRF needs at least one tag".into()));
        }
        let init = Init::Uniform { lo: -0.1, up: 0.1 };
        Ok(Self {
            num_tags,
            start_transitions: vb.get_with_hints(num_tags, "start_transitions", init)?,
            end_transitions: vb.get_with_hints(num_tags, "end_transitions", init)?,
            transitions: vb.get_with_hints((num_tags, num_tags), "transitions", init)?,
        })
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Per-sequence log-likelihood of `tags` under `emissions`.
    ///
    /// * `emissions` - `[batch, seq_len, num_tags]` f32
    /// * `tags` - `[batch, seq_len]` u32
    /// * `mask` - `[batch, seq_len]` f32, a prefix of ones per row; the first
    ///   column must be all ones
    ///
    /// Returns a `[batch]` tensor.
    pub fn log_likelihood(&self, emissions: &Tensor, tags: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, num_tags) = emissions.dims3()?;
        if num_tags != self.num_tags {
            return Err(TaggerError::Shape(format!(
                "expected {} emission scores per position, got {num_tags}",
                self.num_tags
            )));
        }
        if tags.dims2()? != (batch, seq_len) || mask.dims2()? != (batch, seq_len) {
            return Err(TaggerError::Shape(
                "tags and mask must be [batch, seq_len] like the emissions".into(),
            ));
        }

        let tags_host = tags.to_vec2::<u32>()?;
        let lengths = mask_lengths(mask)?;

        let numerator = self.gold_score(emissions, tags, mask, &tags_host, &lengths)?;
        let denominator = self.log_partition(emissions, mask)?;
        Ok(numerator.sub(&denominator)?)
    }

    /// Score of the gold path of every sequence, `[batch]`.
    fn gold_score(
        &self,
        emissions: &Tensor,
        tags: &Tensor,
        mask: &Tensor,
        tags_host: &[Vec<u32>],
        lengths: &[usize],
    ) -> Result<Tensor> {
        let device = emissions.device();
        let (batch, seq_len, _) = emissions.dims3()?;

        let emitted = emissions
            .gather(&tags.contiguous()?.unsqueeze(2)?, 2)?
            .squeeze(2)?
            .mul(mask)?
            .sum(1)?;

        let first: Vec<u32> = tags_host.iter().map(|row| row[0]).collect();
        let last: Vec<u32> = tags_host
            .iter()
            .zip(lengths)
            .map(|(row, &len)| row[len - 1])
            .collect();
        let start = self
            .start_transitions
            .index_select(&Tensor::from_vec(first, batch, device)?, 0)?;
        let end = self
            .end_transitions
            .index_select(&Tensor::from_vec(last, batch, device)?, 0)?;

        let mut score = emitted.add(&start)?.add(&end)?;

        if seq_len > 1 {
            let num_tags = self.num_tags as u32;
            let pairs: Vec<u32> = tags_host
                .iter()
                .flat_map(|row| row.windows(2).map(move |w| w[0] * num_tags + w[1]))
                .collect();
            let pairs = Tensor::from_vec(pairs, batch * (seq_len - 1), device)?;
            let transitioned = self
                .transitions
                .flatten_all()?
                .index_select(&pairs, 0)?
                .reshape((batch, seq_len - 1))?
                .mul(&mask.narrow(1, 1, seq_len - 1)?)?
                .sum(1)?;
            score = score.add(&transitioned)?;
        }

        Ok(score)
    }

    /// Log of the sum of exp-scores over all paths (forward algorithm), `[batch]`.
    fn log_partition(&self, emissions: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (_, seq_len, _) = emissions.dims3()?;
        let transitions = self.transitions.unsqueeze(0)?;

        // score[b, t]: log-sum of all paths ending in tag t at the current position
        let mut score = self
            .start_transitions
            .unsqueeze(0)?
            .broadcast_add(&emissions.i((.., 0, ..))?)?;

        for pos in 1..seq_len {
            let next = score
                .unsqueeze(2)?
                .broadcast_add(&transitions)?
                .broadcast_add(&emissions.i((.., pos, ..))?.unsqueeze(1)?)?;
            let next = log_sum_exp(&next, 1)?;

            let step = mask.i((.., pos))?.unsqueeze(1)?;
            let hold = step.affine(-1.0, 1.0)?;
            score = next.broadcast_mul(&step)?.add(&score.broadcast_mul(&hold)?)?;
        }

        let score = score.broadcast_add(&self.end_transitions.unsqueeze(0)?)?;
        log_sum_exp(&score, 1)
    }

    /// Host copy of the learned scores.
    pub fn transition_scores(&self) -> Result<TransitionScores> {
        Ok(TransitionScores {
            transitions: self.transitions.to_vec2::<f32>()?,
            start: self.start_transitions.to_vec1::<f32>()?,
            end: self.end_transitions.to_vec1::<f32>()?,
        })
    }

    /// Best tag path of each sequence, truncated to its length.
    pub fn decode(&self, emissions: &Tensor, lengths: &[usize]) -> Result<Vec<Vec<u32>>> {
        let emissions = emissions.to_vec3::<f32>()?;
        if emissions.len() != lengths.len() {
            return Err(TaggerError::Shape(format!(
                "{} emission rows but {} lengths",
                emissions.len(),
                lengths.len()
            )));
        }
        let scores = self.transition_scores()?;
        let decoder = ViterbiDecoder::new(self.num_tags);

        emissions
            .iter()
            .zip(lengths)
            .map(|(rows, &len)| {
                let path = decoder.decode(&rows[..len.min(rows.len())], &scores)?;
                Ok(path.into_iter().map(|tag| tag as u32).collect())
            })
            .collect()
    }
}

/// Number of unmasked positions per row; rejects rows whose first position is masked.
fn mask_lengths(mask: &Tensor) -> Result<Vec<usize>> {
    mask.to_vec2::<f32>()?
        .into_iter()
        .map(|row| {
            if row.first().is_none_or(|&m| m < 0.5) {
                return Err(TaggerError::Shape(
                    "the first position of every sequence must be unmasked".into(),
                ));
            }
            Ok(row.iter().filter(|&&m| m >= 0.5).count())
        })
        .collect()
}

/// Numerically stable `log(sum(exp(xs)))` along `dim`, which is removed.
fn log_sum_exp(xs: &Tensor, dim: usize) -> Result<Tensor> {
    let max = xs.max_keepdim(dim)?;
    let summed = xs.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?.log()?;
    Ok(summed.broadcast_add(&max)?.squeeze(dim)?)
}
