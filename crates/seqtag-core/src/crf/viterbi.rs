//! # Viterbi Decoding for CRF
//!
//! Finds the highest-scoring tag sequence given emission scores, a learned
//! transition matrix and start/end scores.

use crate::error::{Result, TaggerError};

/// Transition scores of a linear-chain CRF, host side.
#[derive(Debug, Clone)]
pub struct TransitionScores {
    /// `[num_tags][num_tags]`, indexed `[prev][curr]`.
    pub transitions: Vec<Vec<f32>>,
    /// Score of starting in each tag.
    pub start: Vec<f32>,
    /// Score of ending in each tag.
    pub end: Vec<f32>,
}

impl TransitionScores {
    /// Scores that prefer nothing; decoding reduces to per-position arg-max.
    pub fn uniform(num_tags: usize) -> Self {
        Self {
            transitions: vec![vec![0.0; num_tags]; num_tags],
            start: vec![0.0; num_tags],
            end: vec![0.0; num_tags],
        }
    }

    pub fn num_tags(&self) -> usize {
        self.start.len()
    }
}

/// Viterbi decoder for CRF tag sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
}

impl ViterbiDecoder {
    /// Create a new Viterbi decoder.
    ///
    /// # Arguments
    /// * `num_tags` - Number of distinct tags
    pub fn new(num_tags: usize) -> Self {
        Self { num_tags }
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Decode the optimal tag sequence using the Viterbi algorithm.
    ///
    /// # Arguments
    /// * `emission_scores` - `[seq_len][num_tags]` emission scores
    /// * `scores` - transition, start and end scores
    ///
    /// # Returns
    /// The optimal tag sequence as indices, one per position.
    pub fn decode(&self, emission_scores: &[Vec<f32>], scores: &TransitionScores) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }
        self.validate(emission_scores, scores)?;

        // DP table and back-pointers: [seq_len][num_tags]
        let mut dp = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr = vec![vec![0usize; self.num_tags]; seq_len];

        for tag in 0..self.num_tags {
            dp[0][tag] = scores.start[tag] + emission_scores[0][tag];
        }

        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev_tag in 0..self.num_tags {
                    let score = dp[pos - 1][prev_tag] + scores.transitions[prev_tag][curr_tag];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_tag;
                    }
                }

                dp[pos][curr_tag] = best_score + emission_scores[pos][curr_tag];
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Best final tag, end scores included
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            let score = dp[seq_len - 1][tag] + scores.end[tag];
            if score > best_final_score {
                best_final_score = score;
                best_final_tag = tag;
            }
        }

        // Backtrack
        let mut path = Vec::with_capacity(seq_len);
        path.push(best_final_tag);
        let mut curr_tag = best_final_tag;
        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag];
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }

    fn validate(&self, emission_scores: &[Vec<f32>], scores: &TransitionScores) -> Result<()> {
        if let Some(row) = emission_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(TaggerError::Shape(format!(
                "emission score dimension mismatch: expected {}, got {}",
                self.num_tags,
                row.len()
            )));
        }
        if scores.num_tags() != self.num_tags
            || scores.end.len() != self.num_tags
            || scores.transitions.len() != self.num_tags
            || scores.transitions.iter().any(|row| row.len() != self.num_tags)
        {
            return Err(TaggerError::Shape(format!(
                "transition scores do not describe {} tags",
                self.num_tags
            )));
        }
        Ok(())
    }
}

/// Score of one fixed path, used to check decoders against brute force.
pub fn path_score(emission_scores: &[Vec<f32>], scores: &TransitionScores, path: &[usize]) -> f32 {
    let Some((&first, _)) = path.split_first() else {
        return 0.0;
    };
    let mut total = scores.start[first] + emission_scores[0][first];
    for pos in 1..path.len() {
        total += scores.transitions[path[pos - 1]][path[pos]] + emission_scores[pos][path[pos]];
    }
    total + scores.end[path[path.len() - 1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_paths(num_tags: usize, len: usize) -> Vec<Vec<usize>> {
        let mut paths = vec![vec![]];
        for _ in 0..len {
            paths = paths
                .into_iter()
                .flat_map(|p| {
                    (0..num_tags).map(move |t| {
                        let mut next = p.clone();
                        next.push(t);
                        next
                    })
                })
                .collect();
        }
        paths
    }

    #[test]
    fn test_viterbi_empty() {
        let decoder = ViterbiDecoder::new(3);
        let result = decoder.decode(&[], &TransitionScores::uniform(3)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_uniform_transitions_reduce_to_argmax() {
        let decoder = ViterbiDecoder::new(3);
        let emissions = vec![vec![0.1, 0.8, 0.1], vec![0.8, 0.1, 0.1], vec![0.0, 0.1, 0.9]];
        let path = decoder.decode(&emissions, &TransitionScores::uniform(3)).unwrap();
        assert_eq!(path, vec![1, 0, 2]);
    }

    #[test]
    fn test_transitions_override_emissions() {
        let decoder = ViterbiDecoder::new(2);
        let mut scores = TransitionScores::uniform(2);
        // 0 -> 1 is heavily penalised
        scores.transitions[0][1] = -10.0;
        let emissions = vec![vec![1.0, 0.0], vec![0.0, 0.5]];
        let path = decoder.decode(&emissions, &scores).unwrap();
        assert_eq!(path, vec![0, 0]);
    }

    #[test]
    fn test_matches_brute_force() {
        let decoder = ViterbiDecoder::new(3);
        let scores = TransitionScores {
            transitions: vec![
                vec![0.2, -0.3, 0.5],
                vec![-0.1, 0.4, -0.6],
                vec![0.3, 0.1, -0.2],
            ],
            start: vec![0.1, -0.2, 0.05],
            end: vec![-0.3, 0.2, 0.0],
        };
        let emissions = vec![
            vec![0.3, 0.9, -0.4],
            vec![1.1, -0.5, 0.2],
            vec![-0.7, 0.4, 0.6],
            vec![0.2, 0.2, 0.1],
        ];

        // Several paths can tie, so compare scores rather than paths.
        let best = all_paths(3, emissions.len())
            .iter()
            .map(|path| path_score(&emissions, &scores, path))
            .fold(f32::NEG_INFINITY, f32::max);

        let decoded = decoder.decode(&emissions, &scores).unwrap();
        assert_eq!(decoded.len(), emissions.len());
        assert!((path_score(&emissions, &scores, &decoded) - best).abs() < 1e-5);
    }

    #[test]
    fn test_unique_best_path_is_found() {
        let decoder = ViterbiDecoder::new(2);
        let mut scores = TransitionScores::uniform(2);
        scores.transitions[1][0] = 2.0;
        scores.end = vec![0.5, -0.5];
        let emissions = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.25, 0.0]];

        // [1, 0, 0] scores 1 + 2 + 1 + 0.25 + 0.5 = 4.75, strictly above the rest
        let decoded = decoder.decode(&emissions, &scores).unwrap();
        assert_eq!(decoded, vec![1, 0, 0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let decoder = ViterbiDecoder::new(3);
        let emissions = vec![vec![1.0, 0.0]];
        assert!(decoder.decode(&emissions, &TransitionScores::uniform(3)).is_err());
    }
}
