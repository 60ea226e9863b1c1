//! Pretrained word vectors in the plain text format
//! (`token v1 v2 ... vd`, one token per line).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use crate::data::vocab::Vocabulary;
use crate::error::{Result, TaggerError};

/// Read the vectors of every token in `vocab` that appears in the file.
///
/// Lines whose component count is not `dim` (such as the `count dim` header
/// some exporters write) are skipped.
pub fn read_word_vectors<R: BufRead>(
    mut reader: R,
    vocab: &Vocabulary,
    dim: usize,
) -> Result<HashMap<u32, Vec<f32>>> {
    let mut vectors = HashMap::new();
    let mut skipped = 0usize;

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        // Vector dumps scraped from the web carry stray non-UTF-8 bytes.
        let line = String::from_utf8_lossy(&buf);
        let mut parts = line.trim_end().split(' ');
        let Some(word) = parts.next() else {
            continue;
        };
        let Some(id) = vocab.id(word) else {
            continue;
        };
        let values: std::result::Result<Vec<f32>, _> = parts.map(str::parse::<f32>).collect();
        match values {
            Ok(values) if values.len() == dim => {
                vectors.insert(id, values);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, dim, "skipped word vectors with the wrong dimension");
    }
    Ok(vectors)
}

/// Build a `(vocab_size, dim)` embedding matrix.
///
/// Rows found in `vectors` are copied, the rest are drawn from N(0, 1) with a
/// seeded generator, and reserved ids (`<PAD>`, `<UNK>`, `<BOS>`, `<EOS>`) are
/// zero.
pub fn build_embedding_matrix(
    vectors: &HashMap<u32, Vec<f32>>,
    vocab: &Vocabulary,
    dim: usize,
    seed: u64,
    device: &Device,
) -> Result<Tensor> {
    if dim == 0 {
        return Err(TaggerError::Config("embedding dimension must be positive".into()));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, 1.0).map_err(|e| TaggerError::Config(e.to_string()))?;
    let reserved = vocab.reserved_ids();
    let mut data = Vec::with_capacity(vocab.len() * dim);

    for (id, _) in vocab.iter() {
        if reserved.contains(&id) {
            data.extend(std::iter::repeat_n(0.0f32, dim));
        } else if let Some(vector) = vectors.get(&id) {
            data.extend_from_slice(vector);
        } else {
            data.extend(normal.sample_iter(&mut rng).take(dim));
        }
    }

    Ok(Tensor::from_vec(data, (vocab.len(), dim), device)?)
}

/// Load a word-vector file and turn it into an embedding matrix for `vocab`.
pub fn load_pretrained_embeddings<P: AsRef<Path>>(
    path: P,
    vocab: &Vocabulary,
    dim: usize,
    seed: u64,
    device: &Device,
) -> Result<Tensor> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let vectors = read_word_vectors(reader, vocab, dim)?;
    info!(
        path = %path.display(),
        loaded = vectors.len(),
        random = vocab.len() - vectors.len(),
        "initialised embeddings from pretrained vectors"
    );
    build_embedding_matrix(&vectors, vocab, dim, seed, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab::ReservedTokens;

    fn vocab() -> Vocabulary {
        Vocabulary::build(
            ["the", "cat", "zebra"],
            ReservedTokens {
                unknown: true,
                boundary_markers: true,
            },
        )
    }

    const VECTORS: &str = "3 2\nthe 0.5 -0.5\ncat 1.0 2.0\nbad 1.0\ndog 3.0 3.0\n";

    #[test]
    fn test_reads_only_vocabulary_tokens() {
        let vocab = vocab();
        let vectors = read_word_vectors(VECTORS.as_bytes(), &vocab, 2).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[&vocab.id("cat").unwrap()], vec![1.0, 2.0]);
    }

    #[test]
    fn test_matrix_rows() {
        let vocab = vocab();
        let vectors = read_word_vectors(VECTORS.as_bytes(), &vocab, 2).unwrap();
        let matrix = build_embedding_matrix(&vectors, &vocab, 2, 7, &Device::Cpu).unwrap();
        assert_eq!(matrix.dims(), &[vocab.len(), 2]);

        let rows = matrix.to_vec2::<f32>().unwrap();
        for id in vocab.reserved_ids() {
            assert_eq!(rows[id as usize], vec![0.0, 0.0]);
        }
        assert_eq!(rows[vocab.id("the").unwrap() as usize], vec![0.5, -0.5]);
        let zebra = &rows[vocab.id("zebra").unwrap() as usize];
        assert!(zebra.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_invalid_utf8_line_does_not_abort_the_load() {
        let vocab = vocab();
        let mut input = b"the 0.1 0.2\ncaf".to_vec();
        input.push(0xe9);
        input.extend_from_slice(b" 0.3 0.4\ncat 0.5 0.6\n");

        let vectors = read_word_vectors(input.as_slice(), &vocab, 2).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[&vocab.id("the").unwrap()], vec![0.1, 0.2]);
        assert_eq!(vectors[&vocab.id("cat").unwrap()], vec![0.5, 0.6]);
    }

    #[test]
    fn test_random_rows_look_standard_normal() {
        let vocab = Vocabulary::build(
            ["w"],
            ReservedTokens {
                unknown: false,
                boundary_markers: false,
            },
        );
        let matrix = build_embedding_matrix(&HashMap::new(), &vocab, 4000, 3, &Device::Cpu).unwrap();
        let row = &matrix.to_vec2::<f32>().unwrap()[vocab.id("w").unwrap() as usize];
        let mean = row.iter().sum::<f32>() / row.len() as f32;
        let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / row.len() as f32;
        assert!(mean.abs() < 0.1, "mean {mean}");
        assert!((var - 1.0).abs() < 0.15, "variance {var}");
    }

    #[test]
    fn test_seed_makes_random_rows_reproducible() {
        let vocab = vocab();
        let empty = HashMap::new();
        let a = build_embedding_matrix(&empty, &vocab, 4, 1873337, &Device::Cpu).unwrap();
        let b = build_embedding_matrix(&empty, &vocab, 4, 1873337, &Device::Cpu).unwrap();
        assert_eq!(a.to_vec2::<f32>().unwrap(), b.to_vec2::<f32>().unwrap());
    }
}
