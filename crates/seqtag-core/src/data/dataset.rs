//! Loading of TSV tagged text.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TaggerError};

/// One sentence: tokens and their gold labels, equal length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSentence {
    pub tokens: Vec<String>,
    pub labels: Vec<String>,
}

impl TaggedSentence {
    pub fn new(tokens: Vec<String>, labels: Vec<String>) -> Self {
        Self { tokens, labels }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// A split (train/dev/test) of tagged sentences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsvDataset {
    pub sentences: Vec<TaggedSentence>,
}

impl TsvDataset {
    pub fn new(sentences: Vec<TaggedSentence>) -> Self {
        Self { sentences }
    }

    /// Load a dataset from a TSV file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dataset = Self::from_reader(BufReader::new(file), path)?;
        debug!(
            path = %path.display(),
            sentences = dataset.len(),
            tokens = dataset.num_tokens(),
            "loaded TSV split"
        );
        Ok(dataset)
    }

    /// Parse an in-memory TSV string.
    pub fn parse_str(input: &str) -> Result<Self> {
        Self::from_reader(input.as_bytes(), Path::new("<memory>"))
    }

    /// Parse records from any buffered reader.
    ///
    /// Each record is `token<TAB>label`; extra leading columns (such as a
    /// position index) are ignored, the label is the last column and the
    /// token the one before it. Blank lines end a sentence and `#` lines are
    /// comments.
    pub fn from_reader<R: BufRead>(reader: R, source: &Path) -> Result<Self> {
        let mut sentences = Vec::new();
        let mut tokens = Vec::new();
        let mut labels = Vec::new();

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);

            if line.trim().is_empty() {
                if !tokens.is_empty() {
                    sentences.push(TaggedSentence::new(
                        std::mem::take(&mut tokens),
                        std::mem::take(&mut labels),
                    ));
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < 2 {
                return Err(TaggerError::MalformedRecord {
                    path: PathBuf::from(source),
                    line: line_idx + 1,
                    reason: "expected at least two tab-separated columns".into(),
                });
            }

            let label = columns[columns.len() - 1].trim();
            let token = columns[columns.len() - 2].trim();
            if token.is_empty() || label.is_empty() {
                return Err(TaggerError::MalformedRecord {
                    path: PathBuf::from(source),
                    line: line_idx + 1,
                    reason: "empty token or label".into(),
                });
            }

            tokens.push(token.to_string());
            labels.push(label.to_string());
        }

        if !tokens.is_empty() {
            sentences.push(TaggedSentence::new(tokens, labels));
        }

        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Total number of tokens over all sentences.
    pub fn num_tokens(&self) -> usize {
        self.sentences.iter().map(TaggedSentence::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentences_split_on_blank_lines() {
        let input = "The\tDET\ncat\tNOUN\n\nIt\tPRON\nsat\tVERB\n";
        let dataset = TsvDataset::parse_str(input).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.sentences[0].tokens, vec!["The", "cat"]);
        assert_eq!(dataset.sentences[1].labels, vec!["PRON", "VERB"]);
        assert_eq!(dataset.num_tokens(), 4);
    }

    #[test]
    fn test_comments_and_index_column() {
        let input = "# id 0\n0\tRoyal\tB-ORG\n1\tMail\tI-ORG\n\n\n# id 1\n0\tHi\tO";
        let dataset = TsvDataset::parse_str(input).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.sentences[0].tokens, vec!["Royal", "Mail"]);
        assert_eq!(dataset.sentences[0].labels, vec!["B-ORG", "I-ORG"]);
        assert_eq!(dataset.sentences[1].tokens, vec!["Hi"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let dataset = TsvDataset::parse_str("a\tX\r\nb\tY\r\n\r\n").unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.sentences[0].labels, vec!["X", "Y"]);
    }

    #[test]
    fn test_single_column_is_malformed() {
        let err = TsvDataset::parse_str("ok\tO\nbroken\n").unwrap_err();
        match err {
            TaggerError::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = TsvDataset::from_path("/definitely/not/here.tsv").unwrap_err();
        assert!(matches!(err, TaggerError::Io(_)));
    }
}
