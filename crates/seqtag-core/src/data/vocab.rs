//! # Vocabularies
//!
//! Dense string ↔ id mappings for tokens and labels. Reserved entries always
//! occupy the lowest ids, in the order given by [`ReservedTokens`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaggerError};

/// Padding entry, always id 0.
pub const PAD: &str = "<PAD>";
/// Unknown-token entry (token vocabularies only).
pub const UNK: &str = "<UNK>";
/// Sequence start marker (CRF variant).
pub const BOS: &str = "<BOS>";
/// Sequence end marker (CRF variant).
pub const EOS: &str = "<EOS>";

/// Id of [`PAD`] in every vocabulary.
pub const PAD_ID: u32 = 0;

/// Which reserved entries a vocabulary starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedTokens {
    /// Reserve `<UNK>` right after `<PAD>`.
    pub unknown: bool,
    /// Reserve `<BOS>` and `<EOS>`.
    pub boundary_markers: bool,
}

impl ReservedTokens {
    fn entries(self) -> Vec<&'static str> {
        let mut entries = vec![PAD];
        if self.unknown {
            entries.push(UNK);
        }
        if self.boundary_markers {
            entries.push(BOS);
            entries.push(EOS);
        }
        entries
    }
}

/// Insertion-ordered mapping between strings and dense ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    id_to_token: Vec<String>,
    token_to_id: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary from the reserved entries followed by every distinct
    /// item of `items`, in first-seen order.
    pub fn build<'a, I>(items: I, reserved: ReservedTokens) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vocab = Self {
            id_to_token: Vec::new(),
            token_to_id: HashMap::new(),
        };
        for entry in reserved.entries() {
            vocab.insert(entry);
        }
        for item in items {
            vocab.insert(item);
        }
        vocab
    }

    fn insert(&mut self, token: &str) {
        if self.token_to_id.contains_key(token) {
            return;
        }
        let id = self.id_to_token.len() as u32;
        self.id_to_token.push(token.to_string());
        self.token_to_id.insert(token.to_string(), id);
    }

    /// Number of entries, reserved ones included.
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// Always false for a built vocabulary, which holds at least `<PAD>`.
    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// Exact lookup.
    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Id of `<UNK>` when this vocabulary reserves it.
    pub fn unk_id(&self) -> Option<u32> {
        self.id(UNK)
    }

    /// Id of `<BOS>` when reserved.
    pub fn bos_id(&self) -> Option<u32> {
        self.id(BOS)
    }

    /// Id of `<EOS>` when reserved.
    pub fn eos_id(&self) -> Option<u32> {
        self.id(EOS)
    }

    /// Encode a token, falling back to `<UNK>` for out-of-vocabulary input.
    ///
    /// Vocabularies without `<UNK>` fall back to `<PAD>`.
    pub fn encode_token(&self, token: &str) -> u32 {
        self.id(token)
            .or_else(|| self.unk_id())
            .unwrap_or(PAD_ID)
    }

    /// Encode a label; labels never fall back.
    pub fn encode_label(&self, label: &str) -> Result<u32> {
        self.id(label).ok_or_else(|| TaggerError::UnknownLabel {
            label: label.to_string(),
        })
    }

    /// Reverse lookup.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Ids of the reserved entries present in this vocabulary.
    pub fn reserved_ids(&self) -> Vec<u32> {
        [PAD, UNK, BOS, EOS]
            .iter()
            .filter_map(|entry| self.id(entry))
            .collect()
    }

    /// Iterate `(id, token)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (id as u32, token.as_str()))
    }
}

impl From<Vec<String>> for Vocabulary {
    fn from(id_to_token: Vec<String>) -> Self {
        let token_to_id = id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        Self {
            id_to_token,
            token_to_id,
        }
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.id_to_token
    }
}

/// Token and label vocabularies built together from the training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabularies {
    /// Input token vocabulary.
    pub tokens: Vocabulary,
    /// Output label vocabulary.
    pub labels: Vocabulary,
    /// Whether `<BOS>`/`<EOS>` were reserved (CRF variant).
    pub boundary_markers: bool,
}

impl Vocabularies {
    /// Labels a tagger should be scored on (everything but reserved entries).
    pub fn scored_labels(&self) -> Vec<u32> {
        let reserved = self.labels.reserved_ids();
        self.labels
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !reserved.contains(id))
            .collect()
    }
}
