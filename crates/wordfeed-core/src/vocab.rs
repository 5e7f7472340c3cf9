use std::collections::HashMap;

use thiserror::Error;

/// Character set of the original word-image training corpus (lowercase,
/// uppercase, digits). Used by the dev tooling when no charset is supplied.
pub const DEV_CHARSET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("charset must be non-empty")]
    EmptyCharset,
    #[error("duplicate character {ch:?} in charset")]
    DuplicateCharacter { ch: char },
    #[error("character {ch:?} not in vocabulary")]
    UnknownCharacter { ch: char },
    #[error("label index {index} out of range for vocabulary of {size}")]
    IndexOutOfRange { index: i32, size: usize },
}

/// A fixed, closed, ordered set of output characters.
///
/// Read-only after construction and shared across the pipeline (typically
/// behind an `Arc`). Index order is the charset's iteration order, so two
/// vocabularies built from the same string agree on every index.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    chars: Vec<char>,
    index: HashMap<char, i32>,
}

impl Vocabulary {
    pub fn new(charset: &str) -> Result<Self, VocabularyError> {
        if charset.is_empty() {
            return Err(VocabularyError::EmptyCharset);
        }
        let mut chars = Vec::new();
        let mut index = HashMap::new();
        for ch in charset.chars() {
            if index.insert(ch, chars.len() as i32).is_some() {
                return Err(VocabularyError::DuplicateCharacter { ch });
            }
            chars.push(ch);
        }
        Ok(Self { chars, index })
    }

    /// The 62-symbol development charset (`DEV_CHARSET`).
    pub fn ascii_alphanumeric() -> Self {
        let mut chars = Vec::new();
        let mut index = HashMap::new();
        for ch in DEV_CHARSET.chars() {
            index.insert(ch, chars.len() as i32);
            chars.push(ch);
        }
        Self { chars, index }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn index_of(&self, ch: char) -> Option<i32> {
        self.index.get(&ch).copied()
    }

    pub fn char_at(&self, index: i32) -> Option<char> {
        usize::try_from(index).ok().and_then(|i| self.chars.get(i)).copied()
    }

    /// Maps every character of `text` to its vocabulary index.
    ///
    /// A character outside the closed set is an error, never a silent drop.
    pub fn encode_text(&self, text: &str) -> Result<Vec<i32>, VocabularyError> {
        text.chars()
            .map(|ch| {
                self.index_of(ch)
                    .ok_or(VocabularyError::UnknownCharacter { ch })
            })
            .collect()
    }

    /// Maps label indices back to their characters.
    pub fn decode_indices(&self, indices: &[i32]) -> Result<String, VocabularyError> {
        indices
            .iter()
            .map(|&index| {
                self.char_at(index).ok_or(VocabularyError::IndexOutOfRange {
                    index,
                    size: self.len(),
                })
            })
            .collect()
    }
}
