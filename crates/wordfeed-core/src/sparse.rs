use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SparseFormatError {
    #[error("example index {example} out of range for batch of {batch_len}")]
    ExampleOutOfRange { example: u32, batch_len: u32 },
    #[error("position {position} in example {example} out of range for declared length {max_length}")]
    PositionOutOfRange {
        example: u32,
        position: u32,
        max_length: u32,
    },
    #[error("duplicate coordinate ({example}, {position})")]
    DuplicateCoordinate { example: u32, position: u32 },
    #[error("coordinate/value count mismatch ({indices} indices, {values} values)")]
    CountMismatch { indices: usize, values: usize },
}

/// Portable sparse encoding of one example's label sequence: `(position, value)`
/// pairs plus the declared sequence length.
///
/// Encodings produced by [`SparseLabel::encode`] are dense (every position in
/// `[0, length)` present exactly once); the decode path does not assume that
/// and validates coordinates instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseLabel {
    pub entries: Vec<(u32, i32)>,
    pub length: u32,
}

impl SparseLabel {
    pub fn encode(values: &[i32]) -> Self {
        let entries = values
            .iter()
            .enumerate()
            .map(|(position, &value)| (position as u32, value))
            .collect();
        Self {
            entries,
            length: values.len() as u32,
        }
    }

    /// Number of encoded entries; equals the declared length for encodings
    /// produced by [`SparseLabel::encode`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconstructs the ordered value sequence.
    pub fn decode(&self) -> Result<Vec<i32>, SparseFormatError> {
        let mut entries = self.entries.clone();
        entries.sort_unstable_by_key(|&(position, _)| position);
        let mut out = Vec::with_capacity(entries.len());
        let mut prev = None;
        for &(position, value) in &entries {
            if position >= self.length {
                return Err(SparseFormatError::PositionOutOfRange {
                    example: 0,
                    position,
                    max_length: self.length,
                });
            }
            if prev == Some(position) {
                return Err(SparseFormatError::DuplicateCoordinate {
                    example: 0,
                    position,
                });
            }
            prev = Some(position);
            out.push(value);
        }
        Ok(out)
    }
}

/// Batched coordinate-list form of a set of labels.
///
/// Invariants:
/// - `indices.len() == values.len()`
/// - every coordinate is `[example, position]` with `example < dense_shape[0]`
///   and `position < dense_shape[1]`
/// - no coordinate appears twice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseLabelBatch {
    pub indices: Vec<[u32; 2]>,
    pub values: Vec<i32>,
    /// `[batch_len, max_declared_length]`.
    pub dense_shape: [u32; 2],
}

impl SparseLabelBatch {
    /// Concatenates per-example encodings, remapping each position into the
    /// `(example_index, position)` coordinate space.
    pub fn from_labels(labels: &[SparseLabel]) -> Self {
        let total: usize = labels.iter().map(SparseLabel::len).sum();
        let mut indices = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        let mut max_length = 0;
        for (example, label) in labels.iter().enumerate() {
            max_length = max_length.max(label.length);
            for &(position, value) in &label.entries {
                indices.push([example as u32, position]);
                values.push(value);
            }
        }
        Self {
            indices,
            values,
            dense_shape: [labels.len() as u32, max_length],
        }
    }

    pub fn entry_count(&self) -> usize {
        self.values.len()
    }

    /// Reconstructs, for each example index, its ordered value sequence.
    pub fn rows(&self) -> Result<Vec<Vec<i32>>, SparseFormatError> {
        if self.indices.len() != self.values.len() {
            return Err(SparseFormatError::CountMismatch {
                indices: self.indices.len(),
                values: self.values.len(),
            });
        }
        let [batch_len, max_length] = self.dense_shape;
        let mut rows: Vec<Vec<(u32, i32)>> = vec![Vec::new(); batch_len as usize];
        for (&[example, position], &value) in self.indices.iter().zip(&self.values) {
            if example >= batch_len {
                return Err(SparseFormatError::ExampleOutOfRange { example, batch_len });
            }
            if position >= max_length {
                return Err(SparseFormatError::PositionOutOfRange {
                    example,
                    position,
                    max_length,
                });
            }
            rows[example as usize].push((position, value));
        }

        let mut out = Vec::with_capacity(rows.len());
        for (example, mut entries) in rows.into_iter().enumerate() {
            entries.sort_unstable_by_key(|&(position, _)| position);
            for pair in entries.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(SparseFormatError::DuplicateCoordinate {
                        example: example as u32,
                        position: pair[0].0,
                    });
                }
            }
            out.push(entries.into_iter().map(|(_, value)| value).collect());
        }
        Ok(out)
    }
}
