use std::fmt;
use std::sync::Arc;

use ndarray::{s, Array2, Array3};
use thiserror::Error;

use crate::sparse::{SparseLabel, SparseLabelBatch};

/// Identifies the record an example was decoded from, for fatal-error
/// reporting. Synthetic examples carry a pseudo-shard name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrigin {
    pub shard: Arc<str>,
    pub ordinal: u64,
}

impl RecordOrigin {
    pub fn new(shard: impl Into<Arc<str>>, ordinal: u64) -> Self {
        Self {
            shard: shard.into(),
            ordinal,
        }
    }

    pub fn synthetic(ordinal: u64) -> Self {
        Self::new("<synthetic>", ordinal)
    }
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record {}", self.shard, self.ordinal)
    }
}

/// A decoded, preprocessed training example.
///
/// Invariants:
/// - `length == label.len()`
/// - `width == image.ncols()` (preprocessing adds a row, never columns)
/// - pixel values lie in `[-0.5, 0.5]`
#[derive(Debug, Clone)]
pub struct ParsedExample {
    pub image: Array2<f32>,
    pub width: i32,
    pub label: SparseLabel,
    pub length: i32,
    pub text: String,
    pub filename: Option<String>,
    pub origin: RecordOrigin,
}

impl ParsedExample {
    pub fn rows(&self) -> usize {
        self.image.nrows()
    }

    pub fn cols(&self) -> usize {
        self.image.ncols()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchShapeError {
    #[error("cannot assemble an empty batch")]
    Empty,
    #[error("image height {found} at {origin} differs from batch height {expected}")]
    HeightMismatch {
        expected: usize,
        found: usize,
        origin: RecordOrigin,
    },
}

/// The unit of delivery to the training consumer.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(example, row, col)`; columns beyond an example's own width are zero.
    pub images: Array3<f32>,
    pub widths: Vec<i32>,
    pub labels: SparseLabelBatch,
    pub lengths: Vec<i32>,
    pub texts: Vec<String>,
    pub filenames: Vec<Option<String>>,
}

impl Batch {
    /// Stacks examples into one padded tensor plus the batched sparse labels.
    ///
    /// Every image is padded on the width dimension to the widest member;
    /// members must share one height (the corpus is canonical-height and
    /// preprocessing adds its row uniformly, so a mismatch means a bad
    /// record).
    pub fn from_examples(examples: Vec<ParsedExample>) -> Result<Self, BatchShapeError> {
        let first = examples.first().ok_or(BatchShapeError::Empty)?;
        let height = first.rows();
        let mut max_width = 0;
        for example in &examples {
            if example.rows() != height {
                return Err(BatchShapeError::HeightMismatch {
                    expected: height,
                    found: example.rows(),
                    origin: example.origin.clone(),
                });
            }
            max_width = max_width.max(example.cols());
        }

        let mut images = Array3::zeros((examples.len(), height, max_width));
        for (i, example) in examples.iter().enumerate() {
            images
                .slice_mut(s![i, .., ..example.cols()])
                .assign(&example.image);
        }

        let per_example: Vec<SparseLabel> =
            examples.iter().map(|example| example.label.clone()).collect();
        let labels = SparseLabelBatch::from_labels(&per_example);

        let mut widths = Vec::with_capacity(examples.len());
        let mut lengths = Vec::with_capacity(examples.len());
        let mut texts = Vec::with_capacity(examples.len());
        let mut filenames = Vec::with_capacity(examples.len());
        for example in examples {
            widths.push(example.width);
            lengths.push(example.length);
            texts.push(example.text);
            filenames.push(example.filename);
        }

        Ok(Self {
            images,
            widths,
            labels,
            lengths,
            texts,
            filenames,
        })
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn height(&self) -> usize {
        self.images.dim().1
    }

    pub fn padded_width(&self) -> usize {
        self.images.dim().2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(width: usize, height: usize, text: &str, ordinal: u64) -> ParsedExample {
        let values: Vec<i32> = (0..text.len() as i32).collect();
        ParsedExample {
            image: Array2::from_elem((height, width), 0.25),
            width: width as i32,
            label: SparseLabel::encode(&values),
            length: values.len() as i32,
            text: text.to_string(),
            filename: Some(format!("word-{ordinal}.png")),
            origin: RecordOrigin::new("words-000.rec", ordinal),
        }
    }

    #[test]
    fn batch_pads_to_max_member_width_and_zero_fills() {
        let batch =
            Batch::from_examples(vec![example(3, 4, "ab", 0), example(5, 4, "cde", 1)])
                .expect("same heights");

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.height(), 4);
        assert_eq!(batch.padded_width(), 5);
        assert_eq!(batch.images.dim(), (2, 4, 5));

        // Member content survives, padding is zero.
        assert_eq!(batch.images[[0, 0, 2]], 0.25);
        assert_eq!(batch.images[[0, 0, 3]], 0.0);
        assert_eq!(batch.images[[0, 3, 4]], 0.0);
        assert_eq!(batch.images[[1, 3, 4]], 0.25);
    }

    #[test]
    fn batch_preserves_per_example_fields_in_order() {
        let batch =
            Batch::from_examples(vec![example(3, 4, "ab", 0), example(5, 4, "cde", 1)])
                .expect("same heights");

        assert_eq!(batch.widths, vec![3, 5]);
        assert_eq!(batch.lengths, vec![2, 3]);
        assert_eq!(batch.texts, vec!["ab".to_string(), "cde".to_string()]);
        assert_eq!(
            batch.filenames,
            vec![
                Some("word-0.png".to_string()),
                Some("word-1.png".to_string())
            ]
        );
        assert_eq!(batch.labels.dense_shape, [2, 3]);
        assert_eq!(
            batch.labels.rows().expect("valid sparse batch"),
            vec![vec![0, 1], vec![0, 1, 2]]
        );
    }

    #[test]
    fn mismatched_heights_name_the_offending_record() {
        let err = Batch::from_examples(vec![example(3, 4, "ab", 0), example(3, 6, "cd", 7)])
            .unwrap_err();
        assert_eq!(
            err,
            BatchShapeError::HeightMismatch {
                expected: 4,
                found: 6,
                origin: RecordOrigin::new("words-000.rec", 7),
            }
        );
    }

    #[test]
    fn empty_batch_rejected() {
        assert_eq!(
            Batch::from_examples(Vec::new()).unwrap_err(),
            BatchShapeError::Empty
        );
    }
}
