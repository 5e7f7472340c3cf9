use wordfeed_core::types::{Batch, BatchShapeError, ParsedExample};

use crate::error::PipelineError;

/// Groups examples into width buckets and emits fixed-size padded batches.
///
/// Buckets are half-open `[lo, hi)` intervals over the ascending boundary
/// list: a width equal to a boundary belongs to the bucket starting there,
/// and widths at or above the last boundary land in one implicit overflow
/// bucket. With an empty boundary list the batcher degenerates to a single
/// rolling window padded to the window's own maximum (dynamic mode).
///
/// Streaming emission order across buckets is whatever order they fill in;
/// [`BucketBatcher::flush`] drains end-of-pass partials in ascending bucket
/// order. Accumulators are owned by one caller; this type does no locking.
#[derive(Debug)]
pub struct BucketBatcher {
    boundaries: Vec<i32>,
    batch_size: usize,
    accumulators: Vec<Vec<ParsedExample>>,
}

impl BucketBatcher {
    pub fn new(boundaries: &[i32], batch_size: usize) -> Result<Self, PipelineError> {
        if batch_size == 0 {
            return Err(PipelineError::config("batch_size must be at least 1"));
        }
        let mut prev = 0;
        for &boundary in boundaries {
            if boundary <= prev {
                return Err(PipelineError::config(format!(
                    "bucket boundaries must be positive and strictly ascending, got {boundaries:?}"
                )));
            }
            prev = boundary;
        }

        let buckets = boundaries.len() + 1;
        Ok(Self {
            boundaries: boundaries.to_vec(),
            batch_size,
            accumulators: (0..buckets).map(|_| Vec::new()).collect(),
        })
    }

    /// Index of the bucket whose interval contains `width`.
    pub fn bucket_index(&self, width: i32) -> usize {
        self.boundaries.partition_point(|&boundary| width >= boundary)
    }

    /// Number of examples currently parked across all accumulators.
    pub fn pending(&self) -> usize {
        self.accumulators.iter().map(Vec::len).sum()
    }

    /// Adds one example; returns the assembled batch if its bucket just
    /// reached the target size.
    pub fn push(&mut self, example: ParsedExample) -> Result<Option<Batch>, PipelineError> {
        let index = self.bucket_index(example.width);
        let accumulator = &mut self.accumulators[index];
        accumulator.push(example);
        if accumulator.len() < self.batch_size {
            return Ok(None);
        }
        let members = std::mem::take(accumulator);
        Batch::from_examples(members)
            .map(Some)
            .map_err(shape_error)
    }

    /// Drains every non-empty accumulator into a final (possibly undersized)
    /// batch, ascending bucket order.
    pub fn flush(&mut self) -> Result<Vec<Batch>, PipelineError> {
        let mut batches = Vec::new();
        for accumulator in &mut self.accumulators {
            if accumulator.is_empty() {
                continue;
            }
            let members = std::mem::take(accumulator);
            batches.push(Batch::from_examples(members).map_err(shape_error)?);
        }
        Ok(batches)
    }
}

fn shape_error(err: BatchShapeError) -> PipelineError {
    match err {
        BatchShapeError::HeightMismatch {
            expected,
            found,
            origin,
        } => PipelineError::MalformedRecord {
            origin,
            reason: format!("image height {found} differs from batch height {expected}"),
        },
        BatchShapeError::Empty => PipelineError::Internal("assembled an empty batch".to_string()),
    }
}
