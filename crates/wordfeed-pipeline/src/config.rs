use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Default shard filename patterns, comma-separated.
pub const DEFAULT_FILE_PATTERNS: &str = "words-*";

/// Default width-bucket boundaries, pixels.
pub const DEFAULT_BOUNDARIES: &[i32] = &[32, 64, 96, 128, 160, 192, 224, 256];

/// Knobs for one pipeline run.
///
/// Buffer capacities default to the sizes the pipeline was tuned with:
/// `num_workers * batch_size * 2` records between reading and batching, and
/// `2 * num_workers` assembled batches in front of the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target examples per emitted batch; a pass's final batch per bucket may
    /// be smaller.
    pub batch_size: usize,
    /// Worker count for both the shard readers and the record decoders.
    pub num_workers: usize,
    /// Ascending width-bucket boundaries; empty selects dynamic (window)
    /// padding with no bucketing.
    pub boundaries: Vec<i32>,
    /// Override for the raw/parsed record buffer capacity.
    pub record_buffer_capacity: Option<usize>,
    /// Override for the emitted-batch buffer capacity.
    pub batch_buffer_capacity: Option<usize>,
    /// Total passes over the source; `None` repeats indefinitely.
    pub num_epochs: Option<u32>,
    /// Drop examples narrower than this, pixels.
    pub minimum_width: Option<i32>,
    /// Drop examples wider than this, pixels.
    pub width_threshold: Option<i32>,
    /// Drop examples with more labels than this.
    pub length_threshold: Option<i32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_workers: 4,
            boundaries: DEFAULT_BOUNDARIES.to_vec(),
            record_buffer_capacity: None,
            batch_buffer_capacity: None,
            num_epochs: None,
            minimum_width: Some(20),
            width_threshold: None,
            length_threshold: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be at least 1"));
        }
        if self.num_workers == 0 {
            return Err(PipelineError::config("num_workers must be at least 1"));
        }
        let mut prev = 0;
        for &boundary in &self.boundaries {
            if boundary <= prev {
                return Err(PipelineError::config(format!(
                    "bucket boundaries must be positive and strictly ascending, got {:?}",
                    self.boundaries
                )));
            }
            prev = boundary;
        }
        if self.record_buffer_capacity == Some(0) {
            return Err(PipelineError::config(
                "record_buffer_capacity must be at least 1",
            ));
        }
        if self.batch_buffer_capacity == Some(0) {
            return Err(PipelineError::config(
                "batch_buffer_capacity must be at least 1",
            ));
        }
        if self.num_epochs == Some(0) {
            return Err(PipelineError::config("num_epochs must be at least 1 when set"));
        }
        Ok(())
    }

    /// Capacity of the raw-record and parsed-example buffers.
    pub fn record_capacity(&self) -> usize {
        self.record_buffer_capacity
            .unwrap_or(self.num_workers * self.batch_size * 2)
            .max(1)
    }

    /// Capacity of the emitted-batch buffer.
    pub fn batch_capacity(&self) -> usize {
        self.batch_buffer_capacity
            .unwrap_or(2 * self.num_workers)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_training_setup() {
        let config = PipelineConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.boundaries, DEFAULT_BOUNDARIES);
        assert_eq!(config.minimum_width, Some(20));
        assert_eq!(config.record_capacity(), 4 * 32 * 2);
        assert_eq!(config.batch_capacity(), 8);
    }

    #[test]
    fn explicit_capacities_win_over_derived_ones() {
        let config = PipelineConfig {
            record_buffer_capacity: Some(7),
            batch_buffer_capacity: Some(3),
            ..PipelineConfig::default()
        };
        assert_eq!(config.record_capacity(), 7);
        assert_eq!(config.batch_capacity(), 3);
    }

    #[test]
    fn non_ascending_boundaries_rejected() {
        for boundaries in [vec![32, 32], vec![64, 32], vec![0, 32], vec![-4]] {
            let config = PipelineConfig {
                boundaries,
                ..PipelineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(PipelineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn zero_sizes_rejected() {
        for config in [
            PipelineConfig {
                batch_size: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                num_workers: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                record_buffer_capacity: Some(0),
                ..PipelineConfig::default()
            },
            PipelineConfig {
                num_epochs: Some(0),
                ..PipelineConfig::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(PipelineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn empty_boundaries_select_dynamic_mode_and_validate() {
        let config = PipelineConfig {
            boundaries: Vec::new(),
            ..PipelineConfig::default()
        };
        config.validate().expect("dynamic mode is valid");
    }
}
