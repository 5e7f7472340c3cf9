use std::sync::Arc;

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use wordfeed_core::sparse::SparseLabel;
use wordfeed_core::types::{ParsedExample, RecordOrigin};
use wordfeed_core::vocab::Vocabulary;

use crate::error::PipelineError;
use crate::preprocess;

/// Shape of the generated corpus. Widths and text lengths are drawn
/// uniformly from the inclusive ranges; the same seed always yields the
/// same sequence of examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    pub count: u64,
    pub height: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_text_len: usize,
    pub max_text_len: usize,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            count: 256,
            height: 31,
            min_width: 16,
            max_width: 200,
            min_text_len: 1,
            max_text_len: 12,
            seed: 0,
        }
    }
}

impl SynthConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.height == 0 {
            return Err(PipelineError::config("synthetic height must be at least 1"));
        }
        if self.min_width == 0 || self.min_width > self.max_width {
            return Err(PipelineError::config(format!(
                "synthetic width range [{}, {}] is invalid",
                self.min_width, self.max_width
            )));
        }
        if self.min_text_len == 0 || self.min_text_len > self.max_text_len {
            return Err(PipelineError::config(format!(
                "synthetic text length range [{}, {}] is invalid",
                self.min_text_len, self.max_text_len
            )));
        }
        Ok(())
    }
}

/// Seeded generator of word examples, used when no shard files are given
/// and by the shard packer.
#[derive(Debug, Clone)]
pub struct SynthSource {
    config: SynthConfig,
    vocab: Arc<Vocabulary>,
}

/// One raw generated word before preprocessing.
#[derive(Debug, Clone)]
pub struct SynthItem {
    pub image: GrayImage,
    pub text: String,
    pub labels: Vec<i32>,
}

impl SynthSource {
    pub fn new(config: SynthConfig, vocab: Arc<Vocabulary>) -> Result<Self, PipelineError> {
        config.validate()?;
        if vocab.is_empty() {
            return Err(PipelineError::config(
                "synthetic source needs a non-empty vocabulary",
            ));
        }
        Ok(Self { config, vocab })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn stream(&self) -> SynthStream {
        SynthStream {
            config: self.config.clone(),
            vocab: Arc::clone(&self.vocab),
            rng: StdRng::seed_from_u64(self.config.seed),
            next_ordinal: 0,
        }
    }
}

/// Iteration state over one synthetic pass. Restarting from the source
/// replays the identical sequence.
pub struct SynthStream {
    config: SynthConfig,
    vocab: Arc<Vocabulary>,
    rng: StdRng,
    next_ordinal: u64,
}

impl SynthStream {
    pub fn remaining(&self) -> u64 {
        self.config.count.saturating_sub(self.next_ordinal)
    }

    /// Generates the next raw item, or `None` once `count` is reached.
    pub fn next_item(&mut self) -> Option<SynthItem> {
        if self.next_ordinal >= self.config.count {
            return None;
        }
        self.next_ordinal += 1;

        let text_len = self
            .rng
            .random_range(self.config.min_text_len..=self.config.max_text_len);
        let mut text = String::with_capacity(text_len);
        let mut labels = Vec::with_capacity(text_len);
        for _ in 0..text_len {
            let index = self.rng.random_range(0..self.vocab.len());
            let index = i32::try_from(index).unwrap_or(i32::MAX);
            if let Some(ch) = self.vocab.char_at(index) {
                text.push(ch);
                labels.push(index);
            }
        }

        let width = self
            .rng
            .random_range(self.config.min_width..=self.config.max_width);
        let height = self.config.height;
        let pixel_count = (width as usize).saturating_mul(height as usize);
        let mut pixels = Vec::with_capacity(pixel_count);
        for _ in 0..pixel_count {
            pixels.push(self.rng.random::<u8>());
        }
        let image = GrayImage::from_raw(width, height, pixels)?;

        Some(SynthItem {
            image,
            text,
            labels,
        })
    }

    /// Generates the next example in pipeline form, preprocessed and tagged
    /// with a synthetic origin.
    pub fn next_example(&mut self) -> Option<ParsedExample> {
        let ordinal = self.next_ordinal;
        let item = self.next_item()?;
        let width = i32::try_from(item.image.width()).unwrap_or(i32::MAX);
        let length = i32::try_from(item.labels.len()).unwrap_or(i32::MAX);
        Some(ParsedExample {
            image: preprocess::normalize_and_pad(&item.image),
            width,
            label: SparseLabel::encode(&item.labels),
            length,
            text: item.text,
            filename: None,
            origin: RecordOrigin::synthetic(ordinal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(count: u64, seed: u64) -> SynthSource {
        let config = SynthConfig {
            count,
            seed,
            ..SynthConfig::default()
        };
        SynthSource::new(config, Arc::new(Vocabulary::ascii_alphanumeric()))
            .expect("valid config")
    }

    #[test]
    fn stream_yields_exactly_count_examples() {
        let mut stream = source(5, 42).stream();
        let mut seen = 0;
        while let Some(example) = stream.next_example() {
            assert_eq!(example.origin, RecordOrigin::synthetic(seen));
            assert!(example.width >= 16);
            seen += 1;
        }
        assert_eq!(seen, 5);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn same_seed_replays_the_same_corpus() {
        let src = source(8, 7);
        let mut a = src.stream();
        let mut b = src.stream();
        while let Some(left) = a.next_example() {
            let right = b.next_example().expect("streams stay in lockstep");
            assert_eq!(left.text, right.text);
            assert_eq!(left.width, right.width);
            assert_eq!(left.image, right.image);
        }
        assert!(b.next_example().is_none());
    }

    #[test]
    fn labels_match_text_under_the_vocabulary() {
        let vocab = Vocabulary::ascii_alphanumeric();
        let mut stream = source(12, 3).stream();
        while let Some(example) = stream.next_example() {
            let values = example.label.decode().expect("dense encoding");
            let decoded = vocab.decode_indices(&values).expect("labels are in range");
            assert_eq!(decoded, example.text);
            assert_eq!(example.length as usize, example.text.chars().count());
        }
    }

    #[test]
    fn generated_image_is_preprocessed() {
        let config = SynthConfig {
            count: 1,
            height: 31,
            ..SynthConfig::default()
        };
        let src = SynthSource::new(config, Arc::new(Vocabulary::ascii_alphanumeric()))
            .expect("valid config");
        let example = src.stream().next_example().expect("one example");
        // One duplicated row on top of the configured height.
        assert_eq!(example.rows(), 32);
        assert_eq!(example.cols(), example.width as usize);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let vocab = Arc::new(Vocabulary::ascii_alphanumeric());
        let bad_width = SynthConfig {
            min_width: 50,
            max_width: 10,
            ..SynthConfig::default()
        };
        assert!(matches!(
            SynthSource::new(bad_width, Arc::clone(&vocab)),
            Err(PipelineError::Configuration(_))
        ));
        let bad_text = SynthConfig {
            min_text_len: 0,
            ..SynthConfig::default()
        };
        assert!(matches!(
            SynthSource::new(bad_text, vocab),
            Err(PipelineError::Configuration(_))
        ));
    }
}
