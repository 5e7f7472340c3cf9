use thiserror::Error;

/// On-disk record schema, one message per training example.
///
/// Explicit tags pin the wire layout; `optional` keeps field presence
/// observable so a missing required field is an error, never a default.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WordRecord {
    /// PNG- or JPEG-encoded grayscale image payload.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub image: Option<Vec<u8>>,
    /// Image width in pixels before any preprocessing.
    #[prost(int64, optional, tag = "2")]
    pub width: Option<i64>,
    /// Character-vocabulary indices of `text`, in order.
    #[prost(int64, repeated, tag = "3")]
    pub labels: Vec<i64>,
    /// Declared label count; must equal `labels.len()`.
    #[prost(int64, optional, tag = "4")]
    pub length: Option<i64>,
    /// Transcription the labels encode.
    #[prost(string, optional, tag = "5")]
    pub text: Option<String>,
    /// Source image file, when the record came from an on-disk corpus.
    #[prost(string, optional, tag = "6")]
    pub filename: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("{field} must be non-empty")]
    EmptyField { field: &'static str },
    #[error("width {width} is not a positive i32")]
    InvalidWidth { width: i64 },
    #[error("length {length} is not a non-negative i32")]
    InvalidLength { length: i64 },
    #[error("declared length {length} does not match {labels} label entries")]
    LengthMismatch { length: i64, labels: usize },
    #[error("label value {value} out of range for vocabulary of {vocab_size}")]
    LabelOutOfRange { value: i64, vocab_size: usize },
}

/// Borrowed view of a [`WordRecord`] with all required fields verified.
#[derive(Debug, Clone, Copy)]
pub struct RecordFields<'a> {
    pub image: &'a [u8],
    pub width: i32,
    pub labels: &'a [i64],
    pub length: i32,
    pub text: &'a str,
    pub filename: Option<&'a str>,
}

impl WordRecord {
    /// Verifies required-field presence and scalar ranges; the label/vocabulary
    /// range check is separate ([`RecordFields::check_label_range`]) because it
    /// needs the vocabulary size.
    pub fn checked(&self) -> Result<RecordFields<'_>, RecordError> {
        let image = self
            .image
            .as_deref()
            .ok_or(RecordError::MissingField { field: "image" })?;
        if image.is_empty() {
            return Err(RecordError::EmptyField { field: "image" });
        }

        let width = self.width.ok_or(RecordError::MissingField { field: "width" })?;
        let width = match i32::try_from(width) {
            Ok(w) if w > 0 => w,
            _ => return Err(RecordError::InvalidWidth { width }),
        };

        let length = self
            .length
            .ok_or(RecordError::MissingField { field: "length" })?;
        let length = match i32::try_from(length) {
            Ok(l) if l >= 0 => l,
            _ => return Err(RecordError::InvalidLength { length }),
        };
        if length as usize != self.labels.len() {
            return Err(RecordError::LengthMismatch {
                length: length as i64,
                labels: self.labels.len(),
            });
        }

        let text = self
            .text
            .as_deref()
            .ok_or(RecordError::MissingField { field: "text" })?;

        Ok(RecordFields {
            image,
            width,
            labels: &self.labels,
            length,
            text,
            filename: self.filename.as_deref(),
        })
    }
}

impl RecordFields<'_> {
    pub fn check_label_range(&self, vocab_size: usize) -> Result<(), RecordError> {
        for &value in self.labels {
            if value < 0 || value as u64 >= vocab_size as u64 {
                return Err(RecordError::LabelOutOfRange { value, vocab_size });
            }
        }
        Ok(())
    }
}
