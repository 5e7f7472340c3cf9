use thiserror::Error;

use wordfeed_core::sparse::SparseFormatError;
use wordfeed_core::types::RecordOrigin;
use wordfeed_core::vocab::VocabularyError;

/// Fatal pipeline failures.
///
/// Every variant terminates the run and surfaces through the pipeline's join
/// handle; the filter stage's drops are the only non-error exclusion of
/// examples. Record-level variants name the shard and record ordinal that
/// triggered them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("io on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record at {origin}: {reason}")]
    MalformedRecord { origin: RecordOrigin, reason: String },
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
    #[error(transparent)]
    SparseFormat(#[from] SparseFormatError),
    /// Worker panic or a broken internal invariant; not part of the data
    /// taxonomy above.
    #[error("internal: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn malformed(origin: &RecordOrigin, reason: impl ToString) -> Self {
        Self::MalformedRecord {
            origin: origin.clone(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn join(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("worker task failed: {err}"))
    }
}
