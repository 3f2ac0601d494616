//! Failure taxonomy for the pipeline.
//!
//! Every fallible library operation returns [`Result`]. Input problems
//! (unreadable or empty PDFs, duplicate filenames) are reported per document
//! and never abort a batch; transient upstream problems are retried before
//! surfacing as `*Unavailable`; integrity problems (dimension mismatch) are
//! fatal for the operation that hit them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The PDF parsed but yielded no usable text, likely a scanned document.
    #[error("no extractable text in {filename} (scanned or image-only PDF?)")]
    ExtractionEmpty { filename: String },

    /// The bytes could not be parsed as a PDF at all.
    #[error("failed to extract PDF text: {0}")]
    PdfExtract(String),

    /// A document with this filename is already ingested.
    #[error("document already ingested: {filename}")]
    DuplicateDocument { filename: String },

    /// The embedding endpoint kept failing after retries, or rejected the
    /// request outright.
    #[error("embedding service unavailable after {attempts} attempt(s): {reason}")]
    EmbeddingUnavailable { attempts: u32, reason: String },

    /// The model returned vectors of the wrong dimension. Never retried.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The generation endpoint kept failing after retries.
    #[error("generation service unavailable after {attempts} attempt(s): {reason}")]
    GenerationUnavailable { attempts: u32, reason: String },

    #[error("question is empty")]
    EmptyQuery,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
