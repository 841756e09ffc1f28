// Error taxonomy for the clustering pipeline.
//
// Each variant names the stage that failed. Embedding and reduction errors
// abort a run; per-cluster summary errors are logged and skipped by the
// summarizer instead of surfacing here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The embedding model could not be loaded or failed during inference.
    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Malformed or insufficient input to dimensionality reduction.
    #[error("dimensionality reduction failed: {0}")]
    ReductionFailed(String),

    /// Too few points for the requested clustering thresholds.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Summaries or flags were requested before clustering assigned labels.
    #[error("records have no cluster labels yet ({unlabeled} of {total} unassigned)")]
    MissingLabelColumn { unlabeled: usize, total: usize },

    /// Two sequences that must be index-aligned have different lengths.
    #[error("{what}: expected {expected} rows, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Reading or writing the embedding cache artifact failed.
    #[error("embedding cache error at {path}: {message}")]
    Cache { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
