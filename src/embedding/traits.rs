// Text embedder trait: the swap point between the ONNX model and anything
// else that can turn text into vectors (tests use a deterministic fake).

use crate::error::Result;

/// Turns text into fixed-length dense vectors.
pub trait TextEmbedder {
    /// Width of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, returning one vector per text in input order.
    ///
    /// Implementations must fail with `PipelineError::EmbeddingUnavailable`
    /// rather than return fewer vectors than texts.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
