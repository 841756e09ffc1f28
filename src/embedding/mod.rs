// Embedding: text to dense vectors, batched and cached on disk.
//
// `Embedder` wraps any `TextEmbedder` with the caching contract: an existing
// cache file is left alone unless the caller asks to overwrite it, and a
// fresh computation is written to the cache before it is returned.

pub mod cache;
pub mod download;
pub mod matrix;
pub mod onnx;
pub mod traits;

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

pub use matrix::EmbeddingMatrix;
pub use traits::TextEmbedder;

use crate::error::{PipelineError, Result};

/// Default number of texts per inference call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// What `Embedder::embed` did.
#[derive(Debug)]
pub enum EmbedOutcome {
    /// Embeddings were computed and written to the cache path.
    Computed(EmbeddingMatrix),
    /// A cache already existed and overwrite was off; nothing was computed.
    /// Load it with `cache::load_aligned`.
    Cached,
}

/// Batched, cache-aware embedding over a `TextEmbedder`.
pub struct Embedder<E> {
    model: E,
    batch_size: usize,
    show_progress: bool,
}

impl<E: TextEmbedder> Embedder<E> {
    pub fn new(model: E) -> Self {
        Self {
            model,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Draw a terminal progress bar while embedding.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn model(&self) -> &E {
        &self.model
    }

    /// Embed `texts` unless a cache already exists at `cache_path`.
    ///
    /// With `overwrite == false` and an existing cache this is a no-op that
    /// returns `EmbedOutcome::Cached`. Otherwise every text is embedded in
    /// batches, the matrix is written to `cache_path`, and the matrix is
    /// returned. A failing batch fails the whole call; no partial matrix is
    /// returned or written.
    pub fn embed(&self, texts: &[String], cache_path: &Path, overwrite: bool) -> Result<EmbedOutcome> {
        if cache_path.exists() && !overwrite {
            info!(
                path = %cache_path.display(),
                "Embedding cache exists and overwrite is off, skipping computation"
            );
            return Ok(EmbedOutcome::Cached);
        }

        info!(texts = texts.len(), batch_size = self.batch_size, "Computing embeddings");
        let matrix = self.compute(texts).inspect_err(|e| {
            error!(stage = "embed", texts = texts.len(), error = %e, "Embedding failed");
        })?;

        matrix.save(cache_path)?;
        info!(
            rows = matrix.rows(),
            dim = matrix.dim(),
            path = %cache_path.display(),
            "Embeddings saved"
        );
        Ok(EmbedOutcome::Computed(matrix))
    }

    /// Embed every text in batches without touching the cache.
    pub fn compute(&self, texts: &[String]) -> Result<EmbeddingMatrix> {
        let dim = self.model.dimension();
        let pb = if self.show_progress {
            let pb = ProgressBar::new(texts.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  Embedding [{bar:30}] {pos}/{len} ({eta})")
                    .map_err(|e| PipelineError::InvalidParameters(e.to_string()))?,
            );
            Some(pb)
        } else {
            None
        };

        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.model.embed_batch(batch)?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::EmbeddingUnavailable(format!(
                    "model returned {} vectors for a batch of {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            rows.extend(vectors);
            if let Some(ref pb) = pb {
                pb.inc(batch.len() as u64);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        EmbeddingMatrix::from_rows(rows, dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Embeds each text as [len, first byte], counting calls.
    struct CountingEmbedder {
        calls: Cell<usize>,
    }

    impl TextEmbedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, t.bytes().next().unwrap_or(0) as f32])
                .collect())
        }
    }

    struct ShortEmbedder;

    impl TextEmbedder for ShortEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0, 0.0]).collect())
        }
    }

    fn texts() -> Vec<String> {
        ["alpha", "be", "gamma", "d", "epsilon"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_compute_preserves_order_across_batches() {
        let embedder = Embedder::new(CountingEmbedder { calls: Cell::new(0) }).with_batch_size(2);
        let m = embedder.compute(&texts()).unwrap();
        assert_eq!(m.rows(), 5);
        assert_eq!(embedder.model().calls.get(), 3);
        let lengths: Vec<f32> = (0..5).map(|i| m.row(i)[0]).collect();
        assert_eq!(lengths, vec![5.0, 2.0, 5.0, 1.0, 7.0]);
    }

    #[test]
    fn test_embed_writes_cache_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        let embedder = Embedder::new(CountingEmbedder { calls: Cell::new(0) });

        let first = match embedder.embed(&texts(), &path, false).unwrap() {
            EmbedOutcome::Computed(m) => m,
            EmbedOutcome::Cached => panic!("expected a fresh computation"),
        };
        assert!(path.exists());
        let calls_after_first = embedder.model().calls.get();

        let second = embedder.embed(&texts(), &path, false).unwrap();
        assert!(matches!(second, EmbedOutcome::Cached));
        assert_eq!(embedder.model().calls.get(), calls_after_first);

        let loaded = EmbeddingMatrix::load(&path).unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn test_embed_overwrite_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        let embedder = Embedder::new(CountingEmbedder { calls: Cell::new(0) });

        embedder.embed(&texts(), &path, false).unwrap();
        let outcome = embedder.embed(&texts(), &path, true).unwrap();
        assert!(matches!(outcome, EmbedOutcome::Computed(_)));
        assert_eq!(embedder.model().calls.get(), 2);
    }

    #[test]
    fn test_short_batch_is_unavailable_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        let embedder = Embedder::new(ShortEmbedder);

        let err = embedder.embed(&texts(), &path, false).unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
        assert!(!path.exists());
    }
}
