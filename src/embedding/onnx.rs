// Sentence embedder running a sentence-transformers model through ONNX.
//
// The default model is all-mpnet-base-v2 (768 dimensions); all-MiniLM-L6-v2
// (384 dimensions) is available as a lighter option. Token embeddings are
// mean-pooled over the attention mask and L2-normalized, matching how
// sentence-transformers produces its sentence vectors.
//
// The model runs locally on the CPU. Inference is synchronous: the pipeline
// treats embedding as one opaque blocking call.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::debug;

use super::traits::TextEmbedder;
use crate::error::{PipelineError, Result};

/// Longest token sequence fed to the model; longer inputs are truncated.
const MAX_SEQ_LEN: usize = 384;

/// A sentence-transformers model available as ONNX on HuggingFace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    /// Short name used in config and as the model's subdirectory.
    pub name: &'static str,
    pub hf_repo: &'static str,
    pub dimension: usize,
    /// BERT-family models take a third `token_type_ids` input; MPNet doesn't.
    pub uses_token_type_ids: bool,
}

pub const MPNET: ModelSpec = ModelSpec {
    name: "all-mpnet-base-v2",
    hf_repo: "sentence-transformers/all-mpnet-base-v2",
    dimension: 768,
    uses_token_type_ids: false,
};

pub const MINILM: ModelSpec = ModelSpec {
    name: "all-MiniLM-L6-v2",
    hf_repo: "sentence-transformers/all-MiniLM-L6-v2",
    dimension: 384,
    uses_token_type_ids: true,
};

impl ModelSpec {
    /// Resolve a config value ("mpnet", "minilm", or a full model name).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mpnet" | "all-mpnet-base-v2" => Some(MPNET),
            "minilm" | "all-minilm-l6-v2" => Some(MINILM),
            _ => None,
        }
    }
}

/// Sentence embedder backed by a local ONNX session.
///
/// `Session::run` takes `&mut self`, so the session sits behind a Mutex to
/// keep `embed_batch` callable through `&self`.
pub struct SentenceEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    spec: ModelSpec,
}

impl SentenceEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    ///
    /// Any failure (missing files, incompatible runtime, corrupt model) is
    /// reported as `EmbeddingUnavailable`.
    pub fn load(model_dir: &Path, spec: ModelSpec) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(PipelineError::EmbeddingUnavailable(format!(
                "model not found: {}\nRun `murmur download-model` to download it.",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(PipelineError::EmbeddingUnavailable(format!(
                "tokenizer not found: {}\nRun `murmur download-model` to download it.",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| {
                PipelineError::EmbeddingUnavailable(format!("failed to create ONNX session: {e}"))
            })?
            .commit_from_file(&model_path)
            .map_err(|e| {
                PipelineError::EmbeddingUnavailable(format!(
                    "failed to load {}: {e}",
                    model_path.display()
                ))
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::EmbeddingUnavailable(format!("failed to load tokenizer: {e}"))
        })?;
        // Keep the model's own padding config (pad id) when the file has one.
        if tokenizer.get_padding().is_none() {
            tokenizer.with_padding(Some(PaddingParams::default()));
        }
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| {
                PipelineError::EmbeddingUnavailable(format!("invalid truncation settings: {e}"))
            })?;

        debug!(model = spec.name, dir = %model_dir.display(), "Loaded sentence embedding model");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            spec,
        })
    }
}

impl TextEmbedder for SentenceEmbedder {
    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let unavailable = |msg: String| PipelineError::EmbeddingUnavailable(msg);

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| unavailable(format!("tokenization failed: {e}")))?;

        // Batch padding makes every encoding the same length.
        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
        let dim = self.spec.dimension;

        if seq_len == 0 {
            return Err(unavailable("tokenizer produced empty encodings".to_string()));
        }

        let mut input_ids: Vec<i64> = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask: Vec<i64> = Vec::with_capacity(batch_size * seq_len);
        for enc in &encodings {
            input_ids.extend(enc.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| unavailable(format!("failed to build input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| unavailable(format!("failed to build attention_mask tensor: {e}")))?;

        // Output 0 is last_hidden_state: [batch, seq_len, dim]
        let hidden_states = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| unavailable(format!("session lock poisoned: {e}")))?;

            let run = if self.spec.uses_token_type_ids {
                let type_ids = Tensor::from_array((shape, vec![0i64; batch_size * seq_len]))
                    .map_err(|e| unavailable(format!("failed to build token_type_ids: {e}")))?;
                session.run(ort::inputs! {
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                    "token_type_ids" => type_ids
                })
            } else {
                session.run(ort::inputs! {
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor
                })
            };
            let outputs = run.map_err(|e| unavailable(format!("inference failed: {e}")))?;

            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| unavailable(format!("failed to extract output tensor: {e}")))?;
            data.to_vec()
        };

        if hidden_states.len() != batch_size * seq_len * dim {
            return Err(unavailable(format!(
                "model output has {} values, expected {}x{}x{}",
                hidden_states.len(),
                batch_size,
                seq_len,
                dim
            )));
        }

        let embeddings = (0..batch_size)
            .map(|i| {
                let mask = &attention_mask[i * seq_len..(i + 1) * seq_len];
                let tokens = &hidden_states[i * seq_len * dim..(i + 1) * seq_len * dim];
                normalize(mean_pool(tokens, mask, dim))
            })
            .collect();

        debug!(batch_size, dim, "Computed sentence embeddings");
        Ok(embeddings)
    }
}

/// Average token vectors, counting only positions where the mask is set.
pub fn mean_pool(tokens: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for (j, &m) in mask.iter().enumerate() {
        if m > 0 {
            count += 1.0;
            let token = &tokens[j * dim..(j + 1) * dim];
            for (s, &v) in sum.iter_mut().zip(token) {
                *s += v;
            }
        }
    }
    if count > 0.0 {
        for s in &mut sum {
            *s /= count;
        }
    }
    sum
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
