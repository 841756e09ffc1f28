// Model download helper for the sentence embedding models.
//
// Fetches `onnx/model.onnx` and `tokenizer.json` from the model's
// HuggingFace repo. Files are stored in a platform-appropriate directory
// (~/.local/share/murmur/models/<model>/ on Linux) so they persist across
// runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::onnx::ModelSpec;

const HF_BASE_URL: &str = "https://huggingface.co";

/// Remote path of the ONNX export inside a sentence-transformers repo.
const REMOTE_MODEL_FILE: &str = "onnx/model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILE: &str = "model.onnx";

/// Returns the default base directory for model files.
/// Uses the platform data directory: ~/.local/share/murmur/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("murmur")
        .join("models")
}

/// Subdirectory within `base` holding one model's files.
pub fn model_subdir(base: &Path, spec: &ModelSpec) -> PathBuf {
    base.join(spec.name)
}

/// Check whether both model files exist for `spec` under `base`.
pub fn model_files_present(base: &Path, spec: &ModelSpec) -> bool {
    let dir = model_subdir(base, spec);
    dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
}

/// Download the model and tokenizer for `spec` into `base`.
///
/// Skips files that already exist and shows a progress bar for the model.
pub async fn download_model(base: &Path, spec: &ModelSpec) -> Result<()> {
    let dir = model_subdir(base, spec);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    println!("\nSentence embedding model ({}):", spec.name);
    let repo_url = format!("{}/{}/resolve/main", HF_BASE_URL, spec.hf_repo);

    let tokenizer_path = dir.join(TOKENIZER_FILE);
    if tokenizer_path.exists() {
        info!("Embedding tokenizer already exists, skipping");
        println!("  {} (already exists)", TOKENIZER_FILE);
    } else {
        println!("  Downloading {}...", TOKENIZER_FILE);
        download_file(
            &format!("{}/{}", repo_url, TOKENIZER_FILE),
            &tokenizer_path,
            false,
        )
        .await?;
    }

    let model_path = dir.join(MODEL_FILE);
    if model_path.exists() {
        info!("Embedding model already exists, skipping");
        println!("  {} (already exists)", MODEL_FILE);
    } else {
        println!("  Downloading {}...", MODEL_FILE);
        download_file(
            &format!("{}/{}", repo_url, REMOTE_MODEL_FILE),
            &model_path,
            true,
        )
        .await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let total_size = response.content_length();

    let pb = if show_progress {
        let pb = match total_size {
            Some(size) => {
                let pb = ProgressBar::new(size);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(ProgressStyle::default_spinner().template("    {spinner} {bytes}")?);
                pb
            }
        };
        Some(pb)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    // Write to a temp name first so an interrupted download never leaves a
    // truncated file that `model_files_present` would accept.
    let partial = dest.with_extension("partial");
    std::fs::write(&partial, &bytes)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}
