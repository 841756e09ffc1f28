use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;

use crate::cluster::{ClusterParams, Metric};
use crate::embedding::onnx::{ModelSpec, MPNET};
use crate::embedding::{download, DEFAULT_BATCH_SIZE};
use crate::flag::{DEFAULT_BURST_MINUTES, DEFAULT_MAX_POSTS_PER_AUTHOR};
use crate::pipeline::PipelineSettings;
use crate::reduce::DEFAULT_COMPONENTS;
use crate::summary::DEFAULT_SEED;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Everything
/// has a default; a variable that is set but unparseable is an error rather
/// than silently falling back.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// Base directory holding one subdirectory per embedding model
    pub model_dir: PathBuf,
    /// Which sentence embedding model to use (default: all-mpnet-base-v2)
    pub model: ModelSpec,
    /// Where `.npy` embedding caches are written
    pub cache_dir: PathBuf,
    /// Where JSON reports are written
    pub report_dir: PathBuf,
    pub n_components: usize,
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub metric: Metric,
    pub batch_size: usize,
    /// Seed for sampling representative texts
    pub seed: u64,
    pub burst_minutes: i64,
    pub max_posts_per_author: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model = match lookup("MURMUR_MODEL") {
            Some(name) => ModelSpec::from_name(&name).with_context(|| {
                format!("MURMUR_MODEL must be 'mpnet' or 'minilm', got '{name}'")
            })?,
            None => MPNET,
        };

        let metric = match lookup("MURMUR_METRIC") {
            Some(name) => name
                .parse::<Metric>()
                .with_context(|| format!("Invalid MURMUR_METRIC '{name}'"))?,
            None => Metric::default(),
        };

        Ok(Self {
            db_path: lookup("MURMUR_DB_PATH").unwrap_or_else(|| "./murmur.db".to_string()),
            model_dir: lookup("MURMUR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(download::default_model_dir),
            model,
            cache_dir: lookup("MURMUR_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/embeddings")),
            report_dir: lookup("MURMUR_REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            n_components: parse_var(&lookup, "MURMUR_COMPONENTS", DEFAULT_COMPONENTS)?,
            min_cluster_size: parse_var(&lookup, "MURMUR_MIN_CLUSTER_SIZE", 10)?,
            min_samples: parse_var(&lookup, "MURMUR_MIN_SAMPLES", 5)?,
            metric,
            batch_size: parse_var(&lookup, "MURMUR_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            seed: parse_var(&lookup, "MURMUR_SEED", DEFAULT_SEED)?,
            burst_minutes: parse_var(&lookup, "MURMUR_BURST_MINUTES", DEFAULT_BURST_MINUTES)?,
            max_posts_per_author: parse_var(
                &lookup,
                "MURMUR_MAX_POSTS_PER_AUTHOR",
                DEFAULT_MAX_POSTS_PER_AUTHOR,
            )?,
        })
    }

    /// Directory holding the configured model's files.
    pub fn model_path(&self) -> PathBuf {
        download::model_subdir(&self.model_dir, &self.model)
    }

    /// Check that the configured embedding model has been downloaded.
    pub fn require_model(&self) -> Result<()> {
        if !download::model_files_present(&self.model_dir, &self.model) {
            anyhow::bail!(
                "Embedding model {} not found in {}\n\
                 Run `murmur download-model` to download it.",
                self.model.name,
                self.model_path().display()
            );
        }
        Ok(())
    }

    /// Cache file for a named embedding run, e.g. `posts` ->
    /// `<cache_dir>/posts_all-mpnet-base-v2.npy`.
    pub fn cache_path(&self, cache_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}_{}.npy", cache_name, self.model.name))
    }

    /// Pipeline settings for one run.
    pub fn pipeline_settings(&self, cache_path: &Path, overwrite: bool) -> PipelineSettings {
        let mut settings = PipelineSettings::new(cache_path);
        settings.overwrite = overwrite;
        settings.batch_size = self.batch_size;
        settings.show_progress = true;
        settings.n_components = self.n_components;
        settings.cluster = ClusterParams {
            min_cluster_size: self.min_cluster_size,
            min_samples: self.min_samples,
            metric: self.metric,
        };
        settings.seed = self.seed;
        settings.burst_window = Duration::minutes(self.burst_minutes);
        settings.max_posts_per_author = self.max_posts_per_author;
        settings
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}
