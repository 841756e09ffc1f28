// One clustering run: embed -> reduce -> cluster -> label -> summarize -> flag.
//
// Every stage fully consumes the previous stage's output before starting.
// The record sequence is owned by the run and mutated exactly once, when
// cluster labels are written between clustering and summarization. An error
// in any stage before that point aborts the run with the records untouched.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::{ClusterEngine, ClusterParams};
use crate::embedding::{cache, EmbedOutcome, Embedder, TextEmbedder, DEFAULT_BATCH_SIZE};
use crate::error::{PipelineError, Result};
use crate::flag::{AnomalyFlagger, DEFAULT_BURST_MINUTES, DEFAULT_MAX_POSTS_PER_AUTHOR};
use crate::records::{assign_labels, clear_labels, ClusterLabel, Record};
use crate::reduce::{ReducedMatrix, Reducer, DEFAULT_COMPONENTS};
use crate::summary::keywords::DEFAULT_MAX_KEYWORDS;
use crate::summary::{ClusterSummarizer, ClusterSummary, KeywordMode, DEFAULT_SEED};

/// Everything a run needs, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Where the embedding matrix is cached between runs.
    pub cache_path: PathBuf,
    /// Recompute embeddings even if `cache_path` exists.
    pub overwrite: bool,
    pub batch_size: usize,
    pub show_progress: bool,
    pub n_components: usize,
    pub cluster: ClusterParams,
    pub max_keywords: usize,
    pub keyword_mode: KeywordMode,
    pub seed: u64,
    pub burst_window: Duration,
    pub max_posts_per_author: usize,
}

impl PipelineSettings {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            overwrite: false,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
            n_components: DEFAULT_COMPONENTS,
            cluster: ClusterParams::default(),
            max_keywords: DEFAULT_MAX_KEYWORDS,
            keyword_mode: KeywordMode::default(),
            seed: DEFAULT_SEED,
            burst_window: Duration::minutes(DEFAULT_BURST_MINUTES),
            max_posts_per_author: DEFAULT_MAX_POSTS_PER_AUTHOR,
        }
    }
}

/// What a run hands to the reporting side. Read-only once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub clusters: Vec<ClusterSummary>,
    pub flagged_users: BTreeSet<String>,
    pub total_records: usize,
    pub noise_records: usize,
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    pub fn flagged_clusters(&self) -> impl Iterator<Item = &ClusterSummary> {
        self.clusters.iter().filter(|c| c.flagged)
    }
}

/// The report plus the labeled records it was built from.
#[derive(Debug)]
pub struct RunOutput {
    pub report: RunReport,
    pub records: Vec<Record>,
}

pub struct Pipeline {
    settings: PipelineSettings,
    reducer: Reducer,
    engine: ClusterEngine,
    summarizer: ClusterSummarizer,
    flagger: AnomalyFlagger,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        let reducer = Reducer::new(settings.n_components);
        let engine = ClusterEngine::new(settings.cluster);
        let summarizer = ClusterSummarizer::new(settings.seed)
            .with_keywords(settings.max_keywords, settings.keyword_mode);
        let flagger = AnomalyFlagger::new(settings.burst_window, settings.max_posts_per_author);
        Self {
            settings,
            reducer,
            engine,
            summarizer,
            flagger,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the whole batch over `records` with `model` as the embedder.
    ///
    /// Any labels already on the records are cleared first; each run labels
    /// from scratch.
    pub fn run<E: TextEmbedder>(&self, mut records: Vec<Record>, model: E) -> Result<RunOutput> {
        clear_labels(&mut records);
        let n = records.len();
        let reduced = self.embed_and_reduce(&records, model)?;

        let labels = self.engine.fit(&reduced)?;
        if labels.len() != n {
            return Err(PipelineError::LengthMismatch {
                what: "cluster labels",
                expected: n,
                actual: labels.len(),
            });
        }

        assign_labels(&mut records, &labels)?;
        let noise_records = labels.iter().filter(|l| **l == ClusterLabel::Noise).count();
        info!(stage = "label", records = n, noise = noise_records, "Labels assigned");

        let mut clusters = self.summarizer.summarize(&records)?;
        info!(stage = "summarize", clusters = clusters.len(), "Summaries built");

        self.flagger.flag_clusters(&records, &mut clusters)?;
        let flagged_users = self.flagger.flagged_users(&records)?;
        info!(
            stage = "flag",
            flagged_clusters = clusters.iter().filter(|c| c.flagged).count(),
            flagged_users = flagged_users.len(),
            "Flagging done"
        );

        let report = RunReport {
            clusters,
            flagged_users,
            total_records: n,
            noise_records,
            generated_at: Utc::now(),
        };
        Ok(RunOutput { report, records })
    }

    /// The first two stages alone: embed `records` (or reuse the cache) and
    /// project them. Row `i` of the result belongs to `records[i]`.
    pub fn embed_and_reduce<E: TextEmbedder>(
        &self,
        records: &[Record],
        model: E,
    ) -> Result<ReducedMatrix> {
        validate_records(records)?;
        let n = records.len();
        info!(stage = "start", records = n, "Starting clustering run");

        // Embed, or reuse the cache from an earlier run.
        let embedder = Embedder::new(model)
            .with_batch_size(self.settings.batch_size)
            .with_progress(self.settings.show_progress);
        let texts: Vec<String> = records.iter().map(Record::embedding_text).collect();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let cache_path = &self.settings.cache_path;
        let embeddings = match embedder.embed(&texts, cache_path, self.settings.overwrite)? {
            EmbedOutcome::Computed(matrix) => {
                cache::write_index(cache_path, &ids)?;
                matrix
            }
            // Cached rows are matched to records by id, not by position.
            EmbedOutcome::Cached => cache::load_aligned(cache_path, &ids)?,
        };
        embeddings.ensure_aligned(n)?;
        info!(stage = "embed", rows = embeddings.rows(), dim = embeddings.dim(), "Embeddings ready");

        let reduced = self.reducer.reduce(&embeddings)?;
        info!(stage = "reduce", rows = reduced.nrows(), dim = reduced.ncols(), "Reduction done");
        Ok(reduced)
    }
}

/// Reject empty input and duplicate ids before any work is done.
fn validate_records(records: &[Record]) -> Result<()> {
    if records.is_empty() {
        return Err(PipelineError::InsufficientData(
            "no records to cluster".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(PipelineError::InvalidParameters(format!(
                "duplicate record id: {}",
                record.id
            )));
        }
    }
    Ok(())
}
