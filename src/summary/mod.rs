// Per-cluster summaries: keywords, headline titles, sampled texts, top
// authors and a per-day activity histogram.
//
// Noise records are excluded. A cluster that fails to summarize is logged
// and skipped so the rest of the report survives.

pub mod keywords;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::flag::FlagReason;
use crate::records::{require_labels, ClusterLabel, Record};

pub use keywords::{KeywordExtractor, KeywordMode};

/// Default seed for sampling representative texts.
pub const DEFAULT_SEED: u64 = 42;
const DEFAULT_SAMPLE_SIZE: usize = 5;
const DEFAULT_TOP_AUTHORS: usize = 3;
const HEADLINE_TITLES: usize = 5;

/// Everything the report shows about one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: u32,
    pub size: usize,
    pub keywords: Vec<String>,
    /// Titles of the first few members in record order.
    pub headline: Vec<String>,
    /// Randomly sampled member texts (reproducible for a given seed).
    pub sample_texts: Vec<String>,
    /// (author, member count), most active first.
    pub top_authors: Vec<(String, usize)>,
    pub daily_activity: BTreeMap<NaiveDate, usize>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Set by the anomaly flagger.
    pub flagged: bool,
    pub flag_reasons: Vec<FlagReason>,
}

impl ClusterSummary {
    pub fn span(&self) -> chrono::Duration {
        self.last_seen - self.first_seen
    }
}

/// Members of each non-noise cluster, keyed by cluster id, in record order.
pub fn group_by_cluster(records: &[Record]) -> BTreeMap<u32, Vec<&Record>> {
    let mut groups: BTreeMap<u32, Vec<&Record>> = BTreeMap::new();
    for record in records {
        if let Some(id) = record.label().cluster_id() {
            groups.entry(id).or_default().push(record);
        }
    }
    groups
}

pub struct ClusterSummarizer {
    keywords: KeywordExtractor,
    sample_size: usize,
    top_authors: usize,
    seed: u64,
}

impl Default for ClusterSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl ClusterSummarizer {
    pub fn new(seed: u64) -> Self {
        Self {
            keywords: KeywordExtractor::default(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            top_authors: DEFAULT_TOP_AUTHORS,
            seed,
        }
    }

    pub fn with_keywords(mut self, max_keywords: usize, mode: KeywordMode) -> Self {
        self.keywords = KeywordExtractor::new(max_keywords, mode);
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_top_authors(mut self, top_authors: usize) -> Self {
        self.top_authors = top_authors;
        self
    }

    /// Summarize every non-noise cluster in ascending id order.
    ///
    /// Fails only when the records have not been labeled yet.
    pub fn summarize(&self, records: &[Record]) -> Result<Vec<ClusterSummary>> {
        require_labels(records)?;

        let groups = group_by_cluster(records);
        let mut summaries = Vec::with_capacity(groups.len());
        for (id, members) in &groups {
            match self.summarize_cluster(*id, members) {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(
                        stage = "summarize",
                        cluster = id,
                        members = members.len(),
                        error = %e,
                        "Failed to summarize cluster, skipping it"
                    );
                }
            }
        }

        info!(
            clusters = summaries.len(),
            skipped = groups.len() - summaries.len(),
            "Summarized clusters"
        );
        Ok(summaries)
    }

    /// Summarize one cluster from its members.
    pub fn summarize_cluster(&self, id: u32, members: &[&Record]) -> Result<ClusterSummary> {
        if members.is_empty() {
            return Err(PipelineError::InsufficientData(format!(
                "cluster {id} has no members"
            )));
        }
        if let Some(stray) = members.iter().find(|r| r.label() != ClusterLabel::Cluster(id)) {
            return Err(PipelineError::InvalidParameters(format!(
                "record {} is labeled {} but was grouped into cluster {id}",
                stray.id,
                stray.label()
            )));
        }

        let texts: Vec<String> = members.iter().map(|r| r.summary_text()).collect();
        let keywords = self.keywords.extract(&texts);

        let headline = members
            .iter()
            .filter(|r| !r.title.trim().is_empty())
            .take(HEADLINE_TITLES)
            .map(|r| r.title.clone())
            .collect();

        let sample_texts = self.sample(id, &texts);
        let top_authors = top_authors(members, self.top_authors);

        let mut daily_activity: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for record in members {
            *daily_activity.entry(record.created_at.date_naive()).or_default() += 1;
        }

        // members is non-empty, checked above
        let first_seen = members.iter().map(|r| r.created_at).min().unwrap_or_default();
        let last_seen = members.iter().map(|r| r.created_at).max().unwrap_or_default();

        Ok(ClusterSummary {
            id,
            size: members.len(),
            keywords,
            headline,
            sample_texts,
            top_authors,
            daily_activity,
            first_seen,
            last_seen,
            flagged: false,
            flag_reasons: Vec::new(),
        })
    }

    /// Up to `sample_size` texts, chosen with an RNG seeded from the
    /// summarizer seed and the cluster id. Returned in member order.
    fn sample(&self, id: u32, texts: &[String]) -> Vec<String> {
        let amount = self.sample_size.min(texts.len());
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(u64::from(id)));
        let mut picked = rand::seq::index::sample(&mut rng, texts.len(), amount).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| texts[i].clone()).collect()
    }
}

/// Most frequent authors, ties broken by name.
fn top_authors(members: &[&Record], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in members {
        *counts.entry(record.author.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(author, count)| (author.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
