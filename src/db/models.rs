// Row types that don't map onto a pipeline type directly.

use serde::{Deserialize, Serialize};

/// Summary row for a stored clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: i64,
    pub generated_at: String,
    pub total_records: usize,
    pub noise_records: usize,
    pub cluster_count: usize,
    pub flagged_clusters: usize,
    pub embedding_cache: Option<String>,
}

/// Counts shown by `murmur status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStats {
    pub records: usize,
    pub authors: usize,
    pub runs: usize,
}
