// Parameter sweep over the clustering thresholds.
//
// Clusters the same reduced matrix once per (min_cluster_size, min_samples)
// pair and reports shape statistics for each, so thresholds can be picked
// from evidence instead of by feel. Nothing here feeds back into a run.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ClusterEngine, ClusterParams, Metric};
use crate::error::{PipelineError, Result};
use crate::records::ClusterLabel;

/// `min_cluster_size` values tried by `grid_search`.
pub const MIN_CLUSTER_SIZES: [usize; 4] = [5, 10, 15, 20];
/// `min_samples` values tried by `grid_search`; `None` means "same as
/// min_cluster_size".
pub const MIN_SAMPLES: [Option<usize>; 3] = [None, Some(5), Some(10)];

/// Statistics for one parameter pair. Sizes count cluster members only;
/// noise is reported separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResult {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub n_clusters: usize,
    pub n_noise: usize,
    pub largest: usize,
    pub median: Option<f64>,
    pub mean: Option<f64>,
}

impl GridResult {
    /// Summarize one clustering of the sweep.
    pub fn from_labels(params: ClusterParams, labels: &[ClusterLabel]) -> Self {
        let n_noise = labels.iter().filter(|l| **l == ClusterLabel::Noise).count();

        let mut counts = std::collections::BTreeMap::<u32, usize>::new();
        for id in labels.iter().filter_map(ClusterLabel::cluster_id) {
            *counts.entry(id).or_default() += 1;
        }
        let mut sizes: Vec<usize> = counts.into_values().collect();
        sizes.sort_unstable();

        let median = match sizes.len() {
            0 => None,
            n if n % 2 == 1 => Some(sizes[n / 2] as f64),
            n => Some((sizes[n / 2 - 1] + sizes[n / 2]) as f64 / 2.0),
        };
        let mean = (!sizes.is_empty())
            .then(|| sizes.iter().sum::<usize>() as f64 / sizes.len() as f64);

        Self {
            min_cluster_size: params.min_cluster_size,
            min_samples: params.min_samples,
            n_clusters: sizes.len(),
            n_noise,
            largest: sizes.last().copied().unwrap_or(0),
            median,
            mean,
        }
    }
}

/// The default sweep as concrete parameter pairs, duplicates removed.
pub fn grid_points(metric: Metric) -> Vec<ClusterParams> {
    let mut points: Vec<ClusterParams> = Vec::new();
    for min_cluster_size in MIN_CLUSTER_SIZES {
        for min_samples in MIN_SAMPLES {
            let params = ClusterParams {
                min_cluster_size,
                min_samples: min_samples.unwrap_or(min_cluster_size),
                metric,
            };
            if !points.contains(&params) {
                points.push(params);
            }
        }
    }
    points
}

/// Run the default sweep over `data`.
pub fn grid_search(data: &Array2<f64>, metric: Metric) -> Result<Vec<GridResult>> {
    grid_search_over(data, &grid_points(metric))
}

/// Cluster `data` once per entry of `points`.
///
/// Pairs that need more points than `data` has are skipped with a warning;
/// if every pair is skipped the sweep fails with `InsufficientData`. Any
/// other clustering error aborts the sweep.
pub fn grid_search_over(data: &Array2<f64>, points: &[ClusterParams]) -> Result<Vec<GridResult>> {
    info!(stage = "grid", combinations = points.len(), rows = data.nrows(), "Starting parameter sweep");

    let mut results = Vec::with_capacity(points.len());
    for params in points {
        match ClusterEngine::new(*params).fit(data) {
            Ok(labels) => {
                let result = GridResult::from_labels(*params, &labels);
                info!(
                    min_cluster_size = result.min_cluster_size,
                    min_samples = result.min_samples,
                    clusters = result.n_clusters,
                    noise = result.n_noise,
                    "Grid point done"
                );
                results.push(result);
            }
            Err(PipelineError::InsufficientData(reason)) => {
                warn!(
                    min_cluster_size = params.min_cluster_size,
                    min_samples = params.min_samples,
                    reason = %reason,
                    "Grid point skipped"
                );
            }
            Err(e) => return Err(e),
        }
    }

    if results.is_empty() && !points.is_empty() {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows is too few for every parameter pair in the sweep",
            data.nrows()
        )));
    }
    Ok(results)
}
