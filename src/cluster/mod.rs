// Density-based clustering of the reduced embeddings.
//
// HDBSCAN does not force every point into a cluster and does not need the
// number of clusters up front. Sparse points come back as `ClusterLabel::Noise`.
// Cluster ids are only meaningful within one run.

pub mod grid;
pub mod hdbscan;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::records::ClusterLabel;

/// Distance between two reduced vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Euclidean,
    Manhattan,
    /// 1 - cosine similarity.
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Cosine => "cosine",
        }
    }

    pub fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            Metric::Euclidean => hdbscan::euclidean(a, b),
            Metric::Manhattan => hdbscan::manhattan(a, b),
            Metric::Cosine => hdbscan::cosine(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            "manhattan" | "l1" | "cityblock" => Ok(Metric::Manhattan),
            "cosine" => Ok(Metric::Cosine),
            other => Err(PipelineError::InvalidParameters(format!(
                "unknown distance metric '{other}' (expected euclidean, manhattan or cosine)"
            ))),
        }
    }
}

/// Clustering thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Smallest group that counts as a cluster.
    pub min_cluster_size: usize,
    /// Neighbourhood size for the core distance (the point itself included).
    /// Larger values make clustering more conservative.
    pub min_samples: usize,
    pub metric: Metric,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 10,
            min_samples: 5,
            metric: Metric::Euclidean,
        }
    }
}

pub struct ClusterEngine {
    params: ClusterParams,
}

impl ClusterEngine {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Label every row of `data`, in row order.
    ///
    /// An all-noise result is a valid outcome. Empty input or fewer rows than
    /// `min_cluster_size` is `InsufficientData`.
    pub fn fit(&self, data: &Array2<f64>) -> Result<Vec<ClusterLabel>> {
        let p = &self.params;
        let (n, k) = data.dim();

        self.validate(data).inspect_err(|e| {
            error!(stage = "cluster", rows = n, dim = k, error = %e, "Clustering rejected input");
        })?;

        let raw = hdbscan::hdbscan(data, p.min_cluster_size, p.min_samples, p.metric);
        let labels: Vec<ClusterLabel> = raw
            .into_iter()
            .map(|l| l.map_or(ClusterLabel::Noise, ClusterLabel::Cluster))
            .collect();

        let clusters = labels
            .iter()
            .filter_map(ClusterLabel::cluster_id)
            .max()
            .map_or(0, |m| m as usize + 1);
        let noise = labels.iter().filter(|l| **l == ClusterLabel::Noise).count();
        info!(
            rows = n,
            dim = k,
            clusters,
            noise,
            min_cluster_size = p.min_cluster_size,
            min_samples = p.min_samples,
            metric = %p.metric,
            "Clustering complete"
        );

        Ok(labels)
    }

    fn validate(&self, data: &Array2<f64>) -> Result<()> {
        let p = &self.params;
        if p.min_cluster_size < 2 {
            return Err(PipelineError::InvalidParameters(format!(
                "min_cluster_size must be at least 2, got {}",
                p.min_cluster_size
            )));
        }
        if p.min_samples == 0 {
            return Err(PipelineError::InvalidParameters(
                "min_samples must be at least 1".to_string(),
            ));
        }

        let n = data.nrows();
        if n == 0 {
            return Err(PipelineError::InsufficientData(
                "no points to cluster".to_string(),
            ));
        }
        if n < p.min_cluster_size {
            return Err(PipelineError::InsufficientData(format!(
                "{n} points is fewer than min_cluster_size {}",
                p.min_cluster_size
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::InvalidParameters(
                "input contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}
