// Dimensionality reduction: standardize, then project onto the top
// principal components.
//
// Density estimation degrades badly in 768 dimensions, so embeddings are
// projected to a few dozen components before clustering. Both the scaler and
// the projection are fitted on the batch being reduced; nothing is reused
// between runs.

pub mod eigen;

use ndarray::{Array1, Array2, Axis};
use tracing::{error, info};

use crate::embedding::EmbeddingMatrix;
use crate::error::{PipelineError, Result};

/// Default number of principal components kept.
pub const DEFAULT_COMPONENTS: usize = 50;

/// Reduced vectors, shape (records, components).
pub type ReducedMatrix = Array2<f64>;

/// Standardization + PCA keeping exactly `n_components` axes.
#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    pub n_components: usize,
}

impl Default for Reducer {
    fn default() -> Self {
        Self {
            n_components: DEFAULT_COMPONENTS,
        }
    }
}

impl Reducer {
    pub fn new(n_components: usize) -> Self {
        Self { n_components }
    }

    /// Project `embeddings` to `n_components` dimensions.
    ///
    /// Output rows are in the same order as input rows. Component signs are
    /// normalized (largest loading positive) so a given input always yields
    /// the same output.
    pub fn reduce(&self, embeddings: &EmbeddingMatrix) -> Result<ReducedMatrix> {
        let (n, d) = (embeddings.rows(), embeddings.dim());
        let k = self.n_components;

        let result = self.validate(embeddings).and_then(|_| {
            let x = standardize(&embeddings.as_array().mapv(f64::from));
            project(&x, k)
        });

        match &result {
            Ok(_) => info!(rows = n, from = d, to = k, "Reduced embedding dimensionality"),
            Err(e) => error!(stage = "reduce", rows = n, dim = d, components = k, error = %e, "Reduction failed"),
        }
        result
    }

    fn validate(&self, embeddings: &EmbeddingMatrix) -> Result<()> {
        let (n, d) = (embeddings.rows(), embeddings.dim());
        let k = self.n_components;

        if n == 0 || d == 0 {
            return Err(PipelineError::ReductionFailed(format!(
                "empty embedding matrix ({n}x{d})"
            )));
        }
        if k == 0 {
            return Err(PipelineError::ReductionFailed(
                "n_components must be at least 1".to_string(),
            ));
        }
        if n < k {
            return Err(PipelineError::ReductionFailed(format!(
                "{n} rows is fewer than the {k} components requested"
            )));
        }
        if k > d {
            return Err(PipelineError::ReductionFailed(format!(
                "cannot keep {k} components of {d}-dimensional embeddings"
            )));
        }
        if let Some((idx, _)) = embeddings
            .as_array()
            .indexed_iter()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(PipelineError::ReductionFailed(format!(
                "non-finite value at row {}, column {}",
                idx.0, idx.1
            )));
        }
        Ok(())
    }
}

/// Zero mean, unit (population) variance per column. Constant columns are
/// centered but left unscaled.
pub fn standardize(x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows() as f64;
    let mean: Array1<f64> = x.sum_axis(Axis(0)) / n;
    let centered = x - &mean;
    let var: Array1<f64> = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
    let scale = var.mapv(|v| {
        let s = v.sqrt();
        if s > f64::EPSILON {
            s
        } else {
            1.0
        }
    });
    centered / &scale
}

/// PCA scores of already-centered `x` on its top `k` components.
///
/// Works on whichever of X^T X (d x d) and X X^T (n x n) is smaller; both
/// give the same scores up to sign.
fn project(x: &Array2<f64>, k: usize) -> Result<ReducedMatrix> {
    let (n, d) = x.dim();

    let mut scores = if d <= n {
        let cov = x.t().dot(x);
        let eig = eigen::symmetric_eigen(&cov)?;
        let mut components = eig.vectors.slice(ndarray::s![.., ..k]).to_owned();
        for mut col in components.columns_mut() {
            orient(&mut col);
        }
        x.dot(&components)
    } else {
        let gram = x.dot(&x.t());
        let eig = eigen::symmetric_eigen(&gram)?;
        let mut scores = Array2::<f64>::zeros((n, k));
        for c in 0..k {
            let sigma = eig.values[c].max(0.0).sqrt();
            let u = eig.vectors.column(c);
            scores.column_mut(c).assign(&u.mapv(|v| v * sigma));
        }
        // Loading direction is X^T u; orient scores by it so the sign
        // convention matches the covariance path.
        for c in 0..k {
            let loading = x.t().dot(&scores.column(c));
            if leading_sign(loading.view()) < 0.0 {
                scores.column_mut(c).mapv_inplace(|v| -v);
            }
        }
        scores
    };

    // Components beyond the data's rank are numerically noise around zero.
    scores.mapv_inplace(|v| if v.abs() < 1e-12 { 0.0 } else { v });
    Ok(scores)
}

/// Flip `v` so its largest-magnitude entry is positive.
fn orient(v: &mut ndarray::ArrayViewMut1<f64>) {
    if leading_sign(v.view()) < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

fn leading_sign(v: ndarray::ArrayView1<f64>) -> f64 {
    v.iter()
        .copied()
        .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best })
        .signum()
}
