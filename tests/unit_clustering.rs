// Unit tests for the numeric stages: dimensionality reduction and
// density-based clustering, through their public entry points.

use std::collections::{BTreeSet, HashMap};

use murmur::cluster::{ClusterEngine, ClusterParams, Metric};
use murmur::embedding::matrix::EmbeddingMatrix;
use murmur::records::ClusterLabel;
use murmur::reduce::Reducer;
use murmur::PipelineError;
use ndarray::Array2;

/// Two 3x4 lattices (spacing 0.1) far apart, plus one point far from both.
fn two_lattices() -> Array2<f64> {
    let mut rows = Vec::new();
    for (ox, oy) in [(0.0, 0.0), (10.0, 10.0)] {
        for i in 0..3 {
            for j in 0..4 {
                rows.push([ox + 0.1 * i as f64, oy + 0.1 * j as f64]);
            }
        }
    }
    rows.push([-30.0, 40.0]);
    Array2::from_shape_vec((rows.len(), 2), rows.iter().flatten().copied().collect()).unwrap()
}

fn engine(min_cluster_size: usize, min_samples: usize) -> ClusterEngine {
    ClusterEngine::new(ClusterParams {
        min_cluster_size,
        min_samples,
        metric: Metric::Euclidean,
    })
}

fn groups(labels: &[ClusterLabel]) -> BTreeSet<BTreeSet<usize>> {
    let mut by_id: HashMap<u32, BTreeSet<usize>> = HashMap::new();
    for (i, label) in labels.iter().enumerate() {
        if let Some(id) = label.cluster_id() {
            by_id.entry(id).or_default().insert(i);
        }
    }
    by_id.into_values().collect()
}

// ============================================================
// ClusterEngine::fit
// ============================================================

#[test]
fn lattices_become_two_clusters() {
    let labels = engine(5, 3).fit(&two_lattices()).unwrap();
    assert_eq!(labels.len(), 25);

    let expected: BTreeSet<BTreeSet<usize>> =
        [(0..12).collect(), (12..24).collect()].into_iter().collect();
    assert_eq!(groups(&labels), expected);
    assert_eq!(labels[24], ClusterLabel::Noise);
}

#[test]
fn cluster_ids_are_dense_from_zero() {
    let labels = engine(5, 3).fit(&two_lattices()).unwrap();
    let ids: BTreeSet<u32> = labels.iter().filter_map(ClusterLabel::cluster_id).collect();
    assert_eq!(ids, [0, 1].into_iter().collect());
}

#[test]
fn clustering_is_deterministic() {
    let data = two_lattices();
    let e = engine(5, 3);
    assert_eq!(e.fit(&data).unwrap(), e.fit(&data).unwrap());
}

#[test]
fn row_order_does_not_change_groups() {
    let data = two_lattices();
    let n = data.nrows();
    let reversed = Array2::from_shape_fn(data.dim(), |(i, j)| data[[n - 1 - i, j]]);

    let forward = engine(5, 3).fit(&data).unwrap();
    let mut backward = engine(5, 3).fit(&reversed).unwrap();
    backward.reverse();

    assert_eq!(groups(&forward), groups(&backward));
    assert_eq!(backward[24], ClusterLabel::Noise);
}

#[test]
fn every_point_labeled_noise_is_valid() {
    // Evenly spaced points have no density contrast to split on.
    let data = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
    let labels = engine(12, 2).fit(&data).unwrap();
    assert_eq!(labels.len(), 12);
    assert!(labels.iter().all(|l| *l == ClusterLabel::Noise));
}

#[test]
fn fewer_points_than_min_cluster_size_is_insufficient() {
    let data = Array2::zeros((4, 2));
    let err = engine(5, 3).fit(&data).unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData(_)));
}

#[test]
fn empty_input_is_insufficient() {
    let data = Array2::zeros((0, 2));
    let err = engine(5, 3).fit(&data).unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData(_)));
}

#[test]
fn bad_thresholds_are_invalid() {
    let data = two_lattices();
    assert!(matches!(
        engine(1, 3).fit(&data).unwrap_err(),
        PipelineError::InvalidParameters(_)
    ));
    assert!(matches!(
        engine(5, 0).fit(&data).unwrap_err(),
        PipelineError::InvalidParameters(_)
    ));
}

#[test]
fn non_finite_input_is_invalid() {
    let mut data = two_lattices();
    data[[3, 1]] = f64::NAN;
    let err = engine(5, 3).fit(&data).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameters(_)));
}

// ============================================================
// Reducer::reduce
// ============================================================

fn embeddings(rows: usize, dim: usize) -> EmbeddingMatrix {
    let data: Vec<Vec<f32>> = (0..rows)
        .map(|i| (0..dim).map(|j| ((i * 7 + j * 3) % 11) as f32 - 5.0).collect())
        .collect();
    EmbeddingMatrix::from_rows(data, dim).unwrap()
}

#[test]
fn reduce_output_shape() {
    let reduced = Reducer::new(3).reduce(&embeddings(20, 6)).unwrap();
    assert_eq!(reduced.dim(), (20, 3));
    assert!(reduced.iter().all(|v| v.is_finite()));
}

#[test]
fn reduce_is_deterministic() {
    let input = embeddings(20, 6);
    let reducer = Reducer::new(4);
    assert_eq!(reducer.reduce(&input).unwrap(), reducer.reduce(&input).unwrap());
}

#[test]
fn identical_rows_reduce_identically() {
    let mut rows: Vec<Vec<f32>> = (0..10)
        .map(|i| vec![i as f32, (i * i) as f32, 1.0 - i as f32, (i % 3) as f32])
        .collect();
    rows.push(rows[2].clone());
    let reduced = Reducer::new(2)
        .reduce(&EmbeddingMatrix::from_rows(rows, 4).unwrap())
        .unwrap();
    assert_eq!(reduced.row(2), reduced.row(10));
}

#[test]
fn too_many_components_fails() {
    let err = Reducer::new(7).reduce(&embeddings(20, 6)).unwrap_err();
    assert!(matches!(err, PipelineError::ReductionFailed(_)));
}

#[test]
fn fewer_rows_than_components_fails() {
    let err = Reducer::new(5).reduce(&embeddings(3, 6)).unwrap_err();
    assert!(matches!(err, PipelineError::ReductionFailed(_)));
}

#[test]
fn non_finite_embedding_fails() {
    let mut rows: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32, 1.0]).collect();
    rows[1][1] = f32::INFINITY;
    let err = Reducer::new(1)
        .reduce(&EmbeddingMatrix::from_rows(rows, 2).unwrap())
        .unwrap_err();
    assert!(matches!(err, PipelineError::ReductionFailed(_)));
}

#[test]
fn reduce_wide_embeddings_orders_components_by_variance() {
    // Closer to real embedding widths than the toy inputs above.
    let data: Vec<Vec<f32>> = (0..200)
        .map(|i| {
            (0..128)
                .map(|j| (((i * 37 + j * 11) % 29) as f32 - 14.0) / 9.0 + ((i * j) as f32 * 0.003).sin())
                .collect()
        })
        .collect();
    let reduced = Reducer::new(50)
        .reduce(&EmbeddingMatrix::from_rows(data, 128).unwrap())
        .unwrap();
    assert_eq!(reduced.dim(), (200, 50));

    let variances: Vec<f64> = reduced
        .columns()
        .into_iter()
        .map(|c| c.mapv(|v| v * v).sum())
        .collect();
    assert!(variances.windows(2).all(|w| w[0] >= w[1] - 1e-6), "{variances:?}");
}
