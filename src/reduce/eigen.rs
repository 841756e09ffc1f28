// Symmetric eigendecomposition: Householder reduction to tridiagonal form,
// then implicit-shift QL on the tridiagonal matrix.
//
// Used for PCA on covariance/Gram matrices, which are symmetric positive
// semi-definite. The reduction runs once in O(n^3); QL then needs only a
// few sweeps per eigenvalue. A value that will not converge is an error.

use ndarray::{Array1, Array2};

use crate::error::{PipelineError, Result};

/// QL sweeps allowed per eigenvalue before giving up.
const MAX_SWEEPS_PER_VALUE: usize = 50;

/// Eigenvalues (descending) and matching eigenvectors (as columns).
pub struct Eigen {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
}

/// Decompose a symmetric matrix. Only the lower triangle of `matrix` is
/// read; the input is not checked for symmetry.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> Result<Eigen> {
    decompose(matrix, MAX_SWEEPS_PER_VALUE)
}

fn decompose(matrix: &Array2<f64>, max_sweeps: usize) -> Result<Eigen> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(PipelineError::ReductionFailed(format!(
            "eigendecomposition needs a square matrix, got {}x{}",
            n,
            matrix.ncols()
        )));
    }
    if n == 0 {
        return Ok(Eigen {
            values: Array1::zeros(0),
            vectors: Array2::zeros((0, 0)),
        });
    }

    let mut v: Vec<Vec<f64>> = matrix.rows().into_iter().map(|r| r.to_vec()).collect();
    let mut d = vec![0.0; n];
    let mut e = vec![0.0; n];

    tridiagonalize(&mut v, &mut d, &mut e);

    // QL rotates pairs of eigenvector columns; keep them as rows so each
    // rotation touches two contiguous slices.
    let mut z: Vec<Vec<f64>> = (0..n).map(|j| (0..n).map(|k| v[k][j]).collect()).collect();
    drop(v);
    tridiagonal_ql(&mut d, &mut e, &mut z, max_sweeps)?;

    // Descending by eigenvalue; ties keep index order.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| d[j].partial_cmp(&d[i]).unwrap_or(std::cmp::Ordering::Equal));

    let values = Array1::from_iter(order.iter().map(|&i| d[i]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (col, &i) in order.iter().enumerate() {
        for (k, x) in z[i].iter().enumerate() {
            vectors[[k, col]] = *x;
        }
    }

    Ok(Eigen { values, vectors })
}

/// Householder reduction of the symmetric matrix in `v` to tridiagonal form.
/// On return `d` holds the diagonal, `e[1..]` the subdiagonal, and `v` the
/// accumulated orthogonal transform.
fn tridiagonalize(v: &mut [Vec<f64>], d: &mut [f64], e: &mut [f64]) {
    let n = d.len();
    for j in 0..n {
        d[j] = v[n - 1][j];
    }

    for i in (1..n).rev() {
        let scale: f64 = d[..i].iter().map(|x| x.abs()).sum();
        let mut h = 0.0;

        if scale == 0.0 {
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[i - 1][j];
                v[i][j] = 0.0;
                v[j][i] = 0.0;
            }
        } else {
            for x in d[..i].iter_mut() {
                *x /= scale;
                h += *x * *x;
            }
            let mut f = d[i - 1];
            let mut g = if f > 0.0 { -h.sqrt() } else { h.sqrt() };
            e[i] = scale * g;
            h -= f * g;
            d[i - 1] = f - g;
            for x in e[..i].iter_mut() {
                *x = 0.0;
            }

            for j in 0..i {
                f = d[j];
                v[j][i] = f;
                g = e[j] + v[j][j] * f;
                for k in j + 1..i {
                    g += v[k][j] * d[k];
                    e[k] += v[k][j] * f;
                }
                e[j] = g;
            }

            f = 0.0;
            for j in 0..i {
                e[j] /= h;
                f += e[j] * d[j];
            }
            let hh = f / (h + h);
            for j in 0..i {
                e[j] -= hh * d[j];
            }
            for j in 0..i {
                f = d[j];
                g = e[j];
                for k in j..i {
                    v[k][j] -= f * e[k] + g * d[k];
                }
                d[j] = v[i - 1][j];
                v[i][j] = 0.0;
            }
        }
        d[i] = h;
    }

    // Accumulate the transformations.
    for i in 0..n - 1 {
        v[n - 1][i] = v[i][i];
        v[i][i] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[k][i + 1] / h;
            }
            for j in 0..=i {
                let g: f64 = (0..=i).map(|k| v[k][i + 1] * v[k][j]).sum();
                for k in 0..=i {
                    v[k][j] -= g * d[k];
                }
            }
        }
        for row in v.iter_mut().take(i + 1) {
            row[i + 1] = 0.0;
        }
    }
    for j in 0..n {
        d[j] = v[n - 1][j];
        v[n - 1][j] = 0.0;
    }
    v[n - 1][n - 1] = 1.0;
    e[0] = 0.0;
}

/// Implicit-shift QL on the tridiagonal (`d`, `e`). `z[i]` is the i-th
/// eigenvector on return, `d[i]` its eigenvalue (unsorted).
fn tridiagonal_ql(
    d: &mut [f64],
    e: &mut [f64],
    z: &mut [Vec<f64>],
    max_sweeps: usize,
) -> Result<()> {
    let n = d.len();
    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0;

    let mut f = 0.0;
    let mut tst1 = 0.0f64;
    let eps = f64::EPSILON;

    for l in 0..n {
        tst1 = tst1.max(d[l].abs() + e[l].abs());
        // e[n - 1] is zero, so this stops by n - 1.
        let mut m = l;
        while m < n - 1 && e[m].abs() > eps * tst1 {
            m += 1;
        }

        if m > l {
            let mut sweeps = 0;
            loop {
                if sweeps == max_sweeps {
                    return Err(PipelineError::ReductionFailed(format!(
                        "eigenvalue {l} of {n} did not converge after {max_sweeps} QL sweeps"
                    )));
                }
                sweeps += 1;

                let mut g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = p.hypot(1.0);
                if p < 0.0 {
                    r = -r;
                }
                d[l] = e[l] / (p + r);
                d[l + 1] = e[l] * (p + r);
                let dl1 = d[l + 1];
                let mut h = g - d[l];
                for x in d[l + 2..].iter_mut() {
                    *x -= h;
                }
                f += h;

                p = d[m];
                let mut c = 1.0;
                let mut c2 = c;
                let mut c3 = c;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;
                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    g = c * e[i];
                    h = c * p;
                    r = p.hypot(e[i]);
                    e[i + 1] = s * r;
                    s = e[i] / r;
                    c = p / r;
                    p = c * d[i] - s * g;
                    d[i + 1] = h + s * (c * g + s * d[i]);

                    let (lo, hi) = z.split_at_mut(i + 1);
                    for (zi, zi1) in lo[i].iter_mut().zip(hi[0].iter_mut()) {
                        let t = *zi1;
                        *zi1 = s * *zi + c * t;
                        *zi = c * *zi - s * t;
                    }
                }
                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                if e[l].abs() <= eps * tst1 {
                    break;
                }
            }
        }
        d[l] += f;
        e[l] = 0.0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_decomposes(m: &Array2<f64>, e: &Eigen, tol: f64) {
        let n = m.nrows();
        let lambda = Array2::from_diag(&e.values);
        let rebuilt = e.vectors.dot(&lambda).dot(&e.vectors.t());
        for (x, y) in rebuilt.iter().zip(m.iter()) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
        let gram = e.vectors.t().dot(&e.vectors);
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < tol);
            }
        }
    }

    #[test]
    fn test_diagonal_matrix() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let e = symmetric_eigen(&m).unwrap();
        assert!((e.values[0] - 5.0).abs() < 1e-12);
        assert!((e.values[1] - 3.0).abs() < 1e-12);
        assert!((e.values[2] - 1.0).abs() < 1e-12);
        assert!((e.vectors[[1, 0]].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_by_two() {
        // eigenvalues 3 and 1, eigenvectors (1,1)/sqrt2 and (1,-1)/sqrt2
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let e = symmetric_eigen(&m).unwrap();
        assert!((e.values[0] - 3.0).abs() < 1e-10);
        assert!((e.values[1] - 1.0).abs() < 1e-10);
        let v0 = e.vectors.column(0);
        assert!((v0[0].abs() - v0[1].abs()).abs() < 1e-10);
        assert!(v0[0] * v0[1] > 0.0);
    }

    #[test]
    fn test_one_by_one() {
        let e = symmetric_eigen(&array![[-4.0]]).unwrap();
        assert_eq!(e.values[0], -4.0);
        assert_eq!(e.vectors[[0, 0]], 1.0);
    }

    #[test]
    fn test_reconstruction() {
        let m = array![
            [4.0, 1.0, -2.0, 0.5],
            [1.0, 3.0, 0.0, 1.0],
            [-2.0, 0.0, 5.0, -1.0],
            [0.5, 1.0, -1.0, 2.0]
        ];
        let e = symmetric_eigen(&m).unwrap();
        assert_decomposes(&m, &e, 1e-9);
        assert!(e.values.windows(2).into_iter().all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_larger_gram_matrix() {
        // 120x120 Gram of a 120x40 matrix: rank 40, the rest zeros.
        let x = Array2::from_shape_fn((120, 40), |(i, j)| {
            (((i * 31 + j * 17) % 23) as f64 - 11.0) / 7.0 + (i as f64 * 0.01).sin()
        });
        let gram = x.dot(&x.t());
        let e = symmetric_eigen(&gram).unwrap();
        assert_decomposes(&gram, &e, 1e-7);
        let scale = e.values[0];
        assert!(e.values.iter().skip(40).all(|v| v.abs() < 1e-9 * scale));
    }

    #[test]
    fn test_repeated_eigenvalues() {
        let m = Array2::<f64>::eye(6) * 2.5;
        let e = symmetric_eigen(&m).unwrap();
        assert!(e.values.iter().all(|v| (v - 2.5).abs() < 1e-12));
        assert_decomposes(&m, &e, 1e-12);
    }

    #[test]
    fn test_sweep_limit_reports_failure() {
        let m = array![[2.0, 1.0, 0.5], [1.0, 3.0, 1.0], [0.5, 1.0, 4.0]];
        let err = decompose(&m, 0).err().unwrap();
        assert!(matches!(err, PipelineError::ReductionFailed(ref msg) if msg.contains("did not converge")));
    }

    #[test]
    fn test_non_square_is_rejected() {
        let err = symmetric_eigen(&Array2::zeros((2, 3))).err().unwrap();
        assert!(matches!(err, PipelineError::ReductionFailed(_)));
    }
}
