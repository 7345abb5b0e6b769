//! Sparse matrix helpers used by the interior-point iteration.
//!
//! Everything here works on `sprs::CsMat<f64>` through its triplet iterator,
//! so inputs may be CSR or CSC. Results are assembled with [`TriMat`] and
//! returned in CSC form; duplicate entries are summed on assembly.

use crate::error::LinearSolveError;
use sprs::{CsMat, TriMat};

/// Assemble a CSC matrix from `(row, col, value)` triplets. Duplicates are summed.
pub fn from_triplets<I>(shape: (usize, usize), entries: I) -> CsMat<f64>
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new(shape);
    for (row, col, value) in entries {
        tri.add_triplet(row, col, value);
    }
    tri.to_csc()
}

pub fn zeros(shape: (usize, usize)) -> CsMat<f64> {
    TriMat::new(shape).to_csc()
}

pub fn identity(n: usize) -> CsMat<f64> {
    from_triplets((n, n), (0..n).map(|i| (i, i, 1.0)))
}

pub fn diag(values: &[f64]) -> CsMat<f64> {
    let n = values.len();
    from_triplets((n, n), values.iter().enumerate().map(|(i, &v)| (i, i, v)))
}

/// y = A x
pub fn mat_vec(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.cols(), x.len());
    let mut y = vec![0.0; a.rows()];
    for (&value, (row, col)) in a.iter() {
        y[row] += value * x[col];
    }
    y
}

/// y = Aᵗ x, without forming the transpose.
pub fn tr_mat_vec(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.rows(), x.len());
    let mut y = vec![0.0; a.cols()];
    for (&value, (row, col)) in a.iter() {
        y[col] += value * x[row];
    }
    y
}

pub fn transpose(a: &CsMat<f64>) -> CsMat<f64> {
    from_triplets(
        (a.cols(), a.rows()),
        a.iter().map(|(&value, (row, col))| (col, row, value)),
    )
}

pub fn scale(a: &CsMat<f64>, factor: f64) -> CsMat<f64> {
    from_triplets(
        a.shape(),
        a.iter().map(|(&value, (row, col))| (row, col, factor * value)),
    )
}

/// Sum of equally shaped matrices.
pub fn sum(shape: (usize, usize), terms: &[&CsMat<f64>]) -> Result<CsMat<f64>, LinearSolveError> {
    let mut tri = TriMat::new(shape);
    for term in terms {
        if term.shape() != shape {
            return Err(LinearSolveError::DimensionMismatch {
                rows: term.rows(),
                cols: term.cols(),
                rhs: shape.0,
            });
        }
        for (&value, (row, col)) in term.iter() {
            tri.add_triplet(row, col, value);
        }
    }
    Ok(tri.to_csc())
}

pub fn add(a: &CsMat<f64>, b: &CsMat<f64>) -> Result<CsMat<f64>, LinearSolveError> {
    sum(a.shape(), &[a, b])
}

/// Aᵗ · diag(d) · A, the Schur-complement contribution of a diagonal block.
pub fn scaled_gram(a: &CsMat<f64>, d: &[f64]) -> CsMat<f64> {
    debug_assert_eq!(a.rows(), d.len());
    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); a.rows()];
    for (&value, (row, col)) in a.iter() {
        rows[row].push((col, value));
    }

    let n = a.cols();
    let mut tri = TriMat::new((n, n));
    for (row, entries) in rows.iter().enumerate() {
        let weight = d[row];
        if weight == 0.0 {
            continue;
        }
        for &(ci, vi) in entries {
            for &(cj, vj) in entries {
                tri.add_triplet(ci, cj, weight * vi * vj);
            }
        }
    }
    tri.to_csc()
}

/// The saddle-point matrix `[[M, Gxᵗ], [Gx, 0]]`.
pub fn kkt_matrix(m: &CsMat<f64>, gx: &CsMat<f64>) -> Result<CsMat<f64>, LinearSolveError> {
    let n = m.rows();
    if m.cols() != n || gx.cols() != n {
        return Err(LinearSolveError::DimensionMismatch {
            rows: gx.rows(),
            cols: gx.cols(),
            rhs: n,
        });
    }
    let dim = n + gx.rows();
    let mut tri = TriMat::with_capacity((dim, dim), m.nnz() + 2 * gx.nnz());
    for (&value, (row, col)) in m.iter() {
        tri.add_triplet(row, col, value);
    }
    for (&value, (row, col)) in gx.iter() {
        tri.add_triplet(n + row, col, value);
        tri.add_triplet(col, n + row, value);
    }
    Ok(tri.to_csc())
}

/// xᵗ A x
pub fn quad_form(a: &CsMat<f64>, x: &[f64]) -> f64 {
    a.iter()
        .map(|(&value, (row, col))| x[row] * value * x[col])
        .sum()
}

/// Row-major dense copy, for dense backends and tests.
pub fn to_dense(a: &CsMat<f64>) -> Vec<Vec<f64>> {
    let mut dense = vec![vec![0.0; a.cols()]; a.rows()];
    for (&value, (row, col)) in a.iter() {
        dense[row][col] += value;
    }
    dense
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Infinity norm; NaN entries propagate.
pub fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc: f64, &x| {
        if x.is_nan() || acc.is_nan() {
            f64::NAN
        } else {
            acc.max(x.abs())
        }
    })
}
