use crate::error::LinearSolveError;
use crate::sparse;
use faer::sparse::{FaerSparseMat, LuError, SparseColMat};
use faer::{prelude::*, solvers::PartialPivLu, Mat};
use sprs::CsMat;

/// Largest accepted backward error `‖Ax − b‖∞ / (‖A‖∞‖x‖∞ + ‖b‖∞)`.
const BACKWARD_ERROR_LIMIT: f64 = 1e-8;

/// Trait for solving square sparse linear systems (Ax = b).
///
/// Implementations must report singular systems as
/// [`LinearSolveError::Singular`] instead of returning a non-finite or
/// meaningless vector.
pub trait LinearSystemBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError>;
}

fn check_system(matrix: &CsMat<f64>, rhs: &[f64]) -> Result<usize, LinearSolveError> {
    let (rows, cols) = matrix.shape();
    if rows != cols || rhs.len() != rows {
        return Err(LinearSolveError::DimensionMismatch {
            rows,
            cols,
            rhs: rhs.len(),
        });
    }
    if matrix.iter().any(|(v, _)| !v.is_finite()) || rhs.iter().any(|v| !v.is_finite()) {
        return Err(LinearSolveError::NonFinite);
    }
    Ok(rows)
}

/// Reject solutions that are non-finite or do not actually solve the system.
fn accept_solution(
    matrix: &CsMat<f64>,
    rhs: &[f64],
    solution: Vec<f64>,
) -> Result<Vec<f64>, LinearSolveError> {
    let dim = rhs.len();
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(LinearSolveError::Singular { dim });
    }

    let mut row_sums = vec![0.0; dim];
    for (&value, (row, _)) in matrix.iter() {
        row_sums[row] += value.abs();
    }
    let a_norm = row_sums.iter().cloned().fold(0.0, f64::max);

    let ax = sparse::mat_vec(matrix, &solution);
    let residual = ax
        .iter()
        .zip(rhs)
        .map(|(l, r)| (l - r).abs())
        .fold(0.0, f64::max);
    let scale = a_norm * sparse::norm_inf(&solution) + sparse::norm_inf(rhs);
    if scale > 0.0 && residual / scale > BACKWARD_ERROR_LIMIT {
        return Err(LinearSolveError::Singular { dim });
    }
    Ok(solution)
}

/// Pivots smaller than this fraction of the largest entry count as zero.
const PIVOT_RELATIVE_TOLERANCE: f64 = 1e-14;

/// Dense LU with partial pivoting, factored in place in a row-major buffer.
///
/// Reference backend for small systems and for cross-checking `faer`.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn name(&self) -> &'static str {
        "gauss"
    }

    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
        let n = check_system(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut lu = vec![0.0; n * n];
        for (&value, (row, col)) in matrix.iter() {
            lu[row * n + col] += value;
        }
        let tiny = lu.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())) * PIVOT_RELATIVE_TOLERANCE;

        let mut perm: Vec<usize> = (0..n).collect();
        for k in 0..n {
            let p = (k..n)
                .max_by(|&a, &b| lu[a * n + k].abs().total_cmp(&lu[b * n + k].abs()))
                .unwrap_or(k);
            if lu[p * n + k].abs() <= tiny {
                return Err(LinearSolveError::Singular { dim: n });
            }
            if p != k {
                for j in 0..n {
                    lu.swap(k * n + j, p * n + j);
                }
                perm.swap(k, p);
            }

            let pivot = lu[k * n + k];
            for i in k + 1..n {
                let l = lu[i * n + k] / pivot;
                lu[i * n + k] = l;
                if l == 0.0 {
                    continue;
                }
                for j in k + 1..n {
                    let upper = lu[k * n + j];
                    lu[i * n + j] -= l * upper;
                }
            }
        }

        // L y = P b
        let mut x: Vec<f64> = perm.iter().map(|&i| rhs[i]).collect();
        for i in 0..n {
            let s: f64 = (0..i).map(|j| lu[i * n + j] * x[j]).sum();
            x[i] -= s;
        }
        // U x = y
        for i in (0..n).rev() {
            let s: f64 = (i + 1..n).map(|j| lu[i * n + j] * x[j]).sum();
            x[i] = (x[i] - s) / lu[i * n + i];
        }

        accept_solution(matrix, rhs, x)
    }
}

/// Dense LU with partial pivoting from `faer`.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn name(&self) -> &'static str {
        "faer"
    }

    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
        let n = check_system(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut mat = Mat::<f64>::zeros(n, n);
        for (&value, (row, col)) in matrix.iter() {
            mat.write(row, col, mat.read(row, col) + value);
        }
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&column(rhs));

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();
        accept_solution(matrix, rhs, solution)
    }
}

/// Sparse LU with partial pivoting from `faer`, factored from the compressed
/// entries without a dense copy.
#[derive(Debug, Clone, Default)]
pub struct FaerSparseSolver;

impl LinearSystemBackend for FaerSparseSolver {
    fn name(&self) -> &'static str {
        "faer-sparse"
    }

    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
        let n = check_system(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let triplets: Vec<(usize, usize, f64)> = matrix
            .iter()
            .map(|(&value, (row, col))| (row, col, value))
            .collect();
        let csc = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|err| LinearSolveError::Factorization(format!("{err:?}")))?;
        let lu = match csc.sp_lu() {
            Ok(lu) => lu,
            Err(LuError::SymbolicSingular(_)) => {
                return Err(LinearSolveError::Singular { dim: n });
            }
            Err(err) => return Err(LinearSolveError::Factorization(err.to_string())),
        };
        let sol = lu.solve(&column(rhs));

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();
        accept_solution(matrix, rhs, solution)
    }
}

fn column(values: &[f64]) -> Mat<f64> {
    Mat::from_fn(values.len(), 1, |i, _| values[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::from_triplets;

    fn backends() -> Vec<Box<dyn LinearSystemBackend>> {
        vec![
            Box::new(GaussSolver),
            Box::new(FaerSolver),
            Box::new(FaerSparseSolver),
        ]
    }

    #[test]
    fn test_solves_indefinite_saddle_point_system() {
        // [[2, 0, 1], [0, 2, 1], [1, 1, 0]] x = [0, 0, 1]  =>  x = [0.5, 0.5, -1]
        let a = from_triplets(
            (3, 3),
            vec![
                (0, 0, 2.0),
                (1, 1, 2.0),
                (0, 2, 1.0),
                (2, 0, 1.0),
                (1, 2, 1.0),
                (2, 1, 1.0),
            ],
        );
        for backend in backends() {
            let x = backend.solve(&a, &[0.0, 0.0, 1.0]).unwrap();
            assert!((x[0] - 0.5).abs() < 1e-12, "{}", backend.name());
            assert!((x[1] - 0.5).abs() < 1e-12, "{}", backend.name());
            assert!((x[2] + 1.0).abs() < 1e-12, "{}", backend.name());
        }
    }

    #[test]
    fn test_singular_system_is_reported() {
        // Two identical constraint rows.
        let a = from_triplets(
            (3, 3),
            vec![
                (0, 0, 2.0),
                (0, 1, 1.0),
                (1, 0, 1.0),
                (0, 2, 1.0),
                (2, 0, 1.0),
            ],
        );
        for backend in backends() {
            let err = backend.solve(&a, &[1.0, -1.0, -2.0]).unwrap_err();
            assert!(err.is_singular(), "{}: {:?}", backend.name(), err);
        }
    }

    #[test]
    fn test_dimension_mismatch_and_non_finite() {
        let a = from_triplets((2, 2), vec![(0, 0, 1.0), (1, 1, 1.0)]);
        for backend in backends() {
            assert!(matches!(
                backend.solve(&a, &[1.0]),
                Err(LinearSolveError::DimensionMismatch { rhs: 1, .. })
            ));
            assert_eq!(
                backend.solve(&a, &[1.0, f64::NAN]),
                Err(LinearSolveError::NonFinite)
            );
        }
    }

    #[test]
    fn test_sparse_factorization_matches_dense_on_banded_system() {
        // tridiagonal [-1, 4, -1] with a coupling entry far off the band
        let n = 40;
        let mut entries = Vec::new();
        for i in 0..n {
            entries.push((i, i, 4.0));
            if i + 1 < n {
                entries.push((i, i + 1, -1.0));
                entries.push((i + 1, i, -1.0));
            }
        }
        entries.push((0, n - 1, 0.5));
        let a = from_triplets((n, n), entries);
        let b: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();

        let dense = FaerSolver.solve(&a, &b).unwrap();
        let sparse = FaerSparseSolver.solve(&a, &b).unwrap();
        let gauss = GaussSolver.solve(&a, &b).unwrap();
        for i in 0..n {
            assert!((dense[i] - sparse[i]).abs() < 1e-12);
            assert!((dense[i] - gauss[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty_system() {
        let a = from_triplets((0, 0), Vec::new());
        for backend in backends() {
            assert!(backend.solve(&a, &[]).unwrap().is_empty());
        }
    }
}
