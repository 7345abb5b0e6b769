//! Central-difference check of user-supplied derivatives.
//!
//! Every block of [`FirstOrder`] and [`SecondOrder`] is compared against a
//! numerical derivative of the level below it: `fx`, `Gx` and `Hx` from the
//! values, and `fxx`, `Gxx = ∂(Gxᵗλ)/∂x` and `Hxx = ∂(Hxᵗμ)/∂x` from the
//! first-order blocks. Errors are scaled by `max(1, |analytic|, |numeric|)`.

use super::kkt::lagrangian_gradient;
use super::problem::{DerivativeLevel, FirstOrder, NonlinearProblem};
use crate::error::IpsError;
use gridips_core::sparse;
use serde::Serialize;
use std::fmt;

/// Worst mismatch within one derivative block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockError {
    pub block: &'static str,
    pub max_error: f64,
    pub row: usize,
    pub col: usize,
    pub analytic: f64,
    pub numeric: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivativeReport {
    pub step: f64,
    pub blocks: Vec<BlockError>,
}

impl DerivativeReport {
    pub fn max_error(&self) -> f64 {
        self.blocks.iter().map(|b| b.max_error).fold(0.0, f64::max)
    }

    pub fn worst(&self) -> Option<&BlockError> {
        self.blocks
            .iter()
            .max_by(|a, b| a.max_error.total_cmp(&b.max_error))
    }

    pub fn passes(&self, tol: f64) -> bool {
        self.blocks.iter().all(|b| b.max_error <= tol)
    }
}

impl fmt::Display for DerivativeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "derivative check (step {:.1e})", self.step)?;
        for b in &self.blocks {
            writeln!(
                f,
                "  {:<4} max error {:.3e} at ({}, {}): analytic {:.6e}, numeric {:.6e}",
                b.block, b.max_error, b.row, b.col, b.analytic, b.numeric
            )?;
        }
        Ok(())
    }
}

/// Tracks the worst scaled mismatch of one block.
struct Tracker {
    worst: BlockError,
}

impl Tracker {
    fn new(block: &'static str) -> Self {
        Self {
            worst: BlockError {
                block,
                max_error: 0.0,
                row: 0,
                col: 0,
                analytic: 0.0,
                numeric: 0.0,
            },
        }
    }

    fn compare(&mut self, row: usize, col: usize, analytic: f64, numeric: f64) {
        let scale = 1.0_f64.max(analytic.abs()).max(numeric.abs());
        let err = (analytic - numeric).abs() / scale;
        if err > self.worst.max_error || err.is_nan() && !self.worst.max_error.is_nan() {
            self.worst = BlockError {
                block: self.worst.block,
                max_error: err,
                row,
                col,
                analytic,
                numeric,
            };
        }
    }
}

/// Compare the analytic derivatives of `problem` at `(x, mu, lam)` with
/// central differences of width `step`.
pub fn verify_derivatives<P: NonlinearProblem + ?Sized>(
    problem: &P,
    x: &[f64],
    mu: &[f64],
    lam: &[f64],
    step: f64,
) -> Result<DerivativeReport, IpsError> {
    if !(step > 0.0 && step.is_finite()) {
        return Err(IpsError::InvalidOptions(format!(
            "finite-difference step must be positive, got {step}"
        )));
    }
    let dims = problem.dimensions();
    if x.len() != dims.n_x || mu.len() != dims.n_ineq || lam.len() != dims.n_eq {
        return Err(IpsError::DimensionMismatch {
            what: "derivative check point",
            expected: format!("x {}, mu {}, lam {}", dims.n_x, dims.n_ineq, dims.n_eq),
            actual: format!("x {}, mu {}, lam {}", x.len(), mu.len(), lam.len()),
        });
    }

    let base = problem.evaluate(x, mu, lam, DerivativeLevel::SecondOrder);
    base.check(dims, DerivativeLevel::SecondOrder)?;
    let first = base.first_order()?;
    let second = base.second_order()?;
    let gx = sparse::to_dense(&first.gx);
    let hx = sparse::to_dense(&first.hx);
    let fxx = sparse::to_dense(&second.fxx);
    let gxx = sparse::to_dense(&second.gxx);
    let hxx = sparse::to_dense(&second.hxx);

    let mut t_fx = Tracker::new("fx");
    let mut t_gx = Tracker::new("Gx");
    let mut t_hx = Tracker::new("Hx");
    let mut t_fxx = Tracker::new("fxx");
    let mut t_gxx = Tracker::new("Gxx");
    let mut t_hxx = Tracker::new("Hxx");

    let zeros_eq = vec![0.0; dims.n_eq];
    let zeros_ineq = vec![0.0; dims.n_ineq];
    let mut xp = x.to_vec();
    let mut xm = x.to_vec();

    for j in 0..dims.n_x {
        xp[j] = x[j] + step;
        xm[j] = x[j] - step;
        let plus = problem.evaluate(&xp, mu, lam, DerivativeLevel::FirstOrder);
        let minus = problem.evaluate(&xm, mu, lam, DerivativeLevel::FirstOrder);
        plus.check(dims, DerivativeLevel::FirstOrder)?;
        minus.check(dims, DerivativeLevel::FirstOrder)?;
        xp[j] = x[j];
        xm[j] = x[j];

        let d = |a: f64, b: f64| (a - b) / (2.0 * step);

        t_fx.compare(0, j, first.fx[j], d(plus.f, minus.f));
        for i in 0..dims.n_eq {
            t_gx.compare(i, j, gx[i][j], d(plus.g[i], minus.g[i]));
        }
        for i in 0..dims.n_ineq {
            t_hx.compare(i, j, hx[i][j], d(plus.h[i], minus.h[i]));
        }

        let (fp, fm) = (plus.first_order()?, minus.first_order()?);
        let gp = weighted_gradient(fp, lam, &zeros_ineq, false);
        let gm = weighted_gradient(fm, lam, &zeros_ineq, false);
        let hp = weighted_gradient(fp, &zeros_eq, mu, false);
        let hm = weighted_gradient(fm, &zeros_eq, mu, false);
        let fxp = weighted_gradient(fp, &zeros_eq, &zeros_ineq, true);
        let fxm = weighted_gradient(fm, &zeros_eq, &zeros_ineq, true);
        for i in 0..dims.n_x {
            t_fxx.compare(i, j, fxx[i][j], d(fxp[i], fxm[i]));
            t_gxx.compare(i, j, gxx[i][j], d(gp[i], gm[i]));
            t_hxx.compare(i, j, hxx[i][j], d(hp[i], hm[i]));
        }
    }

    Ok(DerivativeReport {
        step,
        blocks: [t_fx, t_gx, t_hx, t_fxx, t_gxx, t_hxx]
            .into_iter()
            .map(|t| t.worst)
            .collect(),
    })
}

/// `[fx] + Gxᵗλ + Hxᵗμ`, with the objective gradient only when `with_objective`.
fn weighted_gradient(
    first: &FirstOrder,
    lam: &[f64],
    mu: &[f64],
    with_objective: bool,
) -> Vec<f64> {
    let mut grad = lagrangian_gradient(first, lam, mu);
    if !with_objective {
        for (g, f) in grad.iter_mut().zip(&first.fx) {
            *g -= f;
        }
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ips::problem::{Evaluation, ProblemDimensions, SecondOrder};

    /// f = x0² x1, G = x0 + x1³ - 1, H = x0 x1 - 2.
    struct Cubic {
        hessian_typo: bool,
    }

    impl NonlinearProblem for Cubic {
        fn dimensions(&self) -> ProblemDimensions {
            ProblemDimensions {
                n_x: 2,
                n_eq: 1,
                n_ineq: 1,
            }
        }

        fn evaluate(
            &self,
            x: &[f64],
            mu: &[f64],
            lam: &[f64],
            level: DerivativeLevel,
        ) -> Evaluation {
            let fxx_11 = if self.hessian_typo { 1.0 } else { 0.0 };
            Evaluation {
                f: x[0] * x[0] * x[1],
                g: vec![x[0] + x[1].powi(3) - 1.0],
                h: vec![x[0] * x[1] - 2.0],
                first: level.wants_first().then(|| FirstOrder {
                    fx: vec![2.0 * x[0] * x[1], x[0] * x[0]],
                    gx: sparse::from_triplets((1, 2), vec![(0, 0, 1.0), (0, 1, 3.0 * x[1] * x[1])]),
                    hx: sparse::from_triplets((1, 2), vec![(0, 0, x[1]), (0, 1, x[0])]),
                }),
                second: level.wants_second().then(|| SecondOrder {
                    fxx: sparse::from_triplets(
                        (2, 2),
                        vec![
                            (0, 0, 2.0 * x[1]),
                            (0, 1, 2.0 * x[0]),
                            (1, 0, 2.0 * x[0]),
                            (1, 1, fxx_11),
                        ],
                    ),
                    gxx: sparse::from_triplets((2, 2), vec![(1, 1, 6.0 * x[1] * lam[0])]),
                    hxx: sparse::from_triplets((2, 2), vec![(0, 1, mu[0]), (1, 0, mu[0])]),
                }),
            }
        }
    }

    #[test]
    fn test_exact_derivatives_pass() {
        let problem = Cubic { hessian_typo: false };
        let report = verify_derivatives(&problem, &[0.7, -1.3], &[2.0], &[0.5], 1e-6).unwrap();
        assert_eq!(report.blocks.len(), 6);
        assert!(report.passes(1e-6), "{report}");
    }

    #[test]
    fn test_wrong_hessian_entry_is_located() {
        let problem = Cubic { hessian_typo: true };
        let report = verify_derivatives(&problem, &[0.7, -1.3], &[2.0], &[0.5], 1e-6).unwrap();
        let worst = report.worst().unwrap();
        assert_eq!(worst.block, "fxx");
        assert_eq!((worst.row, worst.col), (1, 1));
        assert!(!report.passes(1e-3));
    }

    #[test]
    fn test_bad_step_is_rejected() {
        let problem = Cubic { hessian_typo: false };
        assert!(verify_derivatives(&problem, &[0.0, 0.0], &[1.0], &[1.0], 0.0).is_err());
        assert!(verify_derivatives(&problem, &[0.0], &[1.0], &[1.0], 1e-6).is_err());
    }
}
