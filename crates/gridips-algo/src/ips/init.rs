//! Starting multipliers and slacks.

use super::problem::{DerivativeLevel, NonlinearProblem};
use crate::error::IpsError;
use gridips_core::{sparse, LinearSystemBackend};
use tracing::warn;

/// Floor applied to slacks in the power-flow start.
const MIN_SLACK: f64 = 1e-2;

/// Tikhonov term for the multiplier normal equations.
const NORMAL_EQ_REGULARIZATION: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StartingPoint {
    pub lam: Vec<f64>,
    pub mu: Vec<f64>,
    pub z: Vec<f64>,
}

/// Cold start: `z = μ = 1`, `λ = 0`, then `z = −H` where `H < −1` and
/// `μ = γ/z` where that exceeds one.
pub(crate) fn cold_start<P: NonlinearProblem + ?Sized>(
    problem: &P,
    x: &[f64],
    gamma: f64,
) -> Result<StartingPoint, IpsError> {
    let dims = problem.dimensions();
    let mu0 = vec![1.0; dims.n_ineq];
    let lam0 = vec![0.0; dims.n_eq];
    let eval = problem.evaluate(x, &mu0, &lam0, DerivativeLevel::Values);
    eval.check(dims, DerivativeLevel::Values)?;

    let z: Vec<f64> = eval
        .h
        .iter()
        .map(|&h| if h < -1.0 { -h } else { 1.0 })
        .collect();
    let mu = z
        .iter()
        .map(|&zi| if gamma / zi > 1.0 { gamma / zi } else { 1.0 })
        .collect();

    Ok(StartingPoint { lam: lam0, mu, z })
}

/// Start from a (nearly) feasible point such as a converged power flow.
///
/// `z = max(−H, 0.01)`, `μ = γ/z`, and `λ` is the least-squares solution of
/// the stationarity condition `Gxᵗλ = −(fx + Hxᵗμ)`, computed from the
/// regularized normal equations. A singular normal matrix falls back to `λ = 0`.
pub(crate) fn power_flow_start<P: NonlinearProblem + ?Sized>(
    problem: &P,
    x: &[f64],
    gamma: f64,
    backend: &dyn LinearSystemBackend,
) -> Result<StartingPoint, IpsError> {
    let dims = problem.dimensions();
    let eval = problem.evaluate(
        x,
        &vec![1.0; dims.n_ineq],
        &vec![1.0; dims.n_eq],
        DerivativeLevel::FirstOrder,
    );
    eval.check(dims, DerivativeLevel::FirstOrder)?;
    let first = eval.first_order()?;

    let z: Vec<f64> = eval.h.iter().map(|&h| (-h).max(MIN_SLACK)).collect();
    let mu: Vec<f64> = z.iter().map(|&zi| gamma / zi).collect();

    if dims.n_eq == 0 {
        return Ok(StartingPoint { lam: vec![], mu, z });
    }

    let hx_mu = sparse::tr_mat_vec(&first.hx, &mu);
    let target: Vec<f64> = first.fx.iter().zip(&hx_mu).map(|(f, h)| -(f + h)).collect();

    // (Gx Gxᵗ + εI) λ = Gx target
    let gx_t = sparse::transpose(&first.gx);
    let gram = sparse::scaled_gram(&gx_t, &vec![1.0; dims.n_x]);
    let normal = sparse::add(
        &gram,
        &sparse::scale(&sparse::identity(dims.n_eq), NORMAL_EQ_REGULARIZATION),
    )?;
    let rhs = sparse::mat_vec(&first.gx, &target);

    let lam = match backend.solve(&normal, &rhs) {
        Ok(lam) => lam,
        Err(err) if err.is_singular() => {
            warn!("multiplier least-squares start is singular, using zero multipliers");
            vec![0.0; dims.n_eq]
        }
        Err(err) => return Err(err.into()),
    };

    Ok(StartingPoint { lam, mu, z })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ips::problem::{Evaluation, FirstOrder, ProblemDimensions};
    use gridips_core::FaerSolver;

    /// min x0² + x1² s.t. x0 + x1 = 1, −x <= 0.
    struct Simplex;

    impl NonlinearProblem for Simplex {
        fn dimensions(&self) -> ProblemDimensions {
            ProblemDimensions {
                n_x: 2,
                n_eq: 1,
                n_ineq: 2,
            }
        }

        fn evaluate(
            &self,
            x: &[f64],
            _mu: &[f64],
            _lam: &[f64],
            level: DerivativeLevel,
        ) -> Evaluation {
            Evaluation {
                f: x[0] * x[0] + x[1] * x[1],
                g: vec![x[0] + x[1] - 1.0],
                h: vec![-x[0], -x[1]],
                first: level.wants_first().then(|| FirstOrder {
                    fx: vec![2.0 * x[0], 2.0 * x[1]],
                    gx: sparse::from_triplets((1, 2), vec![(0, 0, 1.0), (0, 1, 1.0)]),
                    hx: sparse::from_triplets((2, 2), vec![(0, 0, -1.0), (1, 1, -1.0)]),
                }),
                second: None,
            }
        }
    }

    #[test]
    fn test_cold_start_widens_slacks_of_slack_constraints() {
        let start = cold_start(&Simplex, &[3.0, 0.2], 1.0).unwrap();
        assert_eq!(start.z, vec![3.0, 1.0]);
        assert_eq!(start.mu, vec![1.0, 1.0]);
        assert_eq!(start.lam, vec![0.0]);
    }

    #[test]
    fn test_cold_start_raises_mu_for_small_slacks() {
        let start = cold_start(&Simplex, &[3.0, 0.2], 4.0).unwrap();
        // gamma / z = 4/3 and 4/1
        assert!((start.mu[0] - 4.0 / 3.0).abs() < 1e-15);
        assert_eq!(start.mu[1], 4.0);
    }

    #[test]
    fn test_power_flow_start_clips_slacks_and_fits_multipliers() {
        let start =
            power_flow_start(&Simplex, &[0.5, -0.5], 1.0, &FaerSolver).unwrap();
        assert_eq!(start.z, vec![0.5, MIN_SLACK]);
        assert_eq!(start.mu[0], 2.0);
        assert!((start.mu[1] - 100.0).abs() < 1e-9);
        // Gxᵗλ = −(fx + Hxᵗμ) = −([1, −1] − [2, 100]) = [1, 101]  =>  λ = 51
        assert!((start.lam[0] - 51.0).abs() < 1e-6);
        assert!(start.z.iter().chain(&start.mu).all(|&v| v > 0.0));
    }
}
