//! Newton step on the perturbed KKT conditions.
//!
//! The slack and inequality-multiplier blocks are eliminated up front, so
//! the linear system only carries `(dx, dλ)`:
//!
//! ```text
//! ┌                  ┐ ┌    ┐     ┌   ┐
//! │  M       Gxᵗ     │ │ dx │     │ n │        M = Lxx + Hxᵗ diag(μ/z) Hx
//! │                  │ │    │ = − │   │        n = Lx  + Hxᵗ ((γ + μ⊙H) / z)
//! │  Gx      0       │ │ dλ │     │ G │
//! └                  ┘ └    ┘     └   ┘
//! ```
//!
//! and the eliminated steps are recovered afterwards:
//!
//! ```text
//! dz = −H − z − Hx dx
//! dμ = −μ + (γ − μ⊙dz) / z
//! ```

use super::problem::{Evaluation, FirstOrder};
use crate::error::IpsError;
use gridips_core::{sparse, LinearSystemBackend};
use sprs::CsMat;

#[derive(Debug, Clone)]
pub(crate) struct NewtonStep {
    pub dx: Vec<f64>,
    pub dlam: Vec<f64>,
    pub dz: Vec<f64>,
    pub dmu: Vec<f64>,
    /// Gradient of the Lagrangian at the linearization point
    pub lx: Vec<f64>,
    /// Hessian of the Lagrangian at the linearization point
    pub lxx: CsMat<f64>,
}

/// `fx + Gxᵗλ + Hxᵗμ`
pub(crate) fn lagrangian_gradient(first: &FirstOrder, lam: &[f64], mu: &[f64]) -> Vec<f64> {
    let gx_lam = sparse::tr_mat_vec(&first.gx, lam);
    let hx_mu = sparse::tr_mat_vec(&first.hx, mu);
    first
        .fx
        .iter()
        .zip(gx_lam.iter().zip(&hx_mu))
        .map(|(f, (g, h))| f + g + h)
        .collect()
}

/// Assemble and solve the reduced KKT system at `eval`.
///
/// A singular system surfaces as `IpsError::LinearSolve(LinearSolveError::Singular)`.
pub(crate) fn newton_step(
    eval: &Evaluation,
    lam: &[f64],
    mu: &[f64],
    z: &[f64],
    gamma: f64,
    backend: &dyn LinearSystemBackend,
) -> Result<NewtonStep, IpsError> {
    let first = eval.first_order()?;
    let second = eval.second_order()?;
    let n_x = first.fx.len();

    let lxx = sparse::sum((n_x, n_x), &[&second.fxx, &second.gxx, &second.hxx])?;
    let mu_over_z: Vec<f64> = mu.iter().zip(z).map(|(m, zi)| m / zi).collect();
    let m = sparse::add(&lxx, &sparse::scaled_gram(&first.hx, &mu_over_z))?;
    let kkt = sparse::kkt_matrix(&m, &first.gx)?;

    let lx = lagrangian_gradient(first, lam, mu);
    let weights: Vec<f64> = (0..mu.len())
        .map(|i| (gamma + mu[i] * eval.h[i]) / z[i])
        .collect();
    let hx_w = sparse::tr_mat_vec(&first.hx, &weights);

    let mut rhs = Vec::with_capacity(n_x + eval.g.len());
    rhs.extend(lx.iter().zip(&hx_w).map(|(l, h)| -(l + h)));
    rhs.extend(eval.g.iter().map(|g| -g));

    let mut dx = backend.solve(&kkt, &rhs)?;
    let dlam = dx.split_off(n_x);

    let hx_dx = sparse::mat_vec(&first.hx, &dx);
    let dz: Vec<f64> = (0..z.len())
        .map(|i| -eval.h[i] - z[i] - hx_dx[i])
        .collect();
    let dmu: Vec<f64> = (0..mu.len())
        .map(|i| -mu[i] + (gamma - mu[i] * dz[i]) / z[i])
        .collect();

    Ok(NewtonStep {
        dx,
        dlam,
        dz,
        dmu,
        lx,
        lxx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ips::problem::SecondOrder;
    use gridips_core::{FaerSolver, FaerSparseSolver, LinearSolveError};

    /// min x0² + x1² s.t. x0 + x1 = 1, evaluated at the origin.
    fn equality_qp_at_origin() -> Evaluation {
        Evaluation {
            f: 0.0,
            g: vec![-1.0],
            h: vec![],
            first: Some(FirstOrder {
                fx: vec![0.0, 0.0],
                gx: sparse::from_triplets((1, 2), vec![(0, 0, 1.0), (0, 1, 1.0)]),
                hx: sparse::zeros((0, 2)),
            }),
            second: Some(SecondOrder {
                fxx: sparse::diag(&[2.0, 2.0]),
                gxx: sparse::zeros((2, 2)),
                hxx: sparse::zeros((2, 2)),
            }),
        }
    }

    #[test]
    fn test_equality_qp_is_solved_in_one_step() {
        let step = newton_step(
            &equality_qp_at_origin(),
            &[0.0],
            &[],
            &[],
            0.0,
            &FaerSparseSolver,
        )
        .unwrap();
        assert!((step.dx[0] - 0.5).abs() < 1e-12);
        assert!((step.dx[1] - 0.5).abs() < 1e-12);
        // Stationarity: 2 x + λ = 0
        assert!((step.dlam[0] + 1.0).abs() < 1e-12);
        assert!(step.dz.is_empty() && step.dmu.is_empty());
    }

    #[test]
    fn test_recovered_slack_step_is_linearized_feasibility() {
        // min x² s.t. -x <= 0 at x = 1 with z = 1, mu = 1.
        let eval = Evaluation {
            f: 1.0,
            g: vec![],
            h: vec![-1.0],
            first: Some(FirstOrder {
                fx: vec![2.0],
                gx: sparse::zeros((0, 1)),
                hx: sparse::from_triplets((1, 1), vec![(0, 0, -1.0)]),
            }),
            second: Some(SecondOrder {
                fxx: sparse::diag(&[2.0]),
                gxx: sparse::zeros((1, 1)),
                hxx: sparse::zeros((1, 1)),
            }),
        };
        let gamma = 0.1;
        let step = newton_step(&eval, &[], &[1.0], &[1.0], gamma, &FaerSparseSolver).unwrap();
        // H + Hx dx + z + dz = 0
        assert!((-1.0 - step.dx[0] + 1.0 + step.dz[0]).abs() < 1e-12);
        // mu dz + z dmu = gamma - mu z
        assert!((step.dz[0] + step.dmu[0] - (gamma - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_dependent_constraints_are_singular() {
        let mut eval = equality_qp_at_origin();
        eval.g = vec![-1.0, -2.0];
        if let Some(first) = eval.first.as_mut() {
            first.gx = sparse::from_triplets(
                (2, 2),
                vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 1.0)],
            );
        }
        let err = newton_step(&eval, &[0.0, 0.0], &[], &[], 0.0, &FaerSolver).unwrap_err();
        assert!(matches!(
            err,
            IpsError::LinearSolve(LinearSolveError::Singular { .. })
        ));
    }
}
