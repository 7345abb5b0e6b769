//! Step-length rules: fraction to the boundary and the optional step control.

use super::problem::{DerivativeLevel, NonlinearProblem};
use crate::error::IpsError;
use gridips_core::sparse;
use sprs::CsMat;
use tracing::{trace, warn};

/// Safety factor of the fraction-to-the-boundary rule.
pub const TAU: f64 = 0.99995;

/// Half-width of the accepted band for the actual/predicted ratio.
const RHO_BAND: f64 = 0.05;

/// Largest `alpha <= 1` that keeps `v + alpha * dv` strictly positive, damped by `tau`.
///
/// Only components with `dv < 0` restrict the step; without any the full
/// step is taken. Requires `v > 0`, in which case the result lies in (0, 1].
pub fn boundary_step(v: &[f64], dv: &[f64], tau: f64) -> f64 {
    let ratio = v
        .iter()
        .zip(dv)
        .filter(|(_, &d)| d < 0.0)
        .map(|(&vi, &di)| vi / (-di + 1e-15))
        .fold(f64::INFINITY, f64::min);

    if ratio.is_finite() {
        (tau * ratio).min(1.0)
    } else {
        1.0
    }
}

/// Barrier-augmented Lagrangian `f + λ·G + μ·(H + z) − γ Σ ln z`.
pub(crate) fn merit(
    f: f64,
    g: &[f64],
    h: &[f64],
    lam: &[f64],
    mu: &[f64],
    z: &[f64],
    gamma: f64,
) -> f64 {
    let eq = sparse::dot(lam, g);
    let ineq: f64 = mu.iter().zip(h.iter().zip(z)).map(|(m, (hi, zi))| m * (hi + zi)).sum();
    let barrier: f64 = z.iter().map(|zi| zi.ln()).sum();
    f + eq + ineq - gamma * barrier
}

/// Everything step control needs from the current iteration.
pub(crate) struct StepControlInput<'a> {
    pub x: &'a [f64],
    pub dx: &'a [f64],
    pub lam: &'a [f64],
    pub mu: &'a [f64],
    pub z: &'a [f64],
    pub gamma: f64,
    /// Merit value at `x`
    pub l0: f64,
    /// Gradient of the Lagrangian at `x`
    pub lx: &'a [f64],
    /// Hessian of the Lagrangian at `x`
    pub lxx: &'a CsMat<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepControlOutcome {
    /// Factor applied to `dx`, `dz`, `dlam` and `dmu`
    pub scale: f64,
    pub attempts: usize,
    /// False when every trial fell outside the band
    pub accepted: bool,
}

/// Shrink the Newton step until the model predicts the merit change well.
///
/// Starting at `trust`, each trial evaluates the merit at `x + alpha dx` and
/// compares the actual change with the quadratic model
/// `lxᵗ dx₁ + ½ dx₁ᵗ lxx dx₁`. A ratio inside `1 ± 0.05` accepts `alpha`;
/// otherwise `alpha` is halved. After `retries` trials the last `alpha` is used.
pub(crate) fn control_step<P: NonlinearProblem + ?Sized>(
    problem: &P,
    input: &StepControlInput<'_>,
    trust: f64,
    retries: usize,
) -> Result<StepControlOutcome, IpsError> {
    let dims = problem.dimensions();
    let mut alpha = trust;
    let mut x1 = vec![0.0; input.x.len()];
    let mut dx1 = vec![0.0; input.dx.len()];

    for attempt in 1..=retries {
        for i in 0..dx1.len() {
            dx1[i] = alpha * input.dx[i];
            x1[i] = input.x[i] + dx1[i];
        }

        let trial = problem.evaluate(&x1, input.mu, input.lam, DerivativeLevel::Values);
        trial.check(dims, DerivativeLevel::Values)?;
        let l1 = merit(
            trial.f, &trial.g, &trial.h, input.lam, input.mu, input.z, input.gamma,
        );

        let predicted = sparse::dot(input.lx, &dx1) + 0.5 * sparse::quad_form(input.lxx, &dx1);
        let actual = l1 - input.l0;

        // A vanishing model change leaves nothing to compare against.
        let magnitude = 1.0 + input.l0.abs();
        if predicted.abs() <= 1e-14 * magnitude && actual.abs() <= 1e-12 * magnitude {
            return Ok(StepControlOutcome {
                scale: alpha,
                attempts: attempt,
                accepted: true,
            });
        }

        let rho = actual / predicted;
        trace!(attempt, alpha, rho, "step control trial");
        if rho > 1.0 - RHO_BAND && rho < 1.0 + RHO_BAND {
            return Ok(StepControlOutcome {
                scale: alpha,
                attempts: attempt,
                accepted: true,
            });
        }
        if attempt < retries {
            alpha /= 2.0;
        }
    }

    warn!(retries, alpha, "step control exhausted its trials, taking the last one");
    Ok(StepControlOutcome {
        scale: alpha,
        attempts: retries,
        accepted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_step_without_decreasing_components() {
        assert_eq!(boundary_step(&[1.0, 2.0], &[0.5, 0.0], TAU), 1.0);
        assert_eq!(boundary_step(&[], &[], TAU), 1.0);
    }

    #[test]
    fn test_step_is_damped_before_the_boundary() {
        // z = 1, dz = -2 would hit zero at alpha = 0.5.
        let alpha = boundary_step(&[1.0], &[-2.0], TAU);
        assert!(alpha < 0.5 && alpha > 0.49);
        assert!(1.0 + alpha * -2.0 > 0.0);
    }

    #[test]
    fn test_small_decrease_still_takes_full_step() {
        assert_eq!(boundary_step(&[1.0], &[-0.1], TAU), 1.0);
    }

    #[test]
    fn test_merit_includes_barrier() {
        let l = merit(1.0, &[2.0], &[-1.0], &[0.5], &[1.0], &[1.0], 0.3);
        // 1 + 0.5*2 + 1*(-1 + 1) - 0.3*ln(1)
        assert!((l - 2.0).abs() < 1e-15);
    }

    proptest! {
        #[test]
        fn prop_boundary_step_is_admissible(
            pairs in proptest::collection::vec((1e-8f64..1e3, -1e9f64..1e3), 1..30)
        ) {
            let v: Vec<f64> = pairs.iter().map(|p| p.0).collect();
            let dv: Vec<f64> = pairs.iter().map(|p| p.1).collect();
            let alpha = boundary_step(&v, &dv, TAU);
            prop_assert!(alpha > 0.0 && alpha <= 1.0);
            for (vi, di) in v.iter().zip(&dv) {
                prop_assert!(vi + alpha * di > 0.0);
            }
        }
    }
}
