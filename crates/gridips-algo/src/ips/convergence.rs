//! Termination measures of the primal-dual iteration.

use gridips_core::sparse::{dot, norm_inf};
use serde::Serialize;

/// Scaled optimality measures at one iterate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvergenceCriteria {
    /// `max(‖G‖∞, max H) / (1 + max(‖x‖∞, ‖z‖∞))`
    pub feascond: f64,
    /// `‖∇L‖∞ / (1 + max(‖λ‖∞, ‖μ‖∞))`
    pub gradcond: f64,
    /// `μ·z / (1 + ‖x‖∞)`, reported only
    pub ccond: f64,
    /// `|f − f_prev| / (1 + |f_prev|)`, reported only
    pub ocond: f64,
    /// Barrier parameter
    pub gamma: f64,
}

/// Inputs of [`ConvergenceCriteria::compute`], borrowed from the current iterate.
pub struct IterateView<'a> {
    pub x: &'a [f64],
    pub lam: &'a [f64],
    pub mu: &'a [f64],
    pub z: &'a [f64],
    pub g: &'a [f64],
    pub h: &'a [f64],
    /// Gradient of the Lagrangian
    pub lx: &'a [f64],
    pub f: f64,
    pub f_prev: f64,
    pub gamma: f64,
}

impl ConvergenceCriteria {
    pub fn compute(it: &IterateView<'_>) -> Self {
        let max_h = it.h.iter().cloned().fold(0.0, nan_max);
        let x_norm = norm_inf(it.x);
        let feascond = nan_max(norm_inf(it.g), max_h) / (1.0 + nan_max(x_norm, norm_inf(it.z)));
        let gradcond = norm_inf(it.lx) / (1.0 + nan_max(norm_inf(it.lam), norm_inf(it.mu)));
        let ccond = dot(it.mu, it.z) / (1.0 + x_norm);
        let ocond = (it.f - it.f_prev).abs() / (1.0 + it.f_prev.abs());

        Self {
            feascond,
            gradcond,
            ccond,
            ocond,
            gamma: it.gamma,
        }
    }

    /// The reported error: the largest of the three tested conditions.
    pub fn error(&self) -> f64 {
        nan_max(nan_max(self.feascond, self.gradcond), self.gamma)
    }

    /// Feasibility, stationarity and barrier all below `tol`. False on NaN.
    pub fn converged(&self, tol: f64) -> bool {
        self.feascond < tol && self.gradcond < tol && self.gamma < tol
    }
}

/// `f64::max` drops NaN operands; a NaN residual must not look converged.
fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Barrier parameter `0.1 μ·z / n_ineq`, zero without inequalities.
pub fn barrier_parameter(mu: &[f64], z: &[f64]) -> f64 {
    if mu.is_empty() {
        0.0
    } else {
        0.1 * dot(mu, z) / mu.len() as f64
    }
}
