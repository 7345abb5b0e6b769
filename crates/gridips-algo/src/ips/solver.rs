use super::convergence::{barrier_parameter, ConvergenceCriteria, IterateView};
use super::init::{cold_start, power_flow_start, StartingPoint};
use super::kkt::{lagrangian_gradient, newton_step, NewtonStep};
use super::options::IpsOptions;
use super::problem::{DerivativeLevel, Evaluation, NonlinearProblem};
use super::solution::{IpsSolution, IterationRecord, Termination};
use super::step::{boundary_step, control_step, merit, StepControlInput, TAU};
use crate::error::IpsError;
use gridips_core::{FaerSparseSolver, LinearSolveError, LinearSystemBackend};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation hook, polled before every outer iteration.
pub type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Primal-dual interior-point solver for `min f(x) s.t. G(x) = 0, H(x) <= 0`.
///
/// The linear-solve backend is injected; [`FaerSparseSolver`] is the default.
///
/// ```ignore
/// let solver = InteriorPointSolver::new(IpsOptions::default().with_tolerance(1e-8))
///     .with_backend(SolverKind::Gauss.build_solver());
/// let solution = solver.solve(&problem, &x0)?;
/// if !solution.converged {
///     eprintln!("{}", solution);
/// }
/// ```
#[derive(Clone)]
pub struct InteriorPointSolver {
    options: IpsOptions,
    backend: Arc<dyn LinearSystemBackend>,
    cancel: Option<CancelCheck>,
}

impl fmt::Debug for InteriorPointSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteriorPointSolver")
            .field("options", &self.options)
            .field("backend", &self.backend.name())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Default for InteriorPointSolver {
    fn default() -> Self {
        Self::new(IpsOptions::default())
    }
}

/// Primal-dual state owned by one solve.
struct Iterate {
    x: Vec<f64>,
    lam: Vec<f64>,
    mu: Vec<f64>,
    z: Vec<f64>,
    gamma: f64,
}

impl Iterate {
    fn apply(&mut self, step: &NewtonStep, alpha_p: f64, alpha_d: f64) {
        axpy(&mut self.x, alpha_p, &step.dx);
        axpy(&mut self.z, alpha_p, &step.dz);
        axpy(&mut self.lam, alpha_d, &step.dlam);
        axpy(&mut self.mu, alpha_d, &step.dmu);
        self.gamma = barrier_parameter(&self.mu, &self.z);
    }

    fn is_finite(&self) -> bool {
        [&self.x, &self.lam, &self.mu, &self.z]
            .iter()
            .all(|v| v.iter().all(|x| x.is_finite()))
    }

    fn criteria(&self, eval: &Evaluation, lx: &[f64], f_prev: f64) -> ConvergenceCriteria {
        ConvergenceCriteria::compute(&IterateView {
            x: &self.x,
            lam: &self.lam,
            mu: &self.mu,
            z: &self.z,
            g: &eval.g,
            h: &eval.h,
            lx,
            f: eval.f,
            f_prev,
            gamma: self.gamma,
        })
    }
}

fn axpy(y: &mut [f64], alpha: f64, x: &[f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

fn scale_in_place(v: &mut [f64], factor: f64) {
    for value in v {
        *value *= factor;
    }
}

fn min_or_inf(v: &[f64]) -> f64 {
    v.iter().cloned().fold(f64::INFINITY, f64::min)
}

impl InteriorPointSolver {
    pub fn new(options: IpsOptions) -> Self {
        Self {
            options,
            backend: Arc::new(FaerSparseSolver),
            cancel: None,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn LinearSystemBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Stop early, with [`Termination::Cancelled`], once `check` returns true.
    pub fn with_cancel_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.cancel = Some(Arc::new(check));
        self
    }

    pub fn options(&self) -> &IpsOptions {
        &self.options
    }

    pub fn backend(&self) -> &dyn LinearSystemBackend {
        self.backend.as_ref()
    }

    /// Run the interior-point iteration from `x0`.
    ///
    /// Non-convergence, a singular Newton system, a non-finite iterate or
    /// evaluation (with `nan_guard`) and cancellation all return `Ok` with `converged = false`
    /// and the matching [`Termination`]. Errors are reserved for malformed
    /// problems, invalid options, non-singular backend failures and a breach
    /// of `μ > 0`, `z > 0`.
    pub fn solve<P: NonlinearProblem + ?Sized>(
        &self,
        problem: &P,
        x0: &[f64],
    ) -> Result<IpsSolution, IpsError> {
        let opts = &self.options;
        opts.validate()?;
        let dims = problem.dimensions();
        if x0.len() != dims.n_x {
            return Err(IpsError::DimensionMismatch {
                what: "x0",
                expected: dims.n_x.to_string(),
                actual: x0.len().to_string(),
            });
        }

        let started = Instant::now();
        let gamma0 = 1.0;
        let start = if opts.pf_init {
            power_flow_start(problem, x0, gamma0, self.backend.as_ref())
        } else {
            cold_start(problem, x0, gamma0)
        };
        let StartingPoint { lam, mu, z } = match start {
            Ok(start) => start,
            // the guard below reports the non-finite evaluation at x0
            Err(IpsError::LinearSolve(LinearSolveError::NonFinite)) if opts.nan_guard => {
                cold_start(problem, x0, gamma0)?
            }
            Err(err) => return Err(err),
        };
        let mut it = Iterate {
            x: x0.to_vec(),
            lam,
            mu,
            z,
            gamma: gamma0,
        };
        check_positive(0, &it)?;

        let mut eval = problem.evaluate(&it.x, &it.mu, &it.lam, DerivativeLevel::SecondOrder);
        eval.check(dims, DerivativeLevel::SecondOrder)?;
        let mut lx = lagrangian_gradient(eval.first_order()?, &it.lam, &it.mu);
        let mut criteria = it.criteria(&eval, &lx, eval.f);

        let mut trace: Vec<IterationRecord> = Vec::new();
        let mut dlam = vec![0.0; dims.n_eq];
        let mut iterations = 0;
        let mut termination = Termination::Exhausted;
        if opts.nan_guard && !(it.is_finite() && is_finite_point(&eval, &criteria)) {
            warn!("non-finite starting point, stopping");
            termination = Termination::NonFinite;
        }

        while termination == Termination::Exhausted && iterations < opts.max_iter {
            if self.cancel.as_ref().is_some_and(|check| check()) {
                warn!(iterations, "interior-point solve cancelled");
                termination = Termination::Cancelled;
                break;
            }

            let mut step = match newton_step(
                &eval,
                &it.lam,
                &it.mu,
                &it.z,
                it.gamma,
                self.backend.as_ref(),
            ) {
                Ok(step) => step,
                Err(IpsError::LinearSolve(err)) if err.is_singular() => {
                    warn!(
                        iteration = iterations + 1,
                        backend = self.backend.name(),
                        "singular Newton system, stopping"
                    );
                    termination = Termination::SingularAbort;
                    break;
                }
                Err(IpsError::LinearSolve(LinearSolveError::NonFinite)) if opts.nan_guard => {
                    warn!(iteration = iterations + 1, "non-finite Newton system, stopping");
                    termination = Termination::NonFinite;
                    break;
                }
                Err(err) => return Err(err),
            };

            let mut step_scale = 1.0;
            if opts.step_control {
                let l0 = merit(eval.f, &eval.g, &eval.h, &it.lam, &it.mu, &it.z, it.gamma);
                let input = StepControlInput {
                    x: &it.x,
                    dx: &step.dx,
                    lam: &it.lam,
                    mu: &it.mu,
                    z: &it.z,
                    gamma: it.gamma,
                    l0,
                    lx: &step.lx,
                    lxx: &step.lxx,
                };
                let outcome = control_step(problem, &input, opts.trust, opts.step_control_retries)?;
                step_scale = outcome.scale;
                scale_in_place(&mut step.dx, step_scale);
                scale_in_place(&mut step.dz, step_scale);
                scale_in_place(&mut step.dlam, step_scale);
                scale_in_place(&mut step.dmu, step_scale);
            }

            let alpha_p = boundary_step(&it.z, &step.dz, TAU);
            let alpha_d = boundary_step(&it.mu, &step.dmu, TAU);
            it.apply(&step, alpha_p, alpha_d);
            dlam = step.dlam;
            iterations += 1;

            if opts.nan_guard && !it.is_finite() {
                warn!(iteration = iterations, "non-finite iterate, stopping");
                termination = Termination::NonFinite;
                break;
            }
            check_positive(iterations, &it)?;

            let f_prev = eval.f;
            eval = problem.evaluate(&it.x, &it.mu, &it.lam, DerivativeLevel::SecondOrder);
            eval.check(dims, DerivativeLevel::SecondOrder)?;
            lx = lagrangian_gradient(eval.first_order()?, &it.lam, &it.mu);
            criteria = it.criteria(&eval, &lx, f_prev);

            let record = IterationRecord {
                iteration: iterations,
                f: eval.f,
                error: criteria.error(),
                criteria,
                alpha_p,
                alpha_d,
                step_scale,
                min_mu: min_or_inf(&it.mu),
                min_z: min_or_inf(&it.z),
            };
            log_iteration(opts.verbose, &record, &it);
            trace.push(record);

            if opts.nan_guard && !is_finite_point(&eval, &criteria) {
                warn!(iteration = iterations, "non-finite evaluation, stopping");
                termination = Termination::NonFinite;
                break;
            }
            if criteria.converged(opts.tol) {
                termination = Termination::Converged;
                break;
            }
        }

        let final_f = eval.f;
        let solution = IpsSolution {
            error: criteria.error(),
            gamma: it.gamma,
            converged: termination == Termination::Converged,
            iterations,
            termination,
            x: it.x,
            lam: it.lam,
            dlam,
            mu: it.mu,
            z: it.z,
            residuals: lx,
            trace,
            criteria,
            elapsed: started.elapsed(),
            evaluation: Some(eval),
        };

        if opts.verbose > 0 {
            info!(
                converged = solution.converged,
                iterations = solution.iterations,
                error = solution.error,
                f = final_f,
                elapsed_ms = solution.elapsed.as_secs_f64() * 1e3,
                "interior-point solve finished: {}",
                solution.termination
            );
        }
        Ok(solution)
    }
}

/// Solve with default backend and no cancellation.
pub fn solve_with<P: NonlinearProblem + ?Sized>(
    problem: &P,
    x0: &[f64],
    options: &IpsOptions,
) -> Result<IpsSolution, IpsError> {
    InteriorPointSolver::new(options.clone()).solve(problem, x0)
}

fn is_finite_point(eval: &Evaluation, criteria: &ConvergenceCriteria) -> bool {
    eval.is_finite() && criteria.error().is_finite()
}

fn check_positive(iteration: usize, it: &Iterate) -> Result<(), IpsError> {
    for (what, values) in [("mu", &it.mu), ("z", &it.z)] {
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, &v)| v <= 0.0) {
            return Err(IpsError::InvariantViolation {
                iteration,
                what,
                index,
                value,
            });
        }
    }
    Ok(())
}

fn log_iteration(verbose: u8, record: &IterationRecord, it: &Iterate) {
    let c = &record.criteria;
    if verbose >= 2 {
        info!(
            iteration = record.iteration,
            f = record.f,
            gamma = c.gamma,
            error = record.error,
            feascond = c.feascond,
            gradcond = c.gradcond,
            alpha_p = record.alpha_p,
            alpha_d = record.alpha_d,
            "ips iteration"
        );
        if verbose >= 3 {
            info!(x = ?it.x, lam = ?it.lam, mu = ?it.mu, z = ?it.z, "ips iterate");
        }
    } else {
        debug!(
            iteration = record.iteration,
            f = record.f,
            gamma = c.gamma,
            error = record.error,
            feascond = c.feascond,
            gradcond = c.gradcond,
            alpha_p = record.alpha_p,
            alpha_d = record.alpha_d,
            "ips iteration"
        );
    }
}
