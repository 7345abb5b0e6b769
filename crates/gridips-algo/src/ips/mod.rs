//! # Primal-dual interior-point solver
//!
//! Solves smooth nonlinear programs of the form
//!
//! ```text
//! min  f(x)
//! s.t. G(x) = 0        (n_eq equalities)
//!      H(x) <= 0       (n_ineq inequalities)
//! ```
//!
//! by applying Newton's method to the perturbed KKT conditions, with slacks
//! `z > 0` turning the inequalities into `H(x) + z = 0` and a barrier
//! parameter `γ` driven to zero.
//!
//! ## Iteration
//!
//! Each outer iteration:
//!
//! 1. Builds the reduced KKT system from the cached second-order evaluation
//!    and solves it for `(dx, dλ)` with the injected [`LinearSystemBackend`]
//!    (see [`kkt`] for the elimination).
//! 2. Optionally scales the step by the rho-ratio step control.
//! 3. Takes primal and dual step lengths from the fraction-to-the-boundary
//!    rule with `τ = 0.99995`, so `z` and `μ` stay strictly positive.
//! 4. Updates `γ = 0.1 μ·z / n_ineq` and re-evaluates the problem.
//! 5. Tests the scaled feasibility, stationarity and barrier conditions.
//!
//! ## Starting point
//!
//! The cold start uses unit slacks and multipliers. With `pf_init` the solver
//! trusts `x0` as nearly feasible (a converged power flow, typically), sizes
//! slacks from `H(x0)` and fits `λ` by least squares.
//!
//! ## Failure modes
//!
//! Non-convergence is data, not an error: the returned [`IpsSolution`]
//! carries `converged = false` and a [`Termination`] reason. Errors are kept
//! for malformed problem output and broken invariants.
//!
//! ## Example
//!
//! ```ignore
//! use gridips_algo::ips::{InteriorPointSolver, IpsOptions};
//!
//! let solver = InteriorPointSolver::new(IpsOptions::default().with_step_control(0.9));
//! let solution = solver.solve(&my_problem, &x0)?;
//! println!("{solution}");
//! ```
//!
//! [`LinearSystemBackend`]: gridips_core::LinearSystemBackend

mod convergence;
pub mod finite_diff;
mod init;
mod kkt;
mod options;
mod problem;
mod solution;
mod solver;
mod step;

pub use convergence::{barrier_parameter, ConvergenceCriteria, IterateView};
pub use finite_diff::{verify_derivatives, BlockError, DerivativeReport};
pub use options::IpsOptions;
pub use problem::{
    DerivativeLevel, Evaluation, FirstOrder, NonlinearProblem, ProblemDimensions, SecondOrder,
};
pub use solution::{render_error_trace, IpsSolution, IterationRecord, Termination};
pub use solver::{solve_with, CancelCheck, InteriorPointSolver};
pub use step::{boundary_step, TAU};
