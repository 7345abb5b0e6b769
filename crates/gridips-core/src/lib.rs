//! # gridips-core: numerical plumbing for the gridips solvers
//!
//! Provides the pieces the interior-point solver treats as external
//! capabilities:
//!
//! - [`sparse`] - sparse matrix assembly and products on `sprs::CsMat`
//! - [`solver`] - the [`LinearSystemBackend`] trait with sparse and dense LU backends
//!   and the [`SolverKind`] factory
//! - [`diagnostics`] - warning collection for post-solve checks
//! - [`error`] - [`LinearSolveError`] and the unified [`GridIpsError`]
//!
//! ## Quick Start
//!
//! ```rust
//! use gridips_core::{sparse, SolverKind};
//!
//! let a = sparse::from_triplets((2, 2), vec![(0, 0, 4.0), (1, 1, 2.0)]);
//! let backend = SolverKind::default().build_solver();
//! let x = backend.solve(&a, &[8.0, 2.0]).unwrap();
//! assert!((x[0] - 2.0).abs() < 1e-12);
//! ```

pub mod diagnostics;
pub mod error;
pub mod solver;
pub mod sparse;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{GridIpsError, GridIpsResult, LinearSolveError};
pub use solver::{FaerSolver, FaerSparseSolver, GaussSolver, LinearSystemBackend, SolverKind};
pub use sprs::CsMat;
