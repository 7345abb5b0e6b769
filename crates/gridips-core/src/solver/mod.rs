//! Pluggable linear-solve backends for Newton steps.

pub mod backend;
pub mod registry;

pub use backend::{FaerSolver, FaerSparseSolver, GaussSolver, LinearSystemBackend};
pub use registry::SolverKind;
