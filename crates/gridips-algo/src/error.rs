//! Error types for the solver and the AC-OPF model.

use gridips_core::{GridIpsError, LinearSolveError};
use thiserror::Error;

/// Structural or internal failures of the interior-point solver.
///
/// Numerical non-convergence is not an error: it is reported through
/// `IpsSolution::converged`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IpsError {
    /// The problem returned a vector or matrix of the wrong size.
    #[error("problem returned {what} of size {actual}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// The problem skipped derivatives the solver asked for.
    #[error("problem did not return the requested {0} derivatives")]
    MissingDerivatives(&'static str),

    /// A slack or inequality multiplier left the positive orthant.
    #[error("iteration {iteration}: {what}[{index}] = {value} is not strictly positive")]
    InvariantViolation {
        iteration: usize,
        what: &'static str,
        index: usize,
        value: f64,
    },

    /// Linear solve failure other than a singular Newton system.
    #[error("linear solve failed: {0}")]
    LinearSolve(#[from] LinearSolveError),

    #[error("invalid solver options: {0}")]
    InvalidOptions(String),
}

/// Inconsistent or unusable network data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    #[error("network has no buses")]
    NoBuses,

    #[error("duplicate bus id {0}")]
    DuplicateBus(usize),

    #[error("{element} references unknown bus {bus}")]
    UnknownBus { element: String, bus: usize },

    #[error("branch {0} has zero impedance")]
    ZeroImpedance(usize),

    #[error("no slack bus: flag one bus or add an in-service generator")]
    NoSlack,

    #[error("{element}: {message}")]
    InvalidLimits { element: String, message: String },
}

/// Failure of an AC-OPF or power-flow run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OpfError {
    #[error("network data: {0}")]
    Network(#[from] NetworkError),

    #[error("interior-point solver: {0}")]
    Solver(#[from] IpsError),

    #[error("power flow: {0}")]
    PowerFlow(String),
}

impl From<LinearSolveError> for OpfError {
    fn from(err: LinearSolveError) -> Self {
        OpfError::Solver(IpsError::LinearSolve(err))
    }
}

impl From<NetworkError> for GridIpsError {
    fn from(err: NetworkError) -> Self {
        GridIpsError::Validation(err.to_string())
    }
}

impl From<OpfError> for GridIpsError {
    fn from(err: OpfError) -> Self {
        match err {
            OpfError::Network(inner) => inner.into(),
            other => GridIpsError::Solver(other.to_string()),
        }
    }
}
