//! Error types shared across the gridips crates
//!
//! [`LinearSolveError`] is the contract of every linear-solve backend: a
//! singular system is reported as its own variant, never as a vector of
//! garbage. [`GridIpsError`] is the unified boundary error that the
//! domain-specific errors of `gridips-algo` convert into.
//!
//! # Example
//!
//! ```ignore
//! use gridips_core::{GridIpsError, GridIpsResult};
//!
//! fn run(path: &str) -> GridIpsResult<()> {
//!     let network = AcNetwork::from_json_file(path)?;
//!     solve_ac_opf(&network, &OpfOptions::default())?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Failure of a linear-solve backend on `A x = b`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearSolveError {
    /// Zero pivot, or a solution whose backward error is unacceptable.
    #[error("singular matrix of dimension {dim}")]
    Singular { dim: usize },

    #[error("dimension mismatch: matrix is {rows}x{cols}, rhs has {rhs} entries")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },

    /// The system itself holds NaN or Inf entries.
    #[error("matrix or right-hand side contains non-finite values")]
    NonFinite,

    /// The backend failed for a reason other than singularity.
    #[error("factorization failed: {0}")]
    Factorization(String),
}

impl LinearSolveError {
    pub fn is_singular(&self) -> bool {
        matches!(self, LinearSolveError::Singular { .. })
    }
}

/// Unified error type at API boundaries.
#[derive(Error, Debug)]
pub enum GridIpsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type GridIpsResult<T> = Result<T, GridIpsError>;

impl From<LinearSolveError> for GridIpsError {
    fn from(err: LinearSolveError) -> Self {
        GridIpsError::Solver(err.to_string())
    }
}

impl From<serde_json::Error> for GridIpsError {
    fn from(err: serde_json::Error) -> Self {
        GridIpsError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for GridIpsError {
    fn from(err: toml::de::Error) -> Self {
        GridIpsError::Config(err.to_string())
    }
}

impl From<String> for GridIpsError {
    fn from(s: String) -> Self {
        GridIpsError::Other(s)
    }
}
