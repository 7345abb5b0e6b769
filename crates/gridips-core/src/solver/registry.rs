use super::backend::{FaerSolver, FaerSparseSolver, GaussSolver, LinearSystemBackend};
use crate::error::GridIpsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Closed set of linear-solve backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    /// Sparse LU, one factorization per Newton step
    #[default]
    FaerSparse,
    /// Dense LU on a copy of the system
    Faer,
    /// Dense reference elimination
    Gauss,
}

impl SolverKind {
    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            SolverKind::FaerSparse => Arc::new(FaerSparseSolver),
            SolverKind::Faer => Arc::new(FaerSolver),
            SolverKind::Gauss => Arc::new(GaussSolver),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["faer-sparse", "faer", "gauss"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::FaerSparse => "faer-sparse",
            SolverKind::Faer => "faer",
            SolverKind::Gauss => "gauss",
        }
    }
}

impl FromStr for SolverKind {
    type Err = GridIpsError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "faer-sparse" | "sparse" | "default" => Ok(SolverKind::FaerSparse),
            "faer" | "dense" => Ok(SolverKind::Faer),
            "gauss" => Ok(SolverKind::Gauss),
            other => Err(GridIpsError::Config(format!(
                "unknown linear solver '{}'; supported values: {}",
                other,
                SolverKind::available().join(", ")
            ))),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::diag;

    #[test]
    fn solver_kind_parsing_supports_all_engines() {
        assert_eq!("gauss".parse::<SolverKind>().unwrap(), SolverKind::Gauss);
        assert_eq!("FAER".parse::<SolverKind>().unwrap(), SolverKind::Faer);
        assert_eq!("dense".parse::<SolverKind>().unwrap(), SolverKind::Faer);
        assert_eq!(
            "default".parse::<SolverKind>().unwrap(),
            SolverKind::FaerSparse
        );
        assert_eq!(SolverKind::default(), SolverKind::FaerSparse);
        assert!(matches!(
            "umfpack".parse::<SolverKind>(),
            Err(GridIpsError::Config(_))
        ));
    }

    #[test]
    fn solver_kind_names_round_trip() {
        for name in SolverKind::available() {
            let kind: SolverKind = name.parse().unwrap();
            assert_eq!(kind.as_str(), *name);
            assert_eq!(kind.build_solver().name(), *name);
        }
    }

    #[test]
    fn solver_backend_options_solve_diagonal_system() {
        let matrix = diag(&[2.0, 3.0]);
        let rhs = vec![4.0, 6.0];
        for name in SolverKind::available() {
            let backend = name.parse::<SolverKind>().unwrap().build_solver();
            let x = backend.solve(&matrix, &rhs).unwrap();
            assert!((x[0] - 2.0).abs() < 1e-14 && (x[1] - 2.0).abs() < 1e-14);
        }
    }

    #[test]
    fn solver_kind_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Holder {
            solver: SolverKind,
        }
        let holder: Holder = toml::from_str("solver = \"gauss\"").unwrap();
        assert_eq!(holder.solver, SolverKind::Gauss);
        let holder: Holder = toml::from_str("solver = \"faer-sparse\"").unwrap();
        assert_eq!(holder.solver, SolverKind::FaerSparse);
    }
}
