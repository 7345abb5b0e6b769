use crate::ips::IpsOptions;
use gridips_core::{GridIpsError, GridIpsResult, SolverKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Newton-Raphson settings of the power-flow seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowOptions {
    pub max_iter: usize,
    /// Largest accepted mismatch, per unit
    pub tol: f64,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            max_iter: 20,
            tol: 1e-8,
        }
    }
}

/// Linear penalty costs, in $/h per p.u. of violation, of the soft-limit slacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLimitCosts {
    pub branch: f64,
    pub voltage: f64,
}

/// Everything an AC-OPF run needs besides the network.
///
/// ```toml
/// linear_solver = "gauss"
///
/// [ips]
/// max_iter = 60
/// step_control = true
///
/// [soft_limits]
/// branch = 1e4
/// voltage = 1e5
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpfOptions {
    pub ips: IpsOptions,
    pub linear_solver: SolverKind,
    pub power_flow: PowerFlowOptions,
    /// Relax flow and voltage limits with penalized slacks
    pub soft_limits: Option<SoftLimitCosts>,
    /// Check the analytic derivatives at the starting point before solving
    pub verify_derivatives: bool,
}

impl OpfOptions {
    pub fn from_toml_str(text: &str) -> GridIpsResult<Self> {
        let options: Self = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> GridIpsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> GridIpsResult<()> {
        self.ips
            .validate()
            .map_err(|e| GridIpsError::Config(e.to_string()))?;
        if self.power_flow.max_iter == 0 || !(self.power_flow.tol > 0.0) {
            return Err(GridIpsError::Config(format!(
                "power flow needs max_iter > 0 and tol > 0, got {} and {}",
                self.power_flow.max_iter, self.power_flow.tol
            )));
        }
        if let Some(costs) = self.soft_limits {
            if costs.branch < 0.0 || costs.voltage < 0.0 {
                return Err(GridIpsError::Config(
                    "soft-limit costs must be non-negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let opts = OpfOptions::from_toml_str(
            r#"
            linear_solver = "gauss"

            [ips]
            max_iter = 60
            step_control = true

            [soft_limits]
            branch = 1e4
            voltage = 1e5
            "#,
        )
        .unwrap();
        assert_eq!(opts.linear_solver, SolverKind::Gauss);
        assert_eq!(opts.ips.max_iter, 60);
        assert!(opts.ips.step_control);
        assert_eq!(opts.ips.tol, 1e-6);
        assert_eq!(opts.power_flow, PowerFlowOptions::default());
        assert_eq!(opts.soft_limits.map(|c| c.voltage), Some(1e5));
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(OpfOptions::from_toml_str("").unwrap(), OpfOptions::default());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = OpfOptions::from_toml_str("[ips]\ntol = -1.0\n").unwrap_err();
        assert!(matches!(err, GridIpsError::Config(_)));
        let err = OpfOptions::from_toml_str("linear_solver = \"cholesky\"\n").unwrap_err();
        assert!(matches!(err, GridIpsError::Config(_)));
    }
}
