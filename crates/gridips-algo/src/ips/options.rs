use crate::error::IpsError;
use serde::{Deserialize, Serialize};

/// Tuning knobs of the interior-point solver.
///
/// Deserializes from partial TOML/JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpsOptions {
    /// Outer iteration cap
    pub max_iter: usize,
    /// Bound on the feasibility, gradient and barrier conditions
    pub tol: f64,
    /// Least-squares multiplier start from a power-flow point instead of the cold start
    pub pf_init: bool,
    /// Initial trial step scale for step control, in (0, 1]
    pub trust: f64,
    /// 0 silent, 1 summary, 2 per iteration, 3 per iteration with vectors
    pub verbose: u8,
    /// Enable the rho-ratio safeguard on the Newton step
    pub step_control: bool,
    /// Trial steps before step control accepts whatever it has
    pub step_control_retries: usize,
    /// Stop with a non-converged result when the iterate turns non-finite
    pub nan_guard: bool,
}

impl Default for IpsOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-6,
            pf_init: false,
            trust: 0.9,
            verbose: 0,
            step_control: false,
            step_control_retries: 20,
            nan_guard: false,
        }
    }
}

impl IpsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_pf_init(mut self, enable: bool) -> Self {
        self.pf_init = enable;
        self
    }

    /// Enable step control with the given initial trust scale.
    pub fn with_step_control(mut self, trust: f64) -> Self {
        self.step_control = true;
        self.trust = trust;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_nan_guard(mut self, enable: bool) -> Self {
        self.nan_guard = enable;
        self
    }

    pub fn validate(&self) -> Result<(), IpsError> {
        if self.max_iter == 0 {
            return Err(IpsError::InvalidOptions("max_iter must be positive".into()));
        }
        if !(self.tol > 0.0) {
            return Err(IpsError::InvalidOptions(format!(
                "tol must be positive, got {}",
                self.tol
            )));
        }
        if !(self.trust > 0.0 && self.trust <= 1.0) {
            return Err(IpsError::InvalidOptions(format!(
                "trust must lie in (0, 1], got {}",
                self.trust
            )));
        }
        if self.verbose > 3 {
            return Err(IpsError::InvalidOptions(format!(
                "verbose must be 0..=3, got {}",
                self.verbose
            )));
        }
        if self.step_control && self.step_control_retries == 0 {
            return Err(IpsError::InvalidOptions(
                "step_control_retries must be positive when step control is on".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = IpsOptions::default();
        assert_eq!(opts.max_iter, 100);
        assert_eq!(opts.tol, 1e-6);
        assert_eq!(opts.trust, 0.9);
        assert_eq!(opts.step_control_retries, 20);
        assert!(!opts.pf_init && !opts.step_control && !opts.nan_guard);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let opts: IpsOptions = toml::from_str("max_iter = 40\nstep_control = true").unwrap();
        assert_eq!(opts.max_iter, 40);
        assert!(opts.step_control);
        assert_eq!(opts.tol, 1e-6);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(IpsOptions::new().with_max_iterations(0).validate().is_err());
        assert!(IpsOptions::new().with_tolerance(0.0).validate().is_err());
        assert!(IpsOptions::new().with_tolerance(f64::NAN).validate().is_err());
        assert!(IpsOptions::new().with_step_control(1.5).validate().is_err());
        assert!(IpsOptions::new().with_verbose(4).validate().is_err());
    }
}
