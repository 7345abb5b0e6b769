use super::convergence::ConvergenceCriteria;
use super::problem::Evaluation;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// How the outer iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Feasibility, stationarity and barrier conditions all met
    Converged,
    /// `max_iter` reached
    Exhausted,
    /// The Newton system could not be solved
    SingularAbort,
    /// The iterate or an evaluation became NaN or infinite (only with `nan_guard`)
    NonFinite,
    /// The cancellation hook asked to stop
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Termination::Converged => "converged",
            Termination::Exhausted => "iteration limit reached",
            Termination::SingularAbort => "singular Newton system",
            Termination::NonFinite => "non-finite iterate or evaluation",
            Termination::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Diagnostics of one completed outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub f: f64,
    pub error: f64,
    pub criteria: ConvergenceCriteria,
    /// Primal step length (x, z)
    pub alpha_p: f64,
    /// Dual step length (λ, μ)
    pub alpha_d: f64,
    /// Step-control scale, 1 when step control is off
    pub step_scale: f64,
    pub min_mu: f64,
    pub min_z: f64,
}

/// Result of an interior-point solve.
#[derive(Debug, Clone, Serialize)]
pub struct IpsSolution {
    pub x: Vec<f64>,
    /// Largest of the tested conditions at the last iterate
    pub error: f64,
    pub gamma: f64,
    pub lam: Vec<f64>,
    /// Last equality multiplier step
    pub dlam: Vec<f64>,
    pub mu: Vec<f64>,
    pub z: Vec<f64>,
    /// Gradient of the Lagrangian at the last iterate
    pub residuals: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub termination: Termination,
    /// One record per completed iteration
    pub trace: Vec<IterationRecord>,
    /// Criteria at the returned iterate
    pub criteria: ConvergenceCriteria,
    #[serde(skip)]
    pub elapsed: Duration,
    /// Second-order evaluation at the returned iterate, so callers can read
    /// the final constraint values and Jacobians without re-evaluating
    #[serde(skip)]
    pub evaluation: Option<Evaluation>,
}

impl IpsSolution {
    pub fn error_evolution(&self) -> Vec<f64> {
        self.trace.iter().map(|r| r.error).collect()
    }

    pub fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }

    /// ASCII plot of `log10(error)` per iteration, `height` rows tall.
    pub fn render_error_trace(&self, width: usize, height: usize) -> String {
        render_error_trace(&self.trace, width, height)
    }
}

impl fmt::Display for IpsSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} iterations (error {:.3e}, gamma {:.3e}, {:.3?})",
            self.termination, self.iterations, self.error, self.gamma, self.elapsed
        )
    }
}

/// ASCII plot of `log10(error)` over `trace`, `height` rows tall.
///
/// Iterations are bucketed into at most `width` columns, keeping the last
/// error of each bucket.
pub fn render_error_trace(trace: &[IterationRecord], width: usize, height: usize) -> String {
    let errors: Vec<f64> = trace
        .iter()
        .map(|r| r.error)
        .filter(|e| e.is_finite() && *e > 0.0)
        .map(f64::log10)
        .collect();
    if errors.is_empty() || width == 0 || height < 2 {
        return String::from("(no error trace)\n");
    }

    let columns = errors.len().min(width);
    let samples: Vec<f64> = (0..columns)
        .map(|c| errors[((c + 1) * errors.len()).div_ceil(columns) - 1])
        .collect();

    let top = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil();
    let bottom = samples.iter().cloned().fold(f64::INFINITY, f64::min).floor();
    let span = (top - bottom).max(1.0);

    let mut out = String::new();
    for row in 0..height {
        let level = top - span * row as f64 / (height - 1) as f64;
        let label = if row == 0 || row == height - 1 {
            format!("{:>6.1} |", level)
        } else {
            "       |".to_string()
        };
        out.push_str(&label);
        for &value in &samples {
            let cell = ((top - value) / span * (height - 1) as f64).round() as usize;
            out.push(if cell == row { '*' } else { ' ' });
        }
        out.push('\n');
    }
    out.push_str("       +");
    out.push_str(&"-".repeat(columns));
    out.push('\n');
    out.push_str(&format!(
        "        log10(error) over {} iterations\n",
        trace.len()
    ));
    out
}
