use clap::{Args, Parser, Subcommand, ValueHint};
use gridips_core::SolverKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridips", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run AC optimal power flow on a JSON case
    Opf(OpfArgs),
    /// Run a Newton-Raphson power flow on a JSON case
    Pf {
        /// Path to the network case (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        case: PathBuf,
        /// Option file (TOML); only its linear_solver and power_flow tables are used
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
        /// Write the solution as JSON
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    /// List the linear-solve backends
    Solvers,
}

#[derive(Args, Debug, Default)]
pub struct OpfArgs {
    /// Path to the network case (JSON)
    #[arg(value_hint = ValueHint::FilePath)]
    pub case: PathBuf,
    /// Option file (TOML); flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Outer iteration cap
    #[arg(long)]
    pub max_iter: Option<usize>,
    /// Convergence tolerance
    #[arg(long)]
    pub tol: Option<f64>,
    /// Seed the solver with a power flow
    #[arg(long)]
    pub pf_init: bool,
    /// Enable step control
    #[arg(long)]
    pub step_control: bool,
    /// Initial step-control trust scale, in (0, 1]
    #[arg(long)]
    pub trust: Option<f64>,
    /// Linear-solve backend (faer-sparse, faer, gauss)
    #[arg(long)]
    pub solver: Option<SolverKind>,
    /// Stop on a non-finite iterate or evaluation instead of failing
    #[arg(long)]
    pub nan_guard: bool,
    /// Check analytic derivatives at the starting point
    #[arg(long)]
    pub verify_derivatives: bool,
    /// Print an ASCII plot of the error per iteration
    #[arg(long)]
    pub plot_error: bool,
    /// Write the result as JSON
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}
