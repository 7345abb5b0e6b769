//! # AC Optimal Power Flow on the interior-point solver
//!
//! The AC-OPF answers: *given a network and its loads, what is the cheapest
//! generator dispatch that respects the physics and every equipment limit?*
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  min   Σ_g c0 + c1 Pg + c2 Pg²                                          │
//! │                                                                         │
//! │  s.t.  V ⊙ conj(Ybus V) + Sd − Cg Sg = 0     power balance per bus      │
//! │        Va[slack] = 0                         angle reference            │
//! │        |Sf|², |St|² ≤ rate²                  thermal limits             │
//! │        Vmin ≤ Vm ≤ Vmax                      voltage limits             │
//! │        Pmin ≤ Pg ≤ Pmax, Qmin ≤ Qg ≤ Qmax    generator capability       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pipeline
//!
//! 1. [`AcNetwork`] is read from JSON and validated into a [`NetworkIndex`]
//! 2. [`Admittances`] builds the π-model bus and branch admittances
//! 3. [`AcOpfProblem`] exposes the model through
//!    [`NonlinearProblem`](crate::ips::NonlinearProblem) with analytic
//!    first and second derivatives
//! 4. The starting point is either a flat start or, with `pf_init`, a
//!    Newton-Raphson power flow ([`solve_power_flow`])
//! 5. [`solve_ac_opf`] runs the interior-point solver and maps the result to
//!    MW, MVAr, degrees and $/MWh, with post-solve [`Diagnostics`]
//!
//! ## Soft limits
//!
//! With [`SoftLimitCosts`] set, thermal and voltage limits get non-negative
//! slacks priced linearly in the objective, so an overloaded case still
//! yields a dispatch plus the size of each violation.
//!
//! ## Example
//!
//! ```ignore
//! use gridips_algo::opf::{solve_ac_opf, AcNetwork, OpfOptions};
//!
//! let network = AcNetwork::from_json_file("case5.json")?;
//! let result = solve_ac_opf(&network, &OpfOptions::default())?;
//! println!("{result}");
//! ```
//!
//! [`Diagnostics`]: gridips_core::Diagnostics

mod admittance;
mod driver;
mod network;
mod options;
mod power_flow;
mod problem;

pub use admittance::{Admittances, BranchAdmittance, PowerTerm};
pub use driver::{
    flat_start, power_flow_start, run_power_flow, solve_ac_opf, solve_ac_opf_with, AcOpfResult,
    BranchResult, BusResult, GeneratorResult,
};
pub use network::{AcNetwork, Branch, Bus, Generator, NetworkIndex};
pub use options::{OpfOptions, PowerFlowOptions, SoftLimitCosts};
pub use power_flow::{solve_power_flow, PowerFlowSolution};
pub use problem::{AcOpfProblem, VariableLayout, COST_SCALE};
