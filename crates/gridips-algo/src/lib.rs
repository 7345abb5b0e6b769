//! # gridips-algo: interior-point optimization for power systems
//!
//! This crate provides a primal-dual interior-point solver for smooth
//! nonlinear programs and the AC optimal power flow built on top of it.
//!
//! ## Interior-Point Solver
//!
//! [`ips::InteriorPointSolver`] minimizes `f(x)` subject to `G(x) = 0` and
//! `H(x) <= 0` for any [`ips::NonlinearProblem`]:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`ips::NonlinearProblem`] | Values and sparse derivatives at a point |
//! | [`ips::IpsOptions`] | Tolerance, iteration cap, starting strategy, step control |
//! | [`ips::IpsSolution`] | Iterate, multipliers, termination reason, per-iteration trace |
//! | [`ips::verify_derivatives`] | Finite-difference check of user derivatives |
//!
//! The linear algebra is injected: any
//! [`LinearSystemBackend`](gridips_core::LinearSystemBackend) can solve the
//! Newton systems.
//!
//! ## AC Optimal Power Flow
//!
//! [`opf::solve_ac_opf`] builds the polar AC-OPF of an [`opf::AcNetwork`],
//! seeds it with a flat start or a Newton-Raphson power flow, and reports
//! dispatch, voltages, flows and locational marginal prices.
//!
//! ## Example
//!
//! ```ignore
//! use gridips_algo::opf::{solve_ac_opf, AcNetwork, OpfOptions};
//!
//! let network = AcNetwork::from_json_file("case5.json")?;
//! let options = OpfOptions::from_toml_file("opf.toml")?;
//!
//! let result = solve_ac_opf(&network, &options)?;
//! println!("Cost: ${:.2}/hr", result.objective);
//! ```

pub mod error;
pub mod ips;
pub mod opf;

pub use error::{IpsError, NetworkError, OpfError};
pub use ips::{InteriorPointSolver, IpsOptions, IpsSolution, NonlinearProblem, Termination};
pub use opf::{solve_ac_opf, AcNetwork, AcOpfResult, OpfOptions};
