use super::admittance::Admittances;
use super::network::{AcNetwork, NetworkIndex};
use super::options::OpfOptions;
use super::power_flow::{solve_power_flow, PowerFlowSolution};
use super::problem::{AcOpfProblem, VariableLayout};
use crate::error::OpfError;
use crate::ips::{
    render_error_trace, verify_derivatives, DerivativeReport, InteriorPointSolver,
    IterationRecord, NonlinearProblem, Termination,
};
use gridips_core::diagnostics::{DiagnosticIssue, Severity};
use gridips_core::Diagnostics;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Finite-difference step of the derivative check.
const DERIVATIVE_STEP: f64 = 1e-6;
/// Scaled mismatch above which a derivative block is reported.
const DERIVATIVE_THRESHOLD: f64 = 1e-4;
/// Slack on voltage limits before a violation is reported, p.u.
const VOLTAGE_SLACK: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusResult {
    pub id: usize,
    pub vm: f64,
    pub va_deg: f64,
    /// Marginal price of active power, $/MWh
    pub lam_p: f64,
    /// Marginal price of reactive power, $/MVArh
    pub lam_q: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorResult {
    pub id: usize,
    pub bus: usize,
    pub pg_mw: f64,
    pub qg_mvar: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchResult {
    pub id: usize,
    pub from_bus: usize,
    pub to_bus: usize,
    pub sf_mva: f64,
    pub st_mva: f64,
    /// `|Sf| / rate`, zero for unrated branches
    pub loading: f64,
}

/// Outcome of an AC-OPF run in engineering units.
#[derive(Debug, Clone, Serialize)]
pub struct AcOpfResult {
    pub converged: bool,
    pub iterations: usize,
    pub error: f64,
    pub termination: Termination,
    /// Generation cost, $/h
    pub objective: f64,
    pub buses: Vec<BusResult>,
    /// In-service generators only
    pub generators: Vec<GeneratorResult>,
    /// In-service branches only
    pub branches: Vec<BranchResult>,
    pub trace: Vec<IterationRecord>,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivative_check: Option<DerivativeReport>,
}

impl AcOpfResult {
    pub fn total_generation_mw(&self) -> f64 {
        self.generators.iter().map(|g| g.pg_mw).sum()
    }

    pub fn render_error_trace(&self, width: usize, height: usize) -> String {
        render_error_trace(&self.trace, width, height)
    }
}

impl fmt::Display for AcOpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "converged:  {}", self.converged)?;
        writeln!(f, "iterations: {} ({})", self.iterations, self.termination)?;
        writeln!(f, "error:      {:.3e}", self.error)?;
        writeln!(f, "objective:  {:.4} $/h", self.objective)?;
        writeln!(f, "generation: {:.3} MW", self.total_generation_mw())?;
        if !self.diagnostics.is_empty() {
            write!(f, "{}", self.diagnostics)?;
        }
        Ok(())
    }
}

/// Flat start: `Va = va_init`, `Vm` and generator powers at the middle of
/// their ranges, soft-limit slacks at zero.
pub fn flat_start(network: &AcNetwork, index: &NetworkIndex, layout: VariableLayout) -> Vec<f64> {
    let base = network.base_mva;
    let mut x = vec![0.0; layout.n_x()];
    for (k, bus) in network.buses.iter().enumerate() {
        x[layout.va(k)] = bus.va_init_deg.to_radians();
        x[layout.vm(k)] = 0.5 * (bus.vm_min + bus.vm_max);
    }
    for (g, &pos) in index.generators.iter().enumerate() {
        let gen = &network.generators[pos];
        x[layout.pg(g)] = 0.5 * (gen.p_min_mw + gen.p_max_mw) / base;
        x[layout.qg(g)] = 0.5 * (gen.q_min_mvar + gen.q_max_mvar) / base;
    }
    x
}

/// Starting point from a solved power flow.
///
/// Generators take their active set-point, except at slack buses where the
/// bus injection is shared evenly; reactive output is the bus injection
/// plus local load, shared evenly among the bus's generators.
pub fn power_flow_start(
    network: &AcNetwork,
    index: &NetworkIndex,
    layout: VariableLayout,
    pf: &PowerFlowSolution,
) -> Vec<f64> {
    let base = network.base_mva;
    let mut x = vec![0.0; layout.n_x()];
    for k in 0..network.buses.len() {
        x[layout.va(k)] = pf.va[k];
        x[layout.vm(k)] = pf.vm[k];
    }

    let mut per_bus = vec![0usize; network.buses.len()];
    for &k in &index.gen_bus {
        per_bus[k] += 1;
    }
    for (g, (&pos, &k)) in index.generators.iter().zip(&index.gen_bus).enumerate() {
        let bus = &network.buses[k];
        let share = per_bus[k] as f64;
        let p_bus = pf.s_bus[k].re + bus.p_load_mw / base;
        let q_bus = pf.s_bus[k].im + bus.q_load_mvar / base;
        x[layout.pg(g)] = if index.slack.contains(&k) {
            p_bus / share
        } else {
            network.generators[pos].p_mw / base
        };
        x[layout.qg(g)] = q_bus / share;
    }
    x
}

/// Run the Newton-Raphson power flow on its own.
pub fn run_power_flow(
    network: &AcNetwork,
    options: &OpfOptions,
) -> Result<PowerFlowSolution, OpfError> {
    let index = network.index()?;
    let admittances = Admittances::build(network, &index)?;
    let backend = options.linear_solver.build_solver();
    solve_power_flow(network, &index, &admittances, &options.power_flow, backend.as_ref())
}

/// Solve the AC optimal power flow of `network`.
pub fn solve_ac_opf(network: &AcNetwork, options: &OpfOptions) -> Result<AcOpfResult, OpfError> {
    solve_ac_opf_with(network, options, |solver| solver)
}

/// [`solve_ac_opf`] with a hook to adjust the configured solver, e.g. to
/// install a cancellation check.
pub fn solve_ac_opf_with<F>(
    network: &AcNetwork,
    options: &OpfOptions,
    configure: F,
) -> Result<AcOpfResult, OpfError>
where
    F: FnOnce(InteriorPointSolver) -> InteriorPointSolver,
{
    let index = network.index()?;
    let admittances = Admittances::build(network, &index)?;
    let problem = AcOpfProblem::new(network, &index, &admittances, options.soft_limits);
    let layout = problem.layout();
    let backend = options.linear_solver.build_solver();
    let mut diagnostics = Diagnostics::new();

    let x0 = if options.ips.pf_init {
        let pf = solve_power_flow(
            network,
            &index,
            &admittances,
            &options.power_flow,
            backend.as_ref(),
        )?;
        if !pf.converged {
            return Err(OpfError::PowerFlow(format!(
                "seed did not converge after {} iterations (mismatch {:.3e})",
                pf.iterations, pf.max_mismatch
            )));
        }
        power_flow_start(network, &index, layout, &pf)
    } else {
        flat_start(network, &index, layout)
    };

    let derivative_check = if options.verify_derivatives {
        let dims = problem.dimensions();
        let report = verify_derivatives(
            &problem,
            &x0,
            &vec![1.0; dims.n_ineq],
            &vec![1.0; dims.n_eq],
            DERIVATIVE_STEP,
        )?;
        info!(max_error = report.max_error(), "derivative check done");
        for block in report.blocks.iter().filter(|b| !(b.max_error <= DERIVATIVE_THRESHOLD)) {
            warn!(block = block.block, error = block.max_error, "derivative mismatch");
            diagnostics.add(
                DiagnosticIssue::new(
                    Severity::Error,
                    "derivatives",
                    format!(
                        "analytic {} disagrees with finite differences at ({}, {})",
                        block.block, block.row, block.col
                    ),
                )
                .with_entity(block.block)
                .with_value(block.max_error, DERIVATIVE_THRESHOLD),
            );
        }
        Some(report)
    } else {
        None
    };

    let solver = configure(InteriorPointSolver::new(options.ips.clone()).with_backend(backend));
    let solution = solver.solve(&problem, &x0)?;

    let base = network.base_mva;
    let (va, vm) = problem.voltages(&solution.x);
    let nb = network.buses.len();

    let buses: Vec<BusResult> = network
        .buses
        .iter()
        .enumerate()
        .map(|(k, bus)| BusResult {
            id: bus.id,
            vm: vm[k],
            va_deg: va[k].to_degrees(),
            lam_p: solution.lam[k] / base * 1e4,
            lam_q: solution.lam[nb + k] / base * 1e4,
        })
        .collect();

    let generators: Vec<GeneratorResult> = index
        .generators
        .iter()
        .enumerate()
        .map(|(g, &pos)| GeneratorResult {
            id: network.generators[pos].id,
            bus: network.generators[pos].bus,
            pg_mw: solution.x[layout.pg(g)] * base,
            qg_mvar: solution.x[layout.qg(g)] * base,
        })
        .collect();

    let (sf, st) = admittances.branch_flows(vm, va);
    let branches: Vec<BranchResult> = index
        .branches
        .iter()
        .enumerate()
        .map(|(l, &pos)| {
            let branch = &network.branches[pos];
            let sf_mva = sf[l].norm() * base;
            BranchResult {
                id: branch.id,
                from_bus: branch.from_bus,
                to_bus: branch.to_bus,
                sf_mva,
                st_mva: st[l].norm() * base,
                loading: if branch.rate_mva > 0.0 {
                    sf_mva / branch.rate_mva
                } else {
                    0.0
                },
            }
        })
        .collect();

    // ========================================================================
    // POST-SOLVE CHECKS
    // ========================================================================

    if !solution.converged {
        diagnostics.add_warning(
            "convergence",
            &format!(
                "{} after {} iterations, error {:.3e}",
                solution.termination, solution.iterations, solution.error
            ),
        );
    }
    for (bus, result) in network.buses.iter().zip(&buses) {
        let entity = format!("bus {}", bus.id);
        if result.vm > bus.vm_max + VOLTAGE_SLACK {
            diagnostics.add_limit_warning("voltage", &entity, result.vm, bus.vm_max);
        } else if result.vm < bus.vm_min - VOLTAGE_SLACK {
            diagnostics.add_limit_warning("voltage", &entity, result.vm, bus.vm_min);
        }
    }
    for result in branches.iter().filter(|b| b.loading > 1.0) {
        let entity = format!("branch {}", result.id);
        diagnostics.add_limit_warning("thermal", &entity, result.loading, 1.0);
    }
    let mw_slack = VOLTAGE_SLACK * base;
    for (&pos, result) in index.generators.iter().zip(&generators) {
        let gen = &network.generators[pos];
        let entity = format!("generator {}", gen.id);
        for (value, lo, hi) in [
            (result.pg_mw, gen.p_min_mw, gen.p_max_mw),
            (result.qg_mvar, gen.q_min_mvar, gen.q_max_mvar),
        ] {
            if value > hi + mw_slack {
                diagnostics.add_limit_warning("generator", &entity, value, hi);
            } else if value < lo - mw_slack {
                diagnostics.add_limit_warning("generator", &entity, value, lo);
            }
        }
    }
    let worst_pair = solution
        .mu
        .iter()
        .zip(&solution.z)
        .map(|(m, z)| m * z)
        .fold(0.0, f64::max);
    let complementarity_limit = options.ips.tol * 10.0;
    if worst_pair > complementarity_limit {
        diagnostics.add(
            DiagnosticIssue::new(
                Severity::Warning,
                "complementarity",
                "largest mu*z pair is above ten times the tolerance",
            )
            .with_value(worst_pair, complementarity_limit),
        );
    }
    for issue in &diagnostics.issues {
        warn!("{}", issue);
    }

    Ok(AcOpfResult {
        converged: solution.converged,
        iterations: solution.iterations,
        error: solution.error,
        termination: solution.termination,
        objective: problem.generation_cost(&solution.x),
        buses,
        generators,
        branches,
        trace: solution.trace,
        diagnostics,
        derivative_check,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> AcNetwork {
        AcNetwork::from_json_str(
            r#"{
                "buses": [
                    {"id": 1, "is_slack": true, "vm_min": 0.95, "vm_max": 1.05},
                    {"id": 2, "p_load_mw": 50.0, "q_load_mvar": 10.0, "vm_min": 0.95, "vm_max": 1.05}
                ],
                "generators": [
                    {"id": 7, "bus": 1, "p_mw": 50.0, "p_max_mw": 100.0, "q_min_mvar": -50.0, "q_max_mvar": 50.0, "cost": [0.0, 10.0, 0.1]},
                    {"id": 8, "bus": 1, "p_mw": 0.0, "p_min_mw": 10.0, "p_max_mw": 30.0, "q_min_mvar": -10.0, "q_max_mvar": 30.0}
                ],
                "branches": [{"id": 1, "from_bus": 1, "to_bus": 2, "r": 0.01, "x": 0.05}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_flat_start_uses_range_midpoints() {
        let net = case();
        let index = net.index().unwrap();
        let adm = Admittances::build(&net, &index).unwrap();
        let layout = AcOpfProblem::new(&net, &index, &adm, None).layout();
        let x = flat_start(&net, &index, layout);
        assert_eq!(x[layout.vm(1)], 1.0);
        assert_eq!(x[layout.pg(0)], 0.5);
        assert_eq!(x[layout.pg(1)], 0.2);
        assert_eq!(x[layout.qg(1)], 0.1);
    }

    #[test]
    fn test_power_flow_start_shares_slack_injection() {
        let net = case();
        let index = net.index().unwrap();
        let adm = Admittances::build(&net, &index).unwrap();
        let layout = AcOpfProblem::new(&net, &index, &adm, None).layout();
        let pf = run_power_flow(&net, &OpfOptions::default()).unwrap();
        assert!(pf.converged);
        let x = power_flow_start(&net, &index, layout, &pf);
        assert_eq!(x[layout.pg(0)], x[layout.pg(1)]);
        let total = x[layout.pg(0)] + x[layout.pg(1)];
        assert!((total - pf.s_bus[0].re).abs() < 1e-12);
        assert!(total > 0.5);
    }

    #[test]
    fn test_opf_reports_engineering_units() {
        let result = solve_ac_opf(&case(), &OpfOptions::default()).unwrap();
        assert!(result.converged, "{result}");
        assert_eq!(result.generators.len(), 2);
        assert_eq!(result.generators[0].id, 7);
        let total: f64 = result.generators.iter().map(|g| g.pg_mw).sum();
        // load plus a small loss
        assert!(total > 50.0 && total < 52.0);
        // the cheap unit has no linear cost, so it runs at its limit
        assert!((result.generators[1].pg_mw - 30.0).abs() < 1e-2);
        assert!(result.buses[1].lam_p > 10.0);
        assert_eq!(result.branches[0].loading, 0.0);
    }
}
