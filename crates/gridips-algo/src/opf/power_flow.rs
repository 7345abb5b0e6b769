//! Polar Newton-Raphson power flow, used to seed the OPF.
//!
//! Bus roles follow the generator set-points rather than the OPF limits:
//! slack buses fix angle and magnitude, other generator buses fix `|V| = vset`
//! and their active injection, all remaining buses fix both injections.

use super::admittance::{Admittances, PowerTerm};
use super::network::{AcNetwork, NetworkIndex};
use super::options::PowerFlowOptions;
use crate::error::OpfError;
use gridips_core::{sparse, LinearSystemBackend};
use num_complex::Complex64;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowSolution {
    pub converged: bool,
    pub iterations: usize,
    /// Largest P/Q mismatch at the returned state, p.u.
    pub max_mismatch: f64,
    pub vm: Vec<f64>,
    /// Angles in radians
    pub va: Vec<f64>,
    /// Net complex injection per bus, p.u.
    pub s_bus: Vec<Complex64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusRole {
    Slack,
    Pv,
    Pq,
}

fn classify(n_bus: usize, index: &NetworkIndex) -> Vec<BusRole> {
    let mut roles = vec![BusRole::Pq; n_bus];
    for &k in &index.gen_bus {
        roles[k] = BusRole::Pv;
    }
    for &k in &index.slack {
        roles[k] = BusRole::Slack;
    }
    roles
}

/// Solve the power flow equations from the bus initial values.
///
/// Non-convergence is reported through `converged`; a singular Jacobian is
/// an [`OpfError::PowerFlow`].
pub fn solve_power_flow(
    network: &AcNetwork,
    index: &NetworkIndex,
    admittances: &Admittances,
    options: &PowerFlowOptions,
    backend: &dyn LinearSystemBackend,
) -> Result<PowerFlowSolution, OpfError> {
    let n = network.buses.len();
    let base = network.base_mva;
    let roles = classify(n, index);

    let mut vm: Vec<f64> = network.buses.iter().map(|b| b.vm_init).collect();
    let mut va: Vec<f64> = network.buses.iter().map(|b| b.va_init_deg.to_radians()).collect();
    let mut s_spec: Vec<Complex64> = network
        .buses
        .iter()
        .map(|b| -Complex64::new(b.p_load_mw, b.q_load_mvar) / base)
        .collect();
    let mut vset_taken = vec![false; n];
    for (&g, &k) in index.generators.iter().zip(&index.gen_bus) {
        let gen = &network.generators[g];
        s_spec[k] += Complex64::new(gen.p_mw / base, 0.0);
        if !vset_taken[k] {
            vm[k] = gen.vset;
            vset_taken[k] = true;
        }
    }

    let p_buses: Vec<usize> = (0..n).filter(|&k| roles[k] != BusRole::Slack).collect();
    let q_buses: Vec<usize> = (0..n).filter(|&k| roles[k] == BusRole::Pq).collect();
    let n_p = p_buses.len();
    let n_vars = n_p + q_buses.len();

    let mut angle_col = vec![None; n];
    let mut mag_col = vec![None; n];
    for (c, &k) in p_buses.iter().enumerate() {
        angle_col[k] = Some(c);
    }
    for (c, &k) in q_buses.iter().enumerate() {
        mag_col[k] = Some(n_p + c);
    }
    let terms: Vec<_> = (0..n).map(|k| admittances.injection_terms(k)).collect();

    let mismatch = |vm: &[f64], va: &[f64]| -> (Vec<f64>, f64, Vec<Complex64>) {
        let s_calc = admittances.bus_injections(vm, va);
        let mut f = Vec::with_capacity(n_vars);
        f.extend(p_buses.iter().map(|&k| s_spec[k].re - s_calc[k].re));
        f.extend(q_buses.iter().map(|&k| s_spec[k].im - s_calc[k].im));
        let worst = sparse::norm_inf(&f);
        (f, worst, s_calc)
    };

    let mut iterations = 0;
    let (mut f, mut max_mismatch, mut s_bus) = mismatch(&vm, &va);
    while !(max_mismatch < options.tol) && iterations < options.max_iter {
        let mut jac = Vec::new();
        for (row, &k) in p_buses.iter().enumerate() {
            let row_terms = &terms[k];
            push_jacobian_row(&mut jac, row, row_terms, &vm, &va, &angle_col, &mag_col, |d| d.re);
        }
        for (row, &k) in q_buses.iter().enumerate() {
            let (row, row_terms) = (n_p + row, &terms[k]);
            push_jacobian_row(&mut jac, row, row_terms, &vm, &va, &angle_col, &mag_col, |d| d.im);
        }
        let jacobian = sparse::from_triplets((n_vars, n_vars), jac);

        let delta = backend.solve(&jacobian, &f).map_err(|err| {
            OpfError::PowerFlow(format!("Newton step {} failed: {}", iterations + 1, err))
        })?;
        for (c, &k) in p_buses.iter().enumerate() {
            va[k] += delta[c];
        }
        for (c, &k) in q_buses.iter().enumerate() {
            vm[k] += delta[n_p + c];
        }

        iterations += 1;
        (f, max_mismatch, s_bus) = mismatch(&vm, &va);
        debug!(iteration = iterations, max_mismatch, "power flow iteration");
    }

    let converged = max_mismatch < options.tol;
    if !converged {
        warn!(iterations, max_mismatch, "power flow did not converge");
    }
    Ok(PowerFlowSolution {
        converged,
        iterations,
        max_mismatch,
        vm,
        va,
        s_bus,
    })
}

#[allow(clippy::too_many_arguments)]
fn push_jacobian_row(
    out: &mut Vec<(usize, usize, f64)>,
    row: usize,
    terms: &[PowerTerm],
    vm: &[f64],
    va: &[f64],
    angle_col: &[Option<usize>],
    mag_col: &[Option<usize>],
    part: impl Fn(Complex64) -> f64,
) {
    let n = vm.len();
    for term in terms {
        for (var, d) in term.gradient(vm, va, n) {
            let col = if var < n { angle_col[var] } else { mag_col[var - n] };
            if let Some(col) = col {
                out.push((row, col, part(d)));
            }
        }
    }
}
