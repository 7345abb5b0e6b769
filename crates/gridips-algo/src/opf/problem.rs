//! # AC-OPF as a nonlinear program
//!
//! ## Variables
//!
//! ```text
//! x = [ Va (nb) | Vm (nb) | Pg (ng) | Qg (ng) | sl_sf | sl_st | sl_vmax | sl_vmin ]
//!                                               └──────── soft limits only ───────┘
//! ```
//!
//! Voltages and powers are in per unit; angles in radians.
//!
//! ## Objective
//!
//! ```text
//! f = 1e-4 Σ_g (c0 + c1 Pg·Sbase + c2 (Pg·Sbase)²)
//!   + 1e-4 (c_branch Σ (sl_sf + sl_st) + c_voltage Σ (sl_vmax + sl_vmin))
//! ```
//!
//! ## Constraints
//!
//! ```text
//! G = [ Re(dS) ; Im(dS) ; Va[slack] ; Vm[pv] − Vmax[pv] ]       dS = V⊙conj(Ybus V) + Sd − Cg Sg
//!
//! H = [ |Sf|² − rate² ; |St|² − rate²        (rated branches)
//!       Vm[pq] − Vmax ; Pg − Pmax ; Qg − Qmax
//!       Vmin − Vm[pq] ; Pmin − Pg ; Qmin − Qg
//!       −sl                                   (soft limits only)
//!       Qg² − tan²φ Pg² ]                     (units with a minimum power factor)
//! ```
//!
//! With soft limits the flow and voltage rows subtract their slack.
//!
//! ## Second derivatives
//!
//! Every power quantity is a sum of [`PowerTerm`]s, so the weighted
//! constraint Hessians are assembled term by term:
//!
//! - `∇²(λᵗG)`: `Σ_k ∇² Re(conj(λp_k + jλq_k) S_k)`
//! - `∇²(μᵗH)` for `|S|²`: `2μ (∇P∇Pᵗ + ∇Q∇Qᵗ) + 2μ ∇² Re(conj(S) S(x))`

use super::admittance::{Admittances, BranchAdmittance, PowerTerm};
use super::network::{AcNetwork, NetworkIndex};
use super::options::SoftLimitCosts;
use crate::ips::{
    DerivativeLevel, Evaluation, FirstOrder, NonlinearProblem, ProblemDimensions, SecondOrder,
};
use gridips_core::sparse;
use num_complex::Complex64;

/// Objective scaling applied to all costs.
pub const COST_SCALE: f64 = 1e-4;

/// Positions of the variable blocks in `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    pub n_bus: usize,
    pub n_gen: usize,
    /// Rated branches
    pub n_mon: usize,
    pub n_pq: usize,
    pub soft: bool,
}

impl VariableLayout {
    pub fn va(&self, k: usize) -> usize {
        k
    }

    pub fn vm(&self, k: usize) -> usize {
        self.n_bus + k
    }

    pub fn pg(&self, g: usize) -> usize {
        2 * self.n_bus + g
    }

    pub fn qg(&self, g: usize) -> usize {
        2 * self.n_bus + self.n_gen + g
    }

    fn slack_base(&self) -> usize {
        2 * (self.n_bus + self.n_gen)
    }

    pub fn sl_sf(&self, l: usize) -> usize {
        self.slack_base() + l
    }

    pub fn sl_st(&self, l: usize) -> usize {
        self.slack_base() + self.n_mon + l
    }

    pub fn sl_vmax(&self, i: usize) -> usize {
        self.slack_base() + 2 * self.n_mon + i
    }

    pub fn sl_vmin(&self, i: usize) -> usize {
        self.slack_base() + 2 * self.n_mon + self.n_pq + i
    }

    pub fn n_soft(&self) -> usize {
        if self.soft {
            2 * (self.n_mon + self.n_pq)
        } else {
            0
        }
    }

    pub fn n_x(&self) -> usize {
        self.slack_base() + self.n_soft()
    }
}

/// AC-OPF problem in polar voltage coordinates.
#[derive(Debug, Clone)]
pub struct AcOpfProblem {
    layout: VariableLayout,
    base_mva: f64,
    slack: Vec<usize>,
    pv: Vec<usize>,
    pq: Vec<usize>,
    vm_min: Vec<f64>,
    vm_max: Vec<f64>,
    /// Load per bus, p.u.
    sd: Vec<Complex64>,
    gen_bus: Vec<usize>,
    cost: Vec<[f64; 3]>,
    p_min: Vec<f64>,
    p_max: Vec<f64>,
    q_min: Vec<f64>,
    q_max: Vec<f64>,
    injections: Vec<Vec<PowerTerm>>,
    rated: Vec<BranchAdmittance>,
    rate_sq: Vec<f64>,
    soft: Option<SoftLimitCosts>,
    /// `(generator, tan²φ)` of the units with a capability cone
    capability: Vec<(usize, f64)>,
}

impl AcOpfProblem {
    pub fn new(
        network: &AcNetwork,
        index: &NetworkIndex,
        admittances: &Admittances,
        soft: Option<SoftLimitCosts>,
    ) -> Self {
        let base = network.base_mva;
        let n_bus = network.buses.len();
        let gens: Vec<_> = index.generators.iter().map(|&g| &network.generators[g]).collect();
        let rated: Vec<BranchAdmittance> = index
            .monitored
            .iter()
            .map(|&l| admittances.branches()[l])
            .collect();
        let rate_sq = index
            .monitored
            .iter()
            .map(|&l| {
                let rate = network.branches[index.branches[l]].rate_mva / base;
                rate * rate
            })
            .collect();

        Self {
            layout: VariableLayout {
                n_bus,
                n_gen: gens.len(),
                n_mon: rated.len(),
                n_pq: index.pq.len(),
                soft: soft.is_some(),
            },
            base_mva: base,
            slack: index.slack.clone(),
            pv: index.pv.clone(),
            pq: index.pq.clone(),
            vm_min: network.buses.iter().map(|b| b.vm_min).collect(),
            vm_max: network.buses.iter().map(|b| b.vm_max).collect(),
            sd: network
                .buses
                .iter()
                .map(|b| Complex64::new(b.p_load_mw, b.q_load_mvar) / base)
                .collect(),
            gen_bus: index.gen_bus.clone(),
            cost: gens.iter().map(|g| g.cost).collect(),
            p_min: gens.iter().map(|g| g.p_min_mw / base).collect(),
            p_max: gens.iter().map(|g| g.p_max_mw / base).collect(),
            q_min: gens.iter().map(|g| g.q_min_mvar / base).collect(),
            q_max: gens.iter().map(|g| g.q_max_mvar / base).collect(),
            injections: (0..n_bus).map(|k| admittances.injection_terms(k)).collect(),
            rated,
            rate_sq,
            soft,
            capability: gens
                .iter()
                .enumerate()
                .filter_map(|(g, gen)| gen.tan_max().map(|t| (g, t * t)))
                .collect(),
        }
    }

    pub fn layout(&self) -> VariableLayout {
        self.layout
    }

    /// `(Va, Vm)` views of `x`.
    pub fn voltages<'x>(&self, x: &'x [f64]) -> (&'x [f64], &'x [f64]) {
        let nb = self.layout.n_bus;
        (&x[..nb], &x[nb..2 * nb])
    }

    /// Generation cost in $/h, without scaling or penalties.
    pub fn generation_cost(&self, x: &[f64]) -> f64 {
        (0..self.layout.n_gen)
            .map(|g| {
                let p = x[self.layout.pg(g)] * self.base_mva;
                let [c0, c1, c2] = self.cost[g];
                c0 + c1 * p + c2 * p * p
            })
            .sum()
    }

    fn n_eq(&self) -> usize {
        2 * self.layout.n_bus + self.slack.len() + self.pv.len()
    }

    fn n_ineq(&self) -> usize {
        let l = &self.layout;
        2 * l.n_mon + 2 * l.n_pq + 4 * l.n_gen + l.n_soft() + self.capability.len()
    }

    fn objective(&self, x: &[f64]) -> f64 {
        let mut f = COST_SCALE * self.generation_cost(x);
        if let Some(costs) = self.soft {
            let l = &self.layout;
            let flow: f64 = (0..l.n_mon).map(|i| x[l.sl_sf(i)] + x[l.sl_st(i)]).sum();
            let volt: f64 = (0..l.n_pq).map(|i| x[l.sl_vmax(i)] + x[l.sl_vmin(i)]).sum();
            f += COST_SCALE * (costs.branch * flow + costs.voltage * volt);
        }
        f
    }

    fn equalities(&self, x: &[f64], vm: &[f64], va: &[f64]) -> Vec<f64> {
        let l = &self.layout;
        let nb = l.n_bus;
        let mut g = vec![0.0; self.n_eq()];
        for k in 0..nb {
            let s: Complex64 = self.injections[k].iter().map(|t| t.value(vm, va)).sum();
            let ds = s + self.sd[k];
            g[k] = ds.re;
            g[nb + k] = ds.im;
        }
        for (gen, &k) in self.gen_bus.iter().enumerate() {
            g[k] -= x[l.pg(gen)];
            g[nb + k] -= x[l.qg(gen)];
        }
        let mut row = 2 * nb;
        for &k in &self.slack {
            g[row] = va[k];
            row += 1;
        }
        for &k in &self.pv {
            g[row] = vm[k] - self.vm_max[k];
            row += 1;
        }
        g
    }

    fn inequalities(&self, x: &[f64], sf: &[Complex64], st: &[Complex64], vm: &[f64]) -> Vec<f64> {
        let l = &self.layout;
        let soft = l.soft;
        let slack = |idx: usize| if soft { x[idx] } else { 0.0 };
        let mut h = Vec::with_capacity(self.n_ineq());

        for i in 0..l.n_mon {
            h.push(sf[i].norm_sqr() - self.rate_sq[i] - slack(l.sl_sf(i)));
        }
        for i in 0..l.n_mon {
            h.push(st[i].norm_sqr() - self.rate_sq[i] - slack(l.sl_st(i)));
        }
        for (i, &k) in self.pq.iter().enumerate() {
            h.push(vm[k] - self.vm_max[k] - slack(l.sl_vmax(i)));
        }
        h.extend((0..l.n_gen).map(|g| x[l.pg(g)] - self.p_max[g]));
        h.extend((0..l.n_gen).map(|g| x[l.qg(g)] - self.q_max[g]));
        for (i, &k) in self.pq.iter().enumerate() {
            h.push(self.vm_min[k] - vm[k] - slack(l.sl_vmin(i)));
        }
        h.extend((0..l.n_gen).map(|g| self.p_min[g] - x[l.pg(g)]));
        h.extend((0..l.n_gen).map(|g| self.q_min[g] - x[l.qg(g)]));
        if soft {
            h.extend((0..l.n_soft()).map(|i| -x[l.sl_sf(0) + i]));
        }
        h.extend(self.capability.iter().map(|&(g, tan_sq)| {
            let (p, q) = (x[l.pg(g)], x[l.qg(g)]);
            q * q - tan_sq * p * p
        }));
        h
    }

    fn flows(&self, vm: &[f64], va: &[f64]) -> (Vec<Complex64>, Vec<Complex64>) {
        self.rated
            .iter()
            .map(|br| {
                let sf = br.from_terms().iter().map(|t| t.value(vm, va)).sum::<Complex64>();
                let st = br.to_terms().iter().map(|t| t.value(vm, va)).sum::<Complex64>();
                (sf, st)
            })
            .unzip()
    }

    fn first_order(
        &self,
        vm: &[f64],
        va: &[f64],
        sf: &[Complex64],
        st: &[Complex64],
        x: &[f64],
    ) -> FirstOrder {
        let l = &self.layout;
        let nb = l.n_bus;
        let n_x = l.n_x();

        // objective
        let mut fx = vec![0.0; n_x];
        for g in 0..l.n_gen {
            let [_, c1, c2] = self.cost[g];
            let p_mw = x[l.pg(g)] * self.base_mva;
            fx[l.pg(g)] = COST_SCALE * self.base_mva * (c1 + 2.0 * c2 * p_mw);
        }
        if let Some(costs) = self.soft {
            for i in 0..l.n_mon {
                fx[l.sl_sf(i)] = COST_SCALE * costs.branch;
                fx[l.sl_st(i)] = COST_SCALE * costs.branch;
            }
            for i in 0..l.n_pq {
                fx[l.sl_vmax(i)] = COST_SCALE * costs.voltage;
                fx[l.sl_vmin(i)] = COST_SCALE * costs.voltage;
            }
        }

        // equalities
        let mut gx = Vec::new();
        for k in 0..nb {
            for term in &self.injections[k] {
                for (var, d) in term.gradient(vm, va, nb) {
                    gx.push((k, var, d.re));
                    gx.push((nb + k, var, d.im));
                }
            }
        }
        for (g, &k) in self.gen_bus.iter().enumerate() {
            gx.push((k, l.pg(g), -1.0));
            gx.push((nb + k, l.qg(g), -1.0));
        }
        let mut row = 2 * nb;
        for &k in &self.slack {
            gx.push((row, l.va(k), 1.0));
            row += 1;
        }
        for &k in &self.pv {
            gx.push((row, l.vm(k), 1.0));
            row += 1;
        }

        // inequalities
        let mut hx = Vec::new();
        let mut row = 0;
        for to_end in [false, true] {
            let flows = if to_end { st } else { sf };
            for (i, br) in self.rated.iter().enumerate() {
                let terms = if to_end { br.to_terms() } else { br.from_terms() };
                // ∇|S|² = 2 Re(conj(S) ∇S)
                for (var, d) in flow_gradient(&terms, vm, va, nb) {
                    hx.push((row, var, 2.0 * (flows[i].conj() * d).re));
                }
                if l.soft {
                    let sl = if to_end { l.sl_st(i) } else { l.sl_sf(i) };
                    hx.push((row, sl, -1.0));
                }
                row += 1;
            }
        }
        for (i, &k) in self.pq.iter().enumerate() {
            hx.push((row, l.vm(k), 1.0));
            if l.soft {
                hx.push((row, l.sl_vmax(i), -1.0));
            }
            row += 1;
        }
        for g in 0..l.n_gen {
            hx.push((row, l.pg(g), 1.0));
            row += 1;
        }
        for g in 0..l.n_gen {
            hx.push((row, l.qg(g), 1.0));
            row += 1;
        }
        for (i, &k) in self.pq.iter().enumerate() {
            hx.push((row, l.vm(k), -1.0));
            if l.soft {
                hx.push((row, l.sl_vmin(i), -1.0));
            }
            row += 1;
        }
        for g in 0..l.n_gen {
            hx.push((row, l.pg(g), -1.0));
            row += 1;
        }
        for g in 0..l.n_gen {
            hx.push((row, l.qg(g), -1.0));
            row += 1;
        }
        for i in 0..l.n_soft() {
            hx.push((row, l.sl_sf(0) + i, -1.0));
            row += 1;
        }
        for &(g, tan_sq) in &self.capability {
            hx.push((row, l.pg(g), -2.0 * tan_sq * x[l.pg(g)]));
            hx.push((row, l.qg(g), 2.0 * x[l.qg(g)]));
            row += 1;
        }

        FirstOrder {
            fx,
            gx: sparse::from_triplets((self.n_eq(), n_x), gx),
            hx: sparse::from_triplets((self.n_ineq(), n_x), hx),
        }
    }

    fn second_order(
        &self,
        vm: &[f64],
        va: &[f64],
        sf: &[Complex64],
        st: &[Complex64],
        mu: &[f64],
        lam: &[f64],
    ) -> SecondOrder {
        let l = &self.layout;
        let nb = l.n_bus;
        let n_x = l.n_x();
        let square = (n_x, n_x);

        let fxx = sparse::from_triplets(
            square,
            (0..l.n_gen).map(|g| {
                let c2 = self.cost[g][2];
                (l.pg(g), l.pg(g), COST_SCALE * 2.0 * c2 * self.base_mva * self.base_mva)
            }),
        );

        let mut gxx = Vec::new();
        for k in 0..nb {
            let c = Complex64::new(lam[k], lam[nb + k]);
            for term in &self.injections[k] {
                term.push_hessian(c, 1.0, vm, va, nb, &mut gxx);
            }
        }

        let mut hxx = Vec::new();
        for (i, br) in self.rated.iter().enumerate() {
            push_squared_flow(&br.from_terms(), sf[i], mu[i], vm, va, nb, &mut hxx);
            push_squared_flow(&br.to_terms(), st[i], mu[l.n_mon + i], vm, va, nb, &mut hxx);
        }
        let first_capability_row = self.n_ineq() - self.capability.len();
        for (r, &(g, tan_sq)) in self.capability.iter().enumerate() {
            let m = mu[first_capability_row + r];
            hxx.push((l.pg(g), l.pg(g), -2.0 * tan_sq * m));
            hxx.push((l.qg(g), l.qg(g), 2.0 * m));
        }

        SecondOrder {
            fxx,
            gxx: sparse::from_triplets(square, gxx),
            hxx: sparse::from_triplets(square, hxx),
        }
    }
}

/// Gradient entries of a flow `S = Σ terms`; duplicates are summed on assembly.
fn flow_gradient(
    terms: &[PowerTerm; 2],
    vm: &[f64],
    va: &[f64],
    nb: usize,
) -> Vec<(usize, Complex64)> {
    terms.iter().flat_map(|t| t.gradient(vm, va, nb)).collect()
}

/// `μ ∇²|S|² = 2μ (∇P∇Pᵗ + ∇Q∇Qᵗ) + 2μ ∇² Re(conj(S₀) S)`.
fn push_squared_flow(
    terms: &[PowerTerm; 2],
    s: Complex64,
    mu: f64,
    vm: &[f64],
    va: &[f64],
    nb: usize,
    out: &mut Vec<(usize, usize, f64)>,
) {
    let grad = flow_gradient(terms, vm, va, nb);
    for &(i, di) in &grad {
        for &(j, dj) in &grad {
            out.push((i, j, 2.0 * mu * (di.re * dj.re + di.im * dj.im)));
        }
    }
    for term in terms {
        term.push_hessian(s, 2.0 * mu, vm, va, nb, out);
    }
}

impl NonlinearProblem for AcOpfProblem {
    fn dimensions(&self) -> ProblemDimensions {
        ProblemDimensions {
            n_x: self.layout.n_x(),
            n_eq: self.n_eq(),
            n_ineq: self.n_ineq(),
        }
    }

    fn evaluate(&self, x: &[f64], mu: &[f64], lam: &[f64], level: DerivativeLevel) -> Evaluation {
        let (va, vm) = self.voltages(x);
        let (sf, st) = self.flows(vm, va);

        Evaluation {
            f: self.objective(x),
            g: self.equalities(x, vm, va),
            h: self.inequalities(x, &sf, &st, vm),
            first: level
                .wants_first()
                .then(|| self.first_order(vm, va, &sf, &st, x)),
            second: level
                .wants_second()
                .then(|| self.second_order(vm, va, &sf, &st, mu, lam)),
        }
    }
}
