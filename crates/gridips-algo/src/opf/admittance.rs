//! Bus and branch admittances of the π-model.
//!
//! ```text
//!            ┌─────────┐  ys = 1/(r + jx)
//!  from ──N──┤   ys    ├────── to          N = τ e^{jφ} (off-nominal tap)
//!        │   └─────────┘   │
//!      jb/2              jb/2
//!        │                 │
//!
//!  Yff = (ys + jb/2) / τ²      Yft = −ys / (τ e^{−jφ})
//!  Ytf = −ys / (τ e^{jφ})      Ytt =  ys + jb/2
//! ```
//!
//! The bus matrix is kept as separate CSR conductance and susceptance parts;
//! each branch also keeps its own `(Yff, Yft, Ytf, Ytt)` for flow limits.
//!
//! Every complex power used by the OPF is a sum of terms
//! `m_a m_b u e^{j(θa − θb)}` with a constant `u`, called a [`PowerTerm`]
//! here. Derivatives of bus injections and branch flows are built from the
//! term derivatives.

use super::network::{AcNetwork, NetworkIndex};
use crate::error::NetworkError;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

/// Series and shunt admittances of one in-service branch, in bus positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchAdmittance {
    pub from: usize,
    pub to: usize,
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
}

impl BranchAdmittance {
    /// Terms of the from-end flow `Sf = Vf conj(Yff Vf + Yft Vt)`.
    pub fn from_terms(&self) -> [PowerTerm; 2] {
        [
            PowerTerm::new(self.from, self.from, self.yff.conj()),
            PowerTerm::new(self.from, self.to, self.yft.conj()),
        ]
    }

    /// Terms of the to-end flow `St = Vt conj(Ytf Vf + Ytt Vt)`.
    pub fn to_terms(&self) -> [PowerTerm; 2] {
        [
            PowerTerm::new(self.to, self.from, self.ytf.conj()),
            PowerTerm::new(self.to, self.to, self.ytt.conj()),
        ]
    }
}

/// `m_a m_b u e^{j(θa − θb)}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerTerm {
    pub a: usize,
    pub b: usize,
    pub u: Complex64,
}

impl PowerTerm {
    pub fn new(a: usize, b: usize, u: Complex64) -> Self {
        Self { a, b, u }
    }

    fn rotated(&self, va: &[f64]) -> Complex64 {
        self.u * Complex64::from_polar(1.0, va[self.a] - va[self.b])
    }

    pub fn value(&self, vm: &[f64], va: &[f64]) -> Complex64 {
        vm[self.a] * vm[self.b] * self.rotated(va)
    }

    /// Partial derivatives as `(variable, dS)`. Angles are variables `0..n_bus`,
    /// magnitudes `n_bus..2 n_bus`. For `a == b` the angle entries cancel.
    pub fn gradient(&self, vm: &[f64], va: &[f64], n_bus: usize) -> [(usize, Complex64); 4] {
        let t = self.rotated(va);
        let s = vm[self.a] * vm[self.b] * t;
        let j = Complex64::i();
        [
            (self.a, j * s),
            (self.b, -j * s),
            (n_bus + self.a, vm[self.b] * t),
            (n_bus + self.b, vm[self.a] * t),
        ]
    }

    /// Hessian entries of `Re(conj(c) S)` scaled by `weight`, appended as
    /// triplets. Symmetric; duplicates are meant to be summed.
    pub fn push_hessian(
        &self,
        c: Complex64,
        weight: f64,
        vm: &[f64],
        va: &[f64],
        n_bus: usize,
        out: &mut Vec<(usize, usize, f64)>,
    ) {
        let w = c.conj() * self.rotated(va);
        let (re, im) = (weight * w.re, weight * w.im);
        let (ma, mb) = (vm[self.a], vm[self.b]);
        let (ta, tb) = (self.a, self.b);
        let (ka, kb) = (n_bus + self.a, n_bus + self.b);
        let mm = ma * mb;

        out.extend_from_slice(&[
            (ta, ta, -mm * re),
            (tb, tb, -mm * re),
            (ta, tb, mm * re),
            (tb, ta, mm * re),
            (ka, kb, re),
            (kb, ka, re),
        ]);
        for (row, col, v) in [
            (ta, ka, -mb * im),
            (ta, kb, -ma * im),
            (tb, ka, mb * im),
            (tb, kb, ma * im),
        ] {
            out.push((row, col, v));
            out.push((col, row, v));
        }
    }
}

/// Bus admittance matrix and per-branch admittances of a network.
#[derive(Debug, Clone)]
pub struct Admittances {
    n_bus: usize,
    g_matrix: CsMat<f64>,
    b_matrix: CsMat<f64>,
    branches: Vec<BranchAdmittance>,
}

impl Admittances {
    pub fn build(network: &AcNetwork, index: &NetworkIndex) -> Result<Self, NetworkError> {
        let n_bus = network.buses.len();
        let mut g_triplet = TriMat::new((n_bus, n_bus));
        let mut b_triplet = TriMat::new((n_bus, n_bus));
        let mut branches = Vec::with_capacity(index.n_branch());

        for (&pos, &(from, to)) in index.branches.iter().zip(&index.branch_ends) {
            let branch = &network.branches[pos];
            let z = Complex64::new(branch.r, branch.x);
            if z.norm() < 1e-12 {
                return Err(NetworkError::ZeroImpedance(branch.id));
            }
            let ys = z.inv();
            let half_b = Complex64::new(0.0, branch.b / 2.0);
            let tau = branch.effective_tap();
            let shift = Complex64::from_polar(tau, branch.shift_deg.to_radians());

            let adm = BranchAdmittance {
                from,
                to,
                yff: (ys + half_b) / (tau * tau),
                yft: -ys / shift.conj(),
                ytf: -ys / shift,
                ytt: ys + half_b,
            };

            for (row, col, y) in [
                (from, from, adm.yff),
                (from, to, adm.yft),
                (to, from, adm.ytf),
                (to, to, adm.ytt),
            ] {
                g_triplet.add_triplet(row, col, y.re);
                b_triplet.add_triplet(row, col, y.im);
            }
            branches.push(adm);
        }

        for (k, bus) in network.buses.iter().enumerate() {
            g_triplet.add_triplet(k, k, bus.gs_mw / network.base_mva);
            b_triplet.add_triplet(k, k, bus.bs_mvar / network.base_mva);
        }

        Ok(Self {
            n_bus,
            g_matrix: g_triplet.to_csr(),
            b_matrix: b_triplet.to_csr(),
            branches,
        })
    }

    pub fn n_bus(&self) -> usize {
        self.n_bus
    }

    pub fn branches(&self) -> &[BranchAdmittance] {
        &self.branches
    }

    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        Complex64::new(
            self.g_matrix.get(i, j).copied().unwrap_or(0.0),
            self.b_matrix.get(i, j).copied().unwrap_or(0.0),
        )
    }

    /// Non-zero entries `(j, Y_ij)` of row `i`, in column order.
    pub fn row(&self, i: usize) -> Vec<(usize, Complex64)> {
        let g_row: Vec<(usize, f64)> = self
            .g_matrix
            .outer_view(i)
            .map(|v| v.iter().map(|(j, &x)| (j, x)).collect())
            .unwrap_or_default();
        let b_row: Vec<(usize, f64)> = self
            .b_matrix
            .outer_view(i)
            .map(|v| v.iter().map(|(j, &x)| (j, x)).collect())
            .unwrap_or_default();

        // merge of two sorted sparse rows
        let mut out = Vec::with_capacity(g_row.len().max(b_row.len()));
        let (mut p, mut q) = (0, 0);
        while p < g_row.len() || q < b_row.len() {
            let gj = g_row.get(p).map_or(usize::MAX, |e| e.0);
            let bj = b_row.get(q).map_or(usize::MAX, |e| e.0);
            let j = gj.min(bj);
            let mut y = Complex64::new(0.0, 0.0);
            if gj == j {
                y.re = g_row[p].1;
                p += 1;
            }
            if bj == j {
                y.im = b_row[q].1;
                q += 1;
            }
            out.push((j, y));
        }
        out
    }

    /// Terms of the injection `S_i = V_i conj(Σ_j Y_ij V_j)`.
    pub fn injection_terms(&self, i: usize) -> Vec<PowerTerm> {
        self.row(i)
            .into_iter()
            .map(|(j, y)| PowerTerm::new(i, j, y.conj()))
            .collect()
    }

    /// Complex power injections `V ⊙ conj(Ybus V)` in per unit.
    pub fn bus_injections(&self, vm: &[f64], va: &[f64]) -> Vec<Complex64> {
        (0..self.n_bus)
            .map(|i| {
                self.injection_terms(i)
                    .iter()
                    .map(|t| t.value(vm, va))
                    .sum()
            })
            .collect()
    }

    /// Flows `(Sf, St)` at both ends of every in-service branch, per unit.
    pub fn branch_flows(&self, vm: &[f64], va: &[f64]) -> (Vec<Complex64>, Vec<Complex64>) {
        self.branches
            .iter()
            .map(|br| {
                let sf = br.from_terms().iter().map(|t| t.value(vm, va)).sum::<Complex64>();
                let st = br.to_terms().iter().map(|t| t.value(vm, va)).sum::<Complex64>();
                (sf, st)
            })
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus(shift_deg: f64) -> AcNetwork {
        let text = format!(
            r#"{{
                "buses": [{{"id": 1, "is_slack": true, "bs_mvar": 10.0}}, {{"id": 2}}],
                "branches": [{{"id": 1, "from_bus": 1, "to_bus": 2, "r": 0.02, "x": 0.2,
                               "b": 0.1, "tap": 1.05, "shift_deg": {shift_deg}}}]
            }}"#
        );
        AcNetwork::from_json_str(&text).unwrap()
    }

    fn build(net: &AcNetwork) -> Admittances {
        Admittances::build(net, &net.index().unwrap()).unwrap()
    }

    #[test]
    fn test_pi_model_entries() {
        let adm = build(&two_bus(0.0));
        let ys = Complex64::new(0.02, 0.2).inv();
        let yff = (ys + Complex64::new(0.0, 0.05)) / (1.05 * 1.05) + Complex64::new(0.0, 0.1);
        assert!((adm.get(0, 0) - yff).norm() < 1e-12);
        assert!((adm.get(0, 1) + ys / 1.05).norm() < 1e-12);
        assert!((adm.get(1, 1) - ys - Complex64::new(0.0, 0.05)).norm() < 1e-12);
        assert_eq!(adm.row(0).len(), 2);
    }

    #[test]
    fn test_injections_balance_branch_flows() {
        let net = two_bus(5.0);
        let adm = build(&net);
        let vm = [1.02, 0.97];
        let va = [0.0, -0.1];
        let s = adm.bus_injections(&vm, &va);
        let (sf, st) = adm.branch_flows(&vm, &va);
        let shunt = Complex64::new(0.0, -0.1 * vm[0] * vm[0]);
        assert!((s[0] - sf[0] - shunt).norm() < 1e-12);
        assert!((s[1] - st[0]).norm() < 1e-12);
    }

    #[test]
    fn test_term_gradient_matches_difference() {
        let term = PowerTerm::new(0, 1, Complex64::new(0.3, -1.7));
        let vm = [1.01, 0.98];
        let va = [0.05, -0.02];
        let grad = term.gradient(&vm, &va, 2);
        let h = 1e-7;
        let mut vm_p = vm;
        vm_p[1] += h;
        let numeric = (term.value(&vm_p, &va) - term.value(&vm, &va)) / h;
        let (var, analytic) = grad[3];
        assert_eq!(var, 3);
        assert!((numeric - analytic).norm() < 1e-6);
    }
}
