//! AC network data as read from JSON case files.
//!
//! Quantities follow the usual case-file conventions: powers in MW/MVAr,
//! impedances in per unit on `base_mva`, angles in degrees. [`AcNetwork::index`]
//! validates the data once and produces the positional [`NetworkIndex`] every
//! numerical routine works with.

use crate::error::NetworkError;
use gridips_core::GridIpsResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn default_base_mva() -> f64 {
    100.0
}

fn default_vm_min() -> f64 {
    0.9
}

fn default_vm_max() -> f64 {
    1.1
}

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub p_load_mw: f64,
    #[serde(default)]
    pub q_load_mvar: f64,
    /// Shunt conductance, MW at 1 p.u.
    #[serde(default)]
    pub gs_mw: f64,
    /// Shunt susceptance, MVAr at 1 p.u.
    #[serde(default)]
    pub bs_mvar: f64,
    #[serde(default = "default_vm_min")]
    pub vm_min: f64,
    #[serde(default = "default_vm_max")]
    pub vm_max: f64,
    #[serde(default)]
    pub va_init_deg: f64,
    #[serde(default = "one")]
    pub vm_init: f64,
    #[serde(default)]
    pub is_slack: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub id: usize,
    pub bus: usize,
    /// Active power set-point, used by the power-flow seed
    #[serde(default)]
    pub p_mw: f64,
    /// Voltage set-point, p.u.
    #[serde(default = "one")]
    pub vset: f64,
    #[serde(default)]
    pub p_min_mw: f64,
    pub p_max_mw: f64,
    pub q_min_mvar: f64,
    pub q_max_mvar: f64,
    /// Polynomial cost `[c0 $/h, c1 $/MWh, c2 $/MW²h]`
    #[serde(default)]
    pub cost: [f64; 3],
    /// Lowest power factor the unit may run at. When set, the OPF keeps
    /// `Qg² ≤ tan²(acos pf) Pg²`.
    #[serde(default)]
    pub pf_min: Option<f64>,
    #[serde(default = "yes")]
    pub in_service: bool,
}

impl Generator {
    /// `tan φ` of the capability cone, if the unit has one.
    pub fn tan_max(&self) -> Option<f64> {
        self.pf_min.map(|pf| (1.0 - pf * pf).sqrt() / pf)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: usize,
    pub from_bus: usize,
    pub to_bus: usize,
    #[serde(default)]
    pub r: f64,
    pub x: f64,
    /// Total line charging susceptance
    #[serde(default)]
    pub b: f64,
    /// Off-nominal tap ratio; 0 means nominal
    #[serde(default = "one")]
    pub tap: f64,
    #[serde(default)]
    pub shift_deg: f64,
    /// Apparent power rating; 0 leaves the branch unmonitored
    #[serde(default)]
    pub rate_mva: f64,
    #[serde(default = "yes")]
    pub in_service: bool,
}

impl Branch {
    pub fn effective_tap(&self) -> f64 {
        if self.tap == 0.0 {
            1.0
        } else {
            self.tap
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcNetwork {
    #[serde(default = "default_base_mva")]
    pub base_mva: f64,
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub generators: Vec<Generator>,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

/// Positional view of a validated network.
///
/// Only in-service generators and branches are listed; `generators[k]` and
/// `branches[k]` hold positions into the corresponding [`AcNetwork`] vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkIndex {
    pub bus_index: HashMap<usize, usize>,
    pub generators: Vec<usize>,
    /// Bus position of each in-service generator
    pub gen_bus: Vec<usize>,
    pub branches: Vec<usize>,
    /// `(from, to)` bus positions of each in-service branch
    pub branch_ends: Vec<(usize, usize)>,
    pub slack: Vec<usize>,
    /// Buses with a fixed voltage magnitude (`vm_min == vm_max`)
    pub pv: Vec<usize>,
    pub pq: Vec<usize>,
    /// Positions into `branches` of the rated branches
    pub monitored: Vec<usize>,
}

impl NetworkIndex {
    pub fn n_bus(&self) -> usize {
        self.pv.len() + self.pq.len()
    }

    pub fn n_gen(&self) -> usize {
        self.generators.len()
    }

    pub fn n_branch(&self) -> usize {
        self.branches.len()
    }
}

impl AcNetwork {
    pub fn from_json_str(text: &str) -> GridIpsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GridIpsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        self.index().map(|_| ())
    }

    /// Validate the data and build the positional index.
    pub fn index(&self) -> Result<NetworkIndex, NetworkError> {
        if self.buses.is_empty() {
            return Err(NetworkError::NoBuses);
        }
        if !(self.base_mva > 0.0 && self.base_mva.is_finite()) {
            return Err(NetworkError::InvalidLimits {
                element: "network".to_string(),
                message: format!("base_mva must be positive, got {}", self.base_mva),
            });
        }

        let mut bus_index = HashMap::with_capacity(self.buses.len());
        for (pos, bus) in self.buses.iter().enumerate() {
            if bus_index.insert(bus.id, pos).is_some() {
                return Err(NetworkError::DuplicateBus(bus.id));
            }
            if bus.vm_min > bus.vm_max || bus.vm_min <= 0.0 {
                return Err(NetworkError::InvalidLimits {
                    element: format!("bus {}", bus.id),
                    message: format!("voltage limits [{}, {}]", bus.vm_min, bus.vm_max),
                });
            }
        }
        let locate = |element: String, bus: usize| {
            bus_index
                .get(&bus)
                .copied()
                .ok_or(NetworkError::UnknownBus { element, bus })
        };

        let mut generators = Vec::new();
        let mut gen_bus = Vec::new();
        for (pos, gen) in self.generators.iter().enumerate() {
            let bus = locate(format!("generator {}", gen.id), gen.bus)?;
            if !gen.in_service {
                continue;
            }
            if gen.p_min_mw > gen.p_max_mw || gen.q_min_mvar > gen.q_max_mvar {
                return Err(NetworkError::InvalidLimits {
                    element: format!("generator {}", gen.id),
                    message: format!(
                        "P [{}, {}] MW, Q [{}, {}] MVAr",
                        gen.p_min_mw, gen.p_max_mw, gen.q_min_mvar, gen.q_max_mvar
                    ),
                });
            }
            if let Some(pf) = gen.pf_min {
                if !(pf > 0.0 && pf <= 1.0) {
                    return Err(NetworkError::InvalidLimits {
                        element: format!("generator {}", gen.id),
                        message: format!("power factor {pf} outside (0, 1]"),
                    });
                }
            }
            generators.push(pos);
            gen_bus.push(bus);
        }

        let mut branches = Vec::new();
        let mut branch_ends = Vec::new();
        let mut monitored = Vec::new();
        for (pos, branch) in self.branches.iter().enumerate() {
            let element = format!("branch {}", branch.id);
            let from = locate(element.clone(), branch.from_bus)?;
            let to = locate(element.clone(), branch.to_bus)?;
            if !branch.in_service {
                continue;
            }
            if from == to {
                return Err(NetworkError::InvalidLimits {
                    element,
                    message: "branch connects a bus to itself".to_string(),
                });
            }
            if branch.r == 0.0 && branch.x == 0.0 {
                return Err(NetworkError::ZeroImpedance(branch.id));
            }
            if branch.rate_mva > 0.0 {
                monitored.push(branches.len());
            }
            branches.push(pos);
            branch_ends.push((from, to));
        }

        let mut slack: Vec<usize> = self
            .buses
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_slack)
            .map(|(pos, _)| pos)
            .collect();
        if slack.is_empty() {
            slack.push(*gen_bus.first().ok_or(NetworkError::NoSlack)?);
        }

        let (pv, pq): (Vec<usize>, Vec<usize>) =
            (0..self.buses.len()).partition(|&k| self.buses[k].vm_min == self.buses[k].vm_max);

        Ok(NetworkIndex {
            bus_index,
            generators,
            gen_bus,
            branches,
            branch_ends,
            slack,
            pv,
            pq,
            monitored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASE: &str = r#"{
        "buses": [
            {"id": 1, "vm_min": 1.02, "vm_max": 1.02},
            {"id": 2, "p_load_mw": 90.0, "q_load_mvar": 30.0}
        ],
        "generators": [
            {"id": 1, "bus": 1, "p_max_mw": 250.0, "q_min_mvar": -100.0, "q_max_mvar": 100.0, "cost": [0.0, 20.0, 0.05]},
            {"id": 2, "bus": 2, "p_max_mw": 50.0, "q_min_mvar": -10.0, "q_max_mvar": 10.0, "in_service": false}
        ],
        "branches": [
            {"id": 1, "from_bus": 1, "to_bus": 2, "r": 0.01, "x": 0.1, "rate_mva": 120.0},
            {"id": 2, "from_bus": 1, "to_bus": 2, "x": 0.2}
        ]
    }"#;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let net = AcNetwork::from_json_str(CASE).unwrap();
        assert_eq!(net.base_mva, 100.0);
        assert_eq!(net.buses[1].vm_min, 0.9);
        assert_eq!(net.branches[1].tap, 1.0);
        assert!(net.generators[0].in_service);
    }

    #[test]
    fn test_index_classifies_buses_and_branches() {
        let idx = AcNetwork::from_json_str(CASE).unwrap().index().unwrap();
        assert_eq!(idx.slack, vec![0]);
        assert_eq!(idx.pv, vec![0]);
        assert_eq!(idx.pq, vec![1]);
        assert_eq!(idx.generators, vec![0]);
        assert_eq!(idx.monitored, vec![0]);
        assert_eq!(idx.branch_ends, vec![(0, 1), (0, 1)]);
    }

    #[test]
    fn test_flagged_slack_wins() {
        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        net.buses[1].is_slack = true;
        assert_eq!(net.index().unwrap().slack, vec![1]);
    }

    #[test]
    fn test_validation_errors() {
        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        net.branches[0].to_bus = 7;
        assert!(matches!(net.validate(), Err(NetworkError::UnknownBus { bus: 7, .. })));

        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        net.branches[1].x = 0.0;
        assert_eq!(net.validate(), Err(NetworkError::ZeroImpedance(2)));

        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        net.generators.clear();
        assert_eq!(net.validate(), Err(NetworkError::NoSlack));

        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        net.buses[1].id = 1;
        assert_eq!(net.validate(), Err(NetworkError::DuplicateBus(1)));

        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        net.generators[0].pf_min = Some(1.2);
        assert!(matches!(net.validate(), Err(NetworkError::InvalidLimits { .. })));
    }

    #[test]
    fn test_power_factor_sets_capability_cone() {
        let mut net = AcNetwork::from_json_str(CASE).unwrap();
        assert_eq!(net.generators[0].tan_max(), None);
        net.generators[0].pf_min = Some(0.8);
        let tan = net.generators[0].tan_max().unwrap();
        assert!((tan - 0.75).abs() < 1e-12);
        net.generators[0].pf_min = Some(1.0);
        assert_eq!(net.generators[0].tan_max(), Some(0.0));
    }
}
