//! End-to-end AC optimal power flow tests

use gridips_algo::ips::Termination;
use gridips_algo::opf::{
    run_power_flow, solve_ac_opf, solve_ac_opf_with, AcNetwork, AcOpfResult, OpfOptions,
    SoftLimitCosts,
};
use gridips_algo::{IpsOptions, NetworkError, OpfError};
use gridips_core::SolverKind;
use std::fs;
use tempfile::tempdir;

const THREE_BUS: &str = r#"{
    "base_mva": 100.0,
    "buses": [
        {"id": 1, "is_slack": true, "vm_min": 0.95, "vm_max": 1.05},
        {"id": 2, "p_load_mw": 60.0, "q_load_mvar": 20.0, "vm_min": 0.95, "vm_max": 1.05},
        {"id": 3, "p_load_mw": 90.0, "q_load_mvar": 30.0, "bs_mvar": 10.0, "vm_min": 0.95, "vm_max": 1.05}
    ],
    "generators": [
        {"id": 1, "bus": 1, "p_mw": 100.0, "vset": 1.02, "p_max_mw": 250.0, "q_min_mvar": -100.0, "q_max_mvar": 100.0, "cost": [50.0, 12.0, 0.02]},
        {"id": 2, "bus": 3, "p_mw": 50.0, "vset": 1.0, "p_min_mw": 10.0, "p_max_mw": 120.0, "q_min_mvar": -60.0, "q_max_mvar": 60.0, "cost": [20.0, 18.0, 0.05]}
    ],
    "branches": [
        {"id": 1, "from_bus": 1, "to_bus": 2, "r": 0.01, "x": 0.08, "b": 0.02, "rate_mva": 200.0},
        {"id": 2, "from_bus": 2, "to_bus": 3, "r": 0.02, "x": 0.12, "b": 0.01, "rate_mva": 150.0},
        {"id": 3, "from_bus": 1, "to_bus": 3, "r": 0.015, "x": 0.1, "b": 0.015, "tap": 0.98}
    ]
}"#;

/// Cheap remote unit, expensive local unit, one line rated `rate_mva`.
fn constrained_two_bus(rate_mva: f64) -> AcNetwork {
    AcNetwork::from_json_str(&format!(
        r#"{{
            "buses": [
                {{"id": 1, "is_slack": true, "vm_min": 0.95, "vm_max": 1.05}},
                {{"id": 2, "p_load_mw": 50.0, "q_load_mvar": 10.0, "vm_min": 0.95, "vm_max": 1.05}}
            ],
            "generators": [
                {{"id": 1, "bus": 1, "p_max_mw": 100.0, "q_min_mvar": -50.0, "q_max_mvar": 50.0, "cost": [0.0, 10.0, 0.01]}},
                {{"id": 2, "bus": 2, "p_max_mw": 100.0, "q_min_mvar": -50.0, "q_max_mvar": 50.0, "cost": [0.0, 40.0, 0.01]}}
            ],
            "branches": [
                {{"id": 1, "from_bus": 1, "to_bus": 2, "r": 0.01, "x": 0.05, "rate_mva": {rate_mva}}}
            ]
        }}"#
    ))
    .expect("valid network")
}

fn three_bus() -> AcNetwork {
    AcNetwork::from_json_str(THREE_BUS).expect("valid network")
}

fn total_generation(result: &AcOpfResult) -> f64 {
    result.generators.iter().map(|g| g.pg_mw).sum()
}

fn assert_physical(result: &AcOpfResult) {
    let load = 150.0;
    let generation = total_generation(result);
    // losses are positive and small
    assert!(generation > load && generation < load * 1.05, "generation {generation}");
    for bus in &result.buses {
        assert!(bus.vm > 0.95 - 1e-4 && bus.vm < 1.05 + 1e-4, "bus {} vm {}", bus.id, bus.vm);
    }
    assert!(result.buses[0].va_deg.abs() < 1e-8);
}

#[test]
fn flat_start_converges() {
    let result = solve_ac_opf(&three_bus(), &OpfOptions::default()).expect("solve");

    assert!(result.converged, "{result}");
    assert_eq!(result.termination, Termination::Converged);
    assert!(result.iterations < 60);
    assert_physical(&result);
    for category in ["convergence", "voltage", "thermal", "generator"] {
        assert!(
            result.diagnostics.issues.iter().all(|i| i.category != category),
            "{}",
            result.diagnostics
        );
    }
    assert!(result.derivative_check.is_none());
    assert_eq!(result.trace.len(), result.iterations);
}

#[test]
fn power_flow_start_reaches_the_same_optimum() {
    let flat = solve_ac_opf(&three_bus(), &OpfOptions::default()).expect("flat solve");
    let options = OpfOptions {
        ips: IpsOptions::default().with_pf_init(true),
        ..OpfOptions::default()
    };
    let seeded = solve_ac_opf(&three_bus(), &options).expect("seeded solve");

    assert!(seeded.converged, "{seeded}");
    assert!((seeded.objective - flat.objective).abs() < 1e-3 * flat.objective);
    for (a, b) in seeded.generators.iter().zip(&flat.generators) {
        assert!((a.pg_mw - b.pg_mw).abs() < 0.1, "generator {}", a.id);
    }
}

#[test]
fn step_control_converges() {
    let options = OpfOptions {
        ips: IpsOptions::default()
            .with_step_control(1.0)
            .with_max_iterations(200),
        ..OpfOptions::default()
    };
    let result = solve_ac_opf(&three_bus(), &options).expect("solve");

    assert!(result.converged, "{result}");
    assert_physical(&result);
}

#[test]
fn power_factor_limit_caps_reactive_output() {
    let free = solve_ac_opf(&three_bus(), &OpfOptions::default()).expect("free solve");
    let mut network = three_bus();
    network.generators[1].pf_min = Some(0.95);
    let tan = network.generators[1].tan_max().expect("cone");
    let limited = solve_ac_opf(&network, &OpfOptions::default()).expect("limited solve");

    assert!(limited.converged, "{limited}");
    assert_physical(&limited);
    let unit = &limited.generators[1];
    let (p, q) = (unit.pg_mw / 100.0, unit.qg_mvar / 100.0);
    assert!(q * q - tan * tan * p * p < 1e-5, "P {} MW, Q {} MVAr", unit.pg_mw, unit.qg_mvar);
    // the cone only removes options
    assert!(limited.objective >= free.objective - 1e-6 * free.objective);
}

#[test]
fn gauss_backend_matches_faer() {
    let faer = solve_ac_opf(&three_bus(), &OpfOptions::default()).expect("faer solve");
    let options = OpfOptions {
        linear_solver: SolverKind::Gauss,
        ..OpfOptions::default()
    };
    let gauss = solve_ac_opf(&three_bus(), &options).expect("gauss solve");

    assert!(gauss.converged);
    assert!((gauss.objective - faer.objective).abs() < 1e-6 * faer.objective);
}

#[test]
fn marginal_prices_are_positive() {
    let result = solve_ac_opf(&three_bus(), &OpfOptions::default()).expect("solve");
    assert!(result.converged);

    // an extra MW at any bus costs at least the cheapest marginal cost
    for bus in &result.buses {
        assert!(bus.lam_p > 12.0, "bus {} price {}", bus.id, bus.lam_p);
        assert!(bus.lam_p < 40.0, "bus {} price {}", bus.id, bus.lam_p);
    }
    // the slack unit is not at a limit, so its bus price is its marginal cost
    let pg = result.generators[0].pg_mw;
    let marginal = 12.0 + 2.0 * 0.02 * pg;
    assert!((result.buses[0].lam_p - marginal).abs() < 0.05 * marginal);
}

#[test]
fn unrated_line_dispatches_the_cheap_unit() {
    let result = solve_ac_opf(&constrained_two_bus(0.0), &OpfOptions::default()).expect("solve");

    assert!(result.converged, "{result}");
    assert!(result.generators[0].pg_mw > 49.0);
    assert!(result.generators[1].pg_mw < 1.0);
    assert_eq!(result.branches[0].loading, 0.0);
}

#[test]
fn thermal_limit_separates_prices() {
    let result = solve_ac_opf(&constrained_two_bus(30.0), &OpfOptions::default()).expect("solve");

    assert!(result.converged, "{result}");
    assert!(result.branches[0].loading <= 1.0 + 1e-3);
    assert!(result.generators[1].pg_mw > 15.0);
    // congestion: the load bus pays the expensive unit
    assert!(result.buses[1].lam_p > result.buses[0].lam_p + 10.0);
}

#[test]
fn soft_limits_allow_cheap_overload() {
    let options = OpfOptions {
        soft_limits: Some(SoftLimitCosts {
            branch: 1.0,
            voltage: 1e4,
        }),
        ..OpfOptions::default()
    };
    let result = solve_ac_opf(&constrained_two_bus(30.0), &options).expect("solve");

    assert!(result.converged, "{result}");
    assert!(result.branches[0].loading > 1.2);
    assert!(result.generators[1].pg_mw < 5.0);
    assert!(result
        .diagnostics
        .issues
        .iter()
        .any(|issue| issue.category == "thermal"));
}

#[test]
fn case_file_round_trip() {
    let dir = tempdir().expect("tempdir");
    let case = dir.path().join("case3.json");
    let config = dir.path().join("opf.toml");
    fs::write(&case, THREE_BUS).expect("write case");
    fs::write(
        &config,
        "linear_solver = \"gauss\"\n\n[ips]\nmax_iter = 80\npf_init = true\n",
    )
    .expect("write config");

    let network = AcNetwork::from_json_file(&case).expect("read case");
    let options = OpfOptions::from_toml_file(&config).expect("read config");
    assert_eq!(options.linear_solver, SolverKind::Gauss);
    assert_eq!(options.ips.max_iter, 80);

    let result = solve_ac_opf(&network, &options).expect("solve");
    assert!(result.converged, "{result}");
    assert_eq!(network.buses.len(), 3);
}

#[test]
fn derivative_check_runs_before_the_solve() {
    let options = OpfOptions {
        verify_derivatives: true,
        ..OpfOptions::default()
    };
    let result = solve_ac_opf(&three_bus(), &options).expect("solve");

    let report = result.derivative_check.as_ref().expect("report requested");
    assert!(report.passes(1e-4), "{report}");
    assert!(!report.blocks.is_empty());
    assert!(result
        .diagnostics
        .issues
        .iter()
        .all(|issue| issue.category != "derivatives"));
}

#[test]
fn cancelled_run_reports_partial_result() {
    let result = solve_ac_opf_with(&three_bus(), &OpfOptions::default(), |solver| {
        solver.with_cancel_check(|| true)
    })
    .expect("cancellation is not an error");

    assert!(!result.converged);
    assert_eq!(result.termination, Termination::Cancelled);
    assert_eq!(result.iterations, 0);
    assert!(result
        .diagnostics
        .issues
        .iter()
        .any(|issue| issue.category == "convergence"));
}

#[test]
fn unconverged_seed_is_an_error() {
    let mut options = OpfOptions {
        ips: IpsOptions::default().with_pf_init(true),
        ..OpfOptions::default()
    };
    options.power_flow.max_iter = 1;
    options.power_flow.tol = 1e-12;

    let err = solve_ac_opf(&three_bus(), &options).unwrap_err();
    assert!(matches!(err, OpfError::PowerFlow(_)), "{err}");
}

#[test]
fn power_flow_holds_generator_voltages() {
    let pf = run_power_flow(&three_bus(), &OpfOptions::default()).expect("power flow");

    assert!(pf.converged);
    assert!((pf.vm[0] - 1.02).abs() < 1e-12);
    assert!((pf.vm[2] - 1.0).abs() < 1e-12);
    assert!(pf.va[0].abs() < 1e-12);
    assert!(pf.max_mismatch < 1e-8);
}

#[test]
fn bad_network_is_rejected() {
    let mut network = three_bus();
    network.branches[0].to_bus = 99;

    let err = solve_ac_opf(&network, &OpfOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        OpfError::Network(NetworkError::UnknownBus { bus: 99, .. })
    ));
}
