//! `gridips opf`: AC optimal power flow from a JSON case.

use anyhow::{Context, Result};
use gridips_algo::opf::{solve_ac_opf, OpfOptions};
use gridips_cli::common::{load_network, load_options, write_json_file};
use gridips_cli::OpfArgs;
use std::time::Instant;
use tracing::info;

const PLOT_WIDTH: usize = 60;
const PLOT_HEIGHT: usize = 12;

/// Apply command-line flags on top of the options from the config file.
pub fn merge_flags(mut options: OpfOptions, args: &OpfArgs) -> Result<OpfOptions> {
    if let Some(max_iter) = args.max_iter {
        options.ips.max_iter = max_iter;
    }
    if let Some(tol) = args.tol {
        options.ips.tol = tol;
    }
    if let Some(trust) = args.trust {
        options.ips.trust = trust;
    }
    if let Some(solver) = args.solver {
        options.linear_solver = solver;
    }
    options.ips.pf_init |= args.pf_init;
    options.ips.step_control |= args.step_control;
    options.ips.nan_guard |= args.nan_guard;
    options.verify_derivatives |= args.verify_derivatives;
    options.validate().context("invalid options")?;
    Ok(options)
}

pub fn handle(args: &OpfArgs) -> Result<()> {
    let start = Instant::now();
    let network = load_network(&args.case)?;
    let options = merge_flags(load_options(args.config.as_deref())?, args)?;
    info!(
        case = %args.case.display(),
        buses = network.buses.len(),
        generators = network.generators.len(),
        branches = network.branches.len(),
        solver = %options.linear_solver,
        "running AC-OPF"
    );

    let result = solve_ac_opf(&network, &options)
        .with_context(|| format!("solving AC-OPF for {}", args.case.display()))?;

    print!("{result}");
    if let Some(report) = &result.derivative_check {
        print!("{report}");
    }
    if args.plot_error {
        println!();
        print!("{}", result.render_error_trace(PLOT_WIDTH, PLOT_HEIGHT));
    }
    if let Some(out) = &args.out {
        write_json_file(&result, out)?;
        info!(path = %out.display(), "wrote AC-OPF result");
    }
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "opf done");
    Ok(())
}
