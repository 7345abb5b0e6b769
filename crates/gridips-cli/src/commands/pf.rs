use anyhow::{Context, Result};
use gridips_algo::opf::{run_power_flow, AcNetwork, PowerFlowSolution};
use gridips_cli::common::{load_network, load_options, write_json_file};
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};

pub fn handle(case: &Path, config: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let network = load_network(case)?;
    let options = load_options(config)?;
    let solution = run_power_flow(&network, &options)
        .with_context(|| format!("running power flow for {}", case.display()))?;

    if solution.converged {
        info!(
            iterations = solution.iterations,
            mismatch = solution.max_mismatch,
            "power flow converged"
        );
    } else {
        warn!(
            iterations = solution.iterations,
            mismatch = solution.max_mismatch,
            "power flow did not converge"
        );
    }

    print_summary(&mut io::stdout().lock(), &network, &solution)?;
    if let Some(out) = out {
        write_json_file(&solution, out)?;
        info!(path = %out.display(), "wrote power-flow solution");
    }
    Ok(())
}

fn print_summary<W: Write>(
    writer: &mut W,
    network: &AcNetwork,
    solution: &PowerFlowSolution,
) -> io::Result<()> {
    writeln!(writer, "converged:  {}", solution.converged)?;
    writeln!(writer, "iterations: {}", solution.iterations)?;
    writeln!(writer, "mismatch:   {:.3e}", solution.max_mismatch)?;
    writeln!(writer, "{:>6} {:>8} {:>9} {:>10} {:>10}", "bus", "vm", "va_deg", "p_mw", "q_mvar")?;
    let base = network.base_mva;
    for (k, bus) in network.buses.iter().enumerate() {
        writeln!(
            writer,
            "{:>6} {:>8.4} {:>9.3} {:>10.3} {:>10.3}",
            bus.id,
            solution.vm[k],
            solution.va[k].to_degrees(),
            solution.s_bus[k].re * base,
            solution.s_bus[k].im * base
        )?;
    }
    Ok(())
}
