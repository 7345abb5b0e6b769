use anyhow::Result;
use clap::Parser;
use gridips_cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Opf(args) => commands::opf::handle(args),
        Commands::Pf { case, config, out } => {
            commands::pf::handle(case, config.as_deref(), out.as_deref())
        }
        Commands::Solvers => commands::solver::list_solvers(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str().to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
