// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chv_calc::cli::{Cli, Commands};
use chv_calc::pipeline::{self, Plan};

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = cli.load_config().context("loading configuration")?;

    match &cli.command {
        Commands::Plan => {
            let plan = Plan::resolve(&config).context("resolving catalog")?;
            println!("{plan}");
        }
        Commands::Run { phase, report } => {
            let run_report = pipeline::run(&config, (*phase).into()).context("CHV run")?;

            for summary in &run_report.phases {
                println!("{summary}");
            }
            if let Some(path) = report {
                run_report
                    .write_json(path)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }
            println!("Results in: {}", config.output_root().display());
        }
    }

    Ok(())
}
