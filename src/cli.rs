use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ChvConfig;
use crate::error::Result;
use crate::pipeline::PhaseSelection;

#[derive(Parser)]
#[command(name = "chv-calc")]
#[command(about = "Convex hull volume heterogeneity across vegetation index stacks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Input root holding MTs/ and STMs/
    #[arg(short, long, global = true)]
    pub input: Option<PathBuf>,

    /// Output directory (default: <input>/CHV)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Number of tasks processed at once
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Rows per processing block
    #[arg(long, global = true)]
    pub block_height: Option<usize>,

    /// Seconds without progress before a task is given up
    #[arg(long, global = true)]
    pub task_timeout: Option<u64>,

    /// Fail when the catalog is not uniform or holds malformed names
    #[arg(long, global = true)]
    pub strict_catalog: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute CHV rasters
    Run {
        /// Phases to run
        #[arg(long, value_enum, default_value_t = PhaseArg::All)]
        phase: PhaseArg,

        /// Write a JSON report of every task outcome
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the catalog and the tasks it yields without running them
    Plan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    All,
    Mt,
    Stm,
}

impl From<PhaseArg> for PhaseSelection {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::All => PhaseSelection::All,
            PhaseArg::Mt => PhaseSelection::Mt,
            PhaseArg::Stm => PhaseSelection::Stm,
        }
    }
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied.
    pub fn load_config(&self) -> Result<ChvConfig> {
        let mut config = match &self.config {
            Some(path) => ChvConfig::from_file(path)?,
            None => ChvConfig::default(),
        };

        if let Some(input) = &self.input {
            config.input_root = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_root = Some(output.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(block_height) = self.block_height {
            config.block_height = block_height;
        }
        if let Some(timeout) = self.task_timeout {
            config.task_timeout_secs = Some(timeout);
        }
        if self.strict_catalog {
            config.strict_catalog = true;
        }

        config.validate()?;
        Ok(config)
    }
}
