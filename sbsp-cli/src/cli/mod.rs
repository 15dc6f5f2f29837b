pub mod commands;
pub mod global_config;
pub mod output;

use clap::{Parser, Subcommand};
use sbsp_core::ExecutionMode;

pub use global_config::GlobalOptions;

#[derive(Parser)]
#[command(
    name = "sbsp",
    version,
    about = "Partitioned dispatch of start-site prediction pipelines",
    long_about = "sbsp splits each pipeline step into chunks, runs the chunks locally, \
                  as isolated processes, or as PBS jobs, and merges their outputs. \
                  The run command processes many genomes with a cap on how many are \
                  active at once."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of chunks each step is split into
    #[arg(short = 'j', long, global = true, value_name = "N")]
    pub num_jobs: Option<usize>,

    /// Where chunks execute
    #[arg(long, global = true, value_parser = parse_mode, value_name = "MODE")]
    pub mode: Option<ExecutionMode>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline for every genome of a list, a few at a time
    Run(commands::run::RunArgs),

    /// Run the pipeline once over a whole query list
    Pipeline(commands::pipeline::PipelineArgs),
}

impl Cli {
    pub fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            verbose: self.verbose,
            num_jobs: self.num_jobs,
            mode: self.mode,
        }
    }
}

fn parse_mode(value: &str) -> Result<ExecutionMode, String> {
    value.parse().map_err(|e: sbsp_core::SbspError| e.to_string())
}
