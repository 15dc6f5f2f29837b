pub mod pipeline;
pub mod run;

use crate::cli::GlobalOptions;
use crate::pipeline::Step;
use clap::Args;
use sbsp_core::config::{default_config, load_config};
use sbsp_core::{describe_paths, Config, Environment, SbspResult};
use std::path::PathBuf;
use tracing::{debug, info};

/// Arguments shared by `run` and `pipeline`
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Configuration file (TOML)
    #[arg(long, env = "SBSP_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Working directory (overrides [paths].pd_work and SBSP_WORK_DIR)
    #[arg(long = "pd-work", value_name = "DIR")]
    pub pd_work: Option<PathBuf>,

    /// Steps to run, in pipeline order regardless of how they are listed
    #[arg(long, value_enum, value_delimiter = ',', num_args = 1..)]
    pub steps: Vec<Step>,
}

impl CommonArgs {
    /// Configuration with the global flags applied, and the run environment
    pub fn load(&self, global: &GlobalOptions) -> SbspResult<(Config, Environment)> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                load_config(path)?
            }
            None => default_config(),
        };
        global.apply(&mut config);
        debug!("{}", describe_paths());

        let environment = Environment::from_config(&config.paths, self.pd_work.clone());
        Ok((config, environment))
    }
}
