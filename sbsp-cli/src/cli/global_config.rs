//! Options shared by every subcommand

use sbsp_core::{Config, ExecutionMode};
use tracing::warn;

/// Global flags, applied on top of the loaded configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalOptions {
    pub verbose: u8,
    pub num_jobs: Option<usize>,
    pub mode: Option<ExecutionMode>,
}

impl GlobalOptions {
    pub fn is_verbose(&self) -> bool {
        self.verbose > 0
    }

    /// Log filter implied by `-v` when `SBSP_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    /// Command-line flags win over the configuration file
    pub fn apply(&self, config: &mut Config) {
        if let Some(num_jobs) = self.num_jobs {
            config.dispatch.num_jobs = num_jobs;
        }
        if let Some(mode) = self.mode {
            config.dispatch.mode = mode;
        }

        let cpus = num_cpus::get();
        if config.dispatch.mode == ExecutionMode::Local && config.dispatch.num_jobs > cpus {
            warn!(
                "num_jobs {} exceeds the {} available CPUs in local mode",
                config.dispatch.num_jobs, cpus
            );
        }
    }
}
