//! Working/data/results directories passed explicitly through a run

use crate::config::PathsConfig;
use crate::system::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directories a run reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub pd_work: PathBuf,
    pub pd_data: PathBuf,
    pub pd_results: PathBuf,
}

impl Environment {
    /// Build from explicit overrides, falling back to the `SBSP_*` defaults
    pub fn new(
        pd_work: Option<PathBuf>,
        pd_data: Option<PathBuf>,
        pd_results: Option<PathBuf>,
    ) -> Self {
        Self {
            pd_work: pd_work.unwrap_or_else(paths::sbsp_work_dir),
            pd_data: pd_data.unwrap_or_else(paths::sbsp_data_dir),
            pd_results: pd_results.unwrap_or_else(paths::sbsp_results_dir),
        }
    }

    /// Command-line overrides take precedence over the `[paths]` section
    pub fn from_config(config: &PathsConfig, pd_work: Option<PathBuf>) -> Self {
        Self::new(
            pd_work.or_else(|| config.pd_work.clone()),
            config.pd_data.clone(),
            config.pd_results.clone(),
        )
    }

    /// Same environment with a different working directory
    pub fn with_work_dir(&self, pd_work: impl Into<PathBuf>) -> Self {
        Self {
            pd_work: pd_work.into(),
            ..self.clone()
        }
    }

    /// Same environment working in a subdirectory of the current one
    pub fn nested(&self, name: impl AsRef<Path>) -> Self {
        self.with_work_dir(self.pd_work.join(name))
    }
}
