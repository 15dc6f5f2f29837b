//! Per-genome target database resolution

use sbsp_core::{GenomeInfo, SbspError, SbspResult};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Maps a genome's `ancestor` attribute to its target database
#[derive(Debug, Clone)]
pub struct DatabaseResolver {
    databases: BTreeMap<String, PathBuf>,
    /// Base for relative database paths
    data_dir: Option<PathBuf>,
    require_exists: bool,
}

impl DatabaseResolver {
    pub fn new(databases: BTreeMap<String, PathBuf>) -> Self {
        Self {
            databases,
            data_dir: None,
            require_exists: true,
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn require_exists(mut self, require: bool) -> Self {
        self.require_exists = require;
        self
    }

    pub fn resolve(&self, genome: &GenomeInfo) -> SbspResult<PathBuf> {
        let ancestor = genome.ancestor().ok_or_else(|| {
            SbspError::Resolution(format!("genome {} has no ancestor attribute", genome.name))
        })?;

        let configured = self.databases.get(ancestor).ok_or_else(|| {
            SbspError::Resolution(format!(
                "no target database configured for ancestor {} (genome {})",
                ancestor, genome.name
            ))
        })?;

        let path = match &self.data_dir {
            Some(base) if configured.is_relative() => base.join(configured),
            _ => configured.clone(),
        };

        if self.require_exists && !path.exists() {
            return Err(SbspError::Resolution(format!(
                "target database {} for genome {} does not exist",
                path.display(),
                genome.name
            )));
        }
        Ok(path)
    }
}
