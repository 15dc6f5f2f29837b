//! Configuration types for SBSP

use crate::SbspError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub pbs: PbsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Ancestor (clade) name to target database path
    #[serde(default)]
    pub databases: BTreeMap<String, PathBuf>,
    /// Pipeline steps keyed by step name
    #[serde(default)]
    pub steps: BTreeMap<String, StepConfig>,
}

/// Where chunks execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// In-process, one thread per chunk
    #[default]
    Local,
    /// One local child process per chunk
    Isolated,
    /// One batch-scheduler job per chunk
    Cluster,
}

impl std::str::FromStr for ExecutionMode {
    type Err = SbspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "isolated" | "subprocess" => Ok(ExecutionMode::Isolated),
            "cluster" | "pbs" => Ok(ExecutionMode::Cluster),
            _ => Err(SbspError::Configuration(format!("Unknown execution mode: {}", s))),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Isolated => "isolated",
            ExecutionMode::Cluster => "cluster",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Desired number of chunks per dispatch round
    #[serde(default = "default_num_jobs")]
    pub num_jobs: usize,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_local_poll_secs")]
    pub local_poll_secs: u64,
    #[serde(default = "default_cluster_poll_secs")]
    pub cluster_poll_secs: u64,
    /// Give up on unfinished chunks after this long (unbounded when unset)
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
    /// Prefix of the per-chunk working directories
    #[serde(default = "default_dn_compute")]
    pub dn_compute: String,
    /// Directory receiving merged outputs
    #[serde(default)]
    pub pd_head: Option<PathBuf>,
    /// Directory under which chunk directories are created (defaults to pd_head)
    #[serde(default)]
    pub pd_root_compute: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbsConfig {
    #[serde(default = "default_nodes")]
    pub nodes: u32,
    #[serde(default = "default_ppn")]
    pub ppn: u32,
    #[serde(default = "default_walltime")]
    pub walltime: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default = "default_qsub")]
    pub qsub: String,
    #[serde(default = "default_qstat")]
    pub qstat: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_simultaneous_genomes")]
    pub simultaneous_genomes: usize,
    #[serde(default = "default_scheduler_poll_secs")]
    pub poll_secs: u64,
    /// Name of the per-genome run directory
    #[serde(default = "default_dn_run")]
    pub dn_run: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    #[serde(default)]
    pub pd_work: Option<PathBuf>,
    #[serde(default)]
    pub pd_data: Option<PathBuf>,
    #[serde(default)]
    pub pd_results: Option<PathBuf>,
}

/// How a step's bundle is partitioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SplitKind {
    #[default]
    List,
    Group,
}

/// How a step's chunk outputs are consolidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MergeKind {
    #[default]
    Identity,
    Concat,
    ListFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepConfig {
    /// Argv template run for each chunk
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub split: SplitKind,
    #[serde(default)]
    pub merge: MergeKind,
    /// File name stem of the per-chunk outputs (defaults to the step name)
    #[serde(default)]
    pub output: Option<String>,
    /// Chunk outputs start with a header row (concat merge only)
    #[serde(default)]
    pub header: bool,
}

// Default value functions
fn default_num_jobs() -> usize { 8 }
fn default_local_poll_secs() -> u64 { 2 }
fn default_cluster_poll_secs() -> u64 { 60 }
fn default_dn_compute() -> String { "compute".to_string() }
fn default_nodes() -> u32 { 1 }
fn default_ppn() -> u32 { 8 }
fn default_walltime() -> String { "07:00:00".to_string() }
fn default_qsub() -> String { "qsub".to_string() }
fn default_qstat() -> String { "qstat".to_string() }
fn default_simultaneous_genomes() -> usize { 1 }
fn default_scheduler_poll_secs() -> u64 { 30 }
fn default_dn_run() -> String { "sbsp".to_string() }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            num_jobs: default_num_jobs(),
            mode: ExecutionMode::default(),
            local_poll_secs: default_local_poll_secs(),
            cluster_poll_secs: default_cluster_poll_secs(),
            max_wait_secs: None,
            dn_compute: default_dn_compute(),
            pd_head: None,
            pd_root_compute: None,
        }
    }
}

impl Default for PbsConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            ppn: default_ppn(),
            walltime: default_walltime(),
            queue: None,
            qsub: default_qsub(),
            qstat: default_qstat(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            simultaneous_genomes: default_simultaneous_genomes(),
            poll_secs: default_scheduler_poll_secs(),
            dn_run: default_dn_run(),
        }
    }
}

impl DispatchConfig {
    /// Copy of this configuration rooted at `work_dir`
    ///
    /// `pd_head` always moves to `work_dir`; `pd_root_compute` only when it was unset.
    pub fn with_work_dir(&self, work_dir: &Path) -> Self {
        let head = absolute(work_dir);
        let mut updated = self.clone();
        updated.pd_root_compute = Some(self.pd_root_compute.clone().unwrap_or_else(|| head.clone()));
        updated.pd_head = Some(head);
        updated
    }

    pub fn head_dir(&self) -> PathBuf {
        self.pd_head.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn compute_root(&self) -> PathBuf {
        self.pd_root_compute
            .clone()
            .unwrap_or_else(|| self.head_dir())
    }

    pub fn local_poll_interval(&self) -> Duration {
        Duration::from_secs(self.local_poll_secs)
    }

    pub fn cluster_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_poll_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

impl Config {
    /// Reject values the dispatcher and scheduler cannot work with
    pub fn validate(&self) -> Result<(), SbspError> {
        if self.dispatch.num_jobs == 0 {
            return Err(SbspError::Configuration("dispatch.num_jobs must be at least 1".into()));
        }
        if self.scheduler.simultaneous_genomes == 0 {
            return Err(SbspError::Configuration(
                "scheduler.simultaneous_genomes must be at least 1".into(),
            ));
        }
        if self.pbs.nodes == 0 || self.pbs.ppn == 0 {
            return Err(SbspError::Configuration("pbs.nodes and pbs.ppn must be positive".into()));
        }
        validate_walltime(&self.pbs.walltime)?;
        if self.dispatch.dn_compute.is_empty() || self.dispatch.dn_compute.contains('/') {
            return Err(SbspError::Configuration(format!(
                "dispatch.dn_compute must be a plain directory name, got {:?}",
                self.dispatch.dn_compute
            )));
        }
        for (name, step) in &self.steps {
            if step.header && step.merge != MergeKind::Concat {
                tracing::warn!("Step {} sets header but does not use concat merge", name);
            }
        }
        Ok(())
    }
}

fn validate_walltime(walltime: &str) -> Result<(), SbspError> {
    let parts: Vec<&str> = walltime.split(':').collect();
    let well_formed = parts.len() == 3
        && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        && parts[1].len() == 2
        && parts[2].len() == 2;
    if !well_formed {
        return Err(SbspError::Configuration(format!(
            "pbs.walltime must be HH:MM:SS, got {:?}",
            walltime
        )));
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, SbspError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), SbspError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| SbspError::Configuration(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.dispatch.num_jobs, 8);
        assert_eq!(config.dispatch.mode, ExecutionMode::Local);
        assert_eq!(config.dispatch.local_poll_secs, 2);
        assert_eq!(config.dispatch.cluster_poll_secs, 60);
        assert_eq!(config.dispatch.max_wait_secs, None);
        assert_eq!(config.dispatch.dn_compute, "compute");

        assert_eq!(config.pbs.nodes, 1);
        assert_eq!(config.pbs.ppn, 8);
        assert_eq!(config.pbs.walltime, "07:00:00");
        assert_eq!(config.pbs.qsub, "qsub");

        assert_eq!(config.scheduler.simultaneous_genomes, 1);
        assert_eq!(config.scheduler.poll_secs, 30);
        assert_eq!(config.scheduler.dn_run, "sbsp");

        assert!(config.databases.is_empty());
        assert!(config.steps.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let toml_content = r#"
[dispatch]
num_jobs = 3
mode = "cluster"

[pbs]
walltime = "01:30:00"

[databases]
Archaea = "/data/db/archaea.dmnd"

[steps.find-orthologs]
command = ["find-orthologs", "--q-list", "{list:query}", "--out", "{output}"]
split = "group"
merge = "concat"
header = true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path()).unwrap();

        assert_eq!(config.dispatch.num_jobs, 3);
        assert_eq!(config.dispatch.mode, ExecutionMode::Cluster);
        assert_eq!(config.dispatch.local_poll_secs, 2);
        assert_eq!(config.pbs.walltime, "01:30:00");
        assert_eq!(config.pbs.ppn, 8);
        assert_eq!(
            config.databases.get("Archaea"),
            Some(&PathBuf::from("/data/db/archaea.dmnd"))
        );

        let step = &config.steps["find-orthologs"];
        assert_eq!(step.split, SplitKind::Group);
        assert_eq!(step.merge, MergeKind::Concat);
        assert!(step.header);
        assert_eq!(step.command.len(), 5);
    }

    #[test]
    fn test_load_invalid_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "this is not valid TOML {{").unwrap();

        match load_config(temp_file.path()).unwrap_err() {
            SbspError::Configuration(msg) => assert!(msg.contains("Failed to parse config")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config("/nonexistent/path/to/sbsp.toml");
        assert!(matches!(result, Err(SbspError::Io(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let mut config = Config::default();
        config.dispatch.num_jobs = 12;
        config.dispatch.max_wait_secs = Some(3600);
        config.scheduler.simultaneous_genomes = 4;
        config
            .databases
            .insert("Bacteria".to_string(), PathBuf::from("/db/bacteria"));

        let temp_file = NamedTempFile::new().unwrap();
        save_config(temp_file.path(), &config).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.dispatch.num_jobs, 12);
        assert_eq!(loaded.dispatch.max_wait_secs, Some(3600));
        assert_eq!(loaded.scheduler.simultaneous_genomes, 4);
        assert_eq!(loaded.databases, config.databases);
    }

    #[test]
    fn test_validate_rejects_zero_widths() {
        let mut config = Config::default();
        config.dispatch.num_jobs = 0;
        assert!(matches!(config.validate(), Err(SbspError::Configuration(_))));

        let mut config = Config::default();
        config.scheduler.simultaneous_genomes = 0;
        assert!(matches!(config.validate(), Err(SbspError::Configuration(_))));
    }

    #[test]
    fn test_validate_walltime() {
        assert!(validate_walltime("07:00:00").is_ok());
        assert!(validate_walltime("120:00:00").is_ok());
        assert!(validate_walltime("7:00").is_err());
        assert!(validate_walltime("07:0:00").is_err());
        assert!(validate_walltime("aa:bb:cc").is_err());
    }

    #[test]
    fn test_with_work_dir_defaults_compute_root() {
        let dispatch = DispatchConfig::default();
        let updated = dispatch.with_work_dir(Path::new("/runs/genome_a"));

        assert_eq!(updated.head_dir(), PathBuf::from("/runs/genome_a"));
        assert_eq!(updated.compute_root(), PathBuf::from("/runs/genome_a"));
    }

    #[test]
    fn test_with_work_dir_keeps_explicit_compute_root() {
        let dispatch = DispatchConfig {
            pd_root_compute: Some(PathBuf::from("/scratch")),
            ..DispatchConfig::default()
        };
        let updated = dispatch.with_work_dir(Path::new("/runs/genome_a"));

        assert_eq!(updated.head_dir(), PathBuf::from("/runs/genome_a"));
        assert_eq!(updated.compute_root(), PathBuf::from("/scratch"));
    }

    #[test]
    fn test_execution_mode_parsing() {
        assert_eq!("local".parse::<ExecutionMode>().unwrap(), ExecutionMode::Local);
        assert_eq!("PBS".parse::<ExecutionMode>().unwrap(), ExecutionMode::Cluster);
        assert_eq!("subprocess".parse::<ExecutionMode>().unwrap(), ExecutionMode::Isolated);
        assert!("slurm".parse::<ExecutionMode>().is_err());
    }
}
