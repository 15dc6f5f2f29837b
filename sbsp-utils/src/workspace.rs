/// Working-directory layout for dispatch rounds and per-genome runs
///
/// Every concurrently running unit (chunk or genome run) gets its own
/// directory, so no two units ever write the same path.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File name of the per-unit status record
pub const RUN_METADATA_FILE: &str = "run.json";

/// Directory layout rooted at one working directory
#[derive(Debug, Clone)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<prefix>_<index>`
    pub fn unit_dir(&self, prefix: &str, index: usize) -> PathBuf {
        self.root.join(format!("{}_{}", prefix, index))
    }

    pub fn create_unit_dir(&self, prefix: &str, index: usize) -> Result<PathBuf> {
        let dir = self.unit_dir(prefix, index);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create unit directory: {:?}", dir))?;
        Ok(dir)
    }

    /// `<root>/<item>/<run_name>`
    pub fn item_dir(&self, item: &str, run_name: &str) -> Result<PathBuf> {
        check_component(item)?;
        check_component(run_name)?;
        Ok(self.root.join(item).join(run_name))
    }

    pub fn create_item_dir(&self, item: &str, run_name: &str) -> Result<PathBuf> {
        let dir = self.item_dir(item, run_name)?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create item directory: {:?}", dir))?;
        Ok(dir)
    }
}

/// Reject names that would escape or collide inside the layout
fn check_component(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        anyhow::bail!("Invalid directory name: {:?}", name);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Active,
    Completed,
    Failed,
}

/// Status record persisted next to a unit's outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub name: String,
    pub created_at: u64,
    pub finished_at: Option<u64>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

impl RunMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: unix_now(),
            finished_at: None,
            status: RunStatus::Active,
            error_message: None,
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(unix_now());
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(unix_now());
        self.error_message = Some(error.to_string());
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        write_json_manifest(dir, RUN_METADATA_FILE, self)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(RUN_METADATA_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run metadata: {:?}", path))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Serialize `value` as pretty JSON into `<dir>/<file_name>`
pub fn write_json_manifest<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).with_context(|| format!("Failed to write manifest: {:?}", path))?;
    Ok(path)
}

/// Write one value per line
pub fn write_list_file(path: &Path, values: &[String]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create list file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writeln!(writer, "{}", value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one value per line, skipping blank lines
pub fn read_list_file(path: &Path) -> Result<Vec<String>> {
    let file =
        fs::File::open(path).with_context(|| format!("Failed to open list file: {:?}", path))?;
    let mut values = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            values.push(trimmed.to_string());
        }
    }
    Ok(values)
}

/// Keep only the paths that exist on disk, preserving order
pub fn existing_files<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(Into::into)
        .filter(|p: &PathBuf| p.exists())
        .collect()
}

/// Write `phase,seconds` rows
pub fn write_timings(path: &Path, timings: &[(String, Duration)]) -> Result<()> {
    let mut content = String::new();
    for (phase, elapsed) in timings {
        content.push_str(&format!("{},{:.3}\n", phase, elapsed.as_secs_f64()));
    }
    fs::write(path, content).with_context(|| format!("Failed to write timings: {:?}", path))?;
    Ok(())
}
