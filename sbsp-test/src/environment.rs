//! Test environment management
//!
//! Provides isolated test environments with automatic cleanup using RAII.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use sbsp_core::Environment;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Configuration for test environment
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Preserve the directory tree after a failed test (for debugging)
    pub preserve_on_failure: bool,
    /// Set `SBSP_LOG=debug` for the lifetime of the environment
    pub verbose: bool,
    /// Custom prefix for test directories
    pub prefix: Option<String>,
}

/// Isolated test environment with automatic cleanup
///
/// Points `SBSP_HOME`, `SBSP_WORK_DIR`, `SBSP_DATA_DIR` and
/// `SBSP_RESULTS_DIR` at a temporary tree and restores them on drop. Tests
/// that create one should be `#[serial]`.
pub struct TestEnvironment {
    temp_dir: Option<TempDir>,
    root_path: PathBuf,
    saved_env: HashMap<String, Option<String>>,
    config: TestConfig,
    failed: Mutex<bool>,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        Self::with_config(TestConfig::default())
    }

    pub fn with_config(config: TestConfig) -> Result<Self> {
        let prefix = config.prefix.as_deref().unwrap_or("sbsp-test");
        let temp_dir = TempDir::with_prefix(prefix).context("Failed to create temporary directory")?;
        let root_path = temp_dir.path().to_path_buf();

        for sub in ["work", "data", "results", "databases"] {
            std::fs::create_dir_all(root_path.join(sub))?;
        }

        let mut env = Self {
            temp_dir: Some(temp_dir),
            root_path,
            saved_env: HashMap::new(),
            config,
            failed: Mutex::new(false),
        };
        env.setup_environment();
        Ok(env)
    }

    fn setup_environment(&mut self) {
        let mut vars = vec![
            ("SBSP_HOME", self.root_path.to_string_lossy().into_owned()),
            ("SBSP_WORK_DIR", self.work_dir().to_string_lossy().into_owned()),
            ("SBSP_DATA_DIR", self.data_dir().to_string_lossy().into_owned()),
            ("SBSP_RESULTS_DIR", self.results_dir().to_string_lossy().into_owned()),
        ];
        if self.config.verbose {
            vars.push(("SBSP_LOG", "debug".to_string()));
        }

        for (key, value) in vars {
            self.saved_env.insert(key.to_string(), std::env::var(key).ok());
            std::env::set_var(key, value);
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root_path.join("work")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root_path.join("data")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root_path.join("results")
    }

    pub fn databases_dir(&self) -> PathBuf {
        self.root_path.join("databases")
    }

    /// Explicit run environment over this tree
    pub fn environment(&self) -> Environment {
        Environment::new(
            Some(self.work_dir()),
            Some(self.data_dir()),
            Some(self.results_dir()),
        )
    }

    pub fn create_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.root_path.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    pub fn write_file(&self, path: impl AsRef<Path>, content: &[u8]) -> Result<PathBuf> {
        let full_path = self.root_path.join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, content)?;
        Ok(full_path)
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let full_path = self.root_path.join(path);
        std::fs::read_to_string(&full_path)
            .with_context(|| format!("Failed to read {}", full_path.display()))
    }

    /// Mark test as failed (prevents cleanup if preserve_on_failure is set)
    pub fn mark_failed(&self) {
        *self.failed.lock() = true;
    }

    pub fn is_failed(&self) -> bool {
        *self.failed.lock()
    }

    /// Keep the directory tree after drop (for debugging)
    pub fn preserve(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.keep();
            println!("Test environment preserved at: {}", path.display());
        }
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        for (key, value) in &self.saved_env {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }

        if self.config.preserve_on_failure && self.is_failed() {
            if let Some(temp_dir) = self.temp_dir.take() {
                let path = temp_dir.keep();
                eprintln!("Test failed - environment preserved at: {}", path.display());
            }
        }
    }
}
