//! Test utilities for the SBSP workspace
//!
//! Shared helpers for the integration tests of every crate:
//!
//! - **Test Environment**: isolated `SBSP_*` directories with automatic cleanup
//! - **Fixtures**: genome names, genome lists and fake target databases
//! - **Mocks**: a scripted executor, line-writing work and a concurrency probe

pub mod environment;
pub mod fixtures;
pub mod mock;

// Re-export commonly used items
pub use environment::{TestConfig, TestEnvironment};
pub use fixtures::{genome_names, genomes, genomes_with_ancestors, write_database, write_genome_list};
pub use mock::{ConcurrencyProbe, LineWork, Script, ScriptedExecutor};

// Re-export test dependencies for convenience
pub use anyhow::{Context, Result};
pub use tempfile;

/// Initialize test logging (safe to call from every test)
///
/// Honors `SBSP_LOG`, defaulting to `warn`.
pub fn init_test_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SBSP_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Run a test with a clean environment
///
/// # Example
/// ```rust
/// use sbsp_test::with_test_env;
///
/// with_test_env(|env| {
///     assert!(env.work_dir().exists());
///     Ok(())
/// })
/// .unwrap();
/// ```
pub fn with_test_env<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&TestEnvironment) -> Result<R>,
{
    let env = TestEnvironment::new()?;
    f(&env)
}
