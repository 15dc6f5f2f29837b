#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};

pub fn sbsp_cmd() -> Command {
    Command::cargo_bin("sbsp").unwrap()
}

/// Write a configuration file into `dir`
pub fn write_config(dir: &Path, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("sbsp.toml");
    fs::write(&path, content)?;
    Ok(path)
}

/// One step table whose command copies the chunk's genome names and the
/// target database into the chunk output
pub fn copy_step(step: &str) -> String {
    format!(
        r#"
[steps.{}]
command = ["sh", "-c", "cat \"$1\" > \"$2\"; cat \"$3\" >> \"$2\"", "sh", "{{list:pf_q_list}}", "{{output}}", "{{arg:pf_t_db}}"]
"#,
        step
    )
}

/// Dispatch settings that keep tests fast
pub fn fast_dispatch(num_jobs: usize) -> String {
    format!(
        r#"
[dispatch]
num_jobs = {}
local_poll_secs = 0

[scheduler]
poll_secs = 0
"#,
        num_jobs
    )
}
