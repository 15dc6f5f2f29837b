//! Batch-cluster execution (PBS)
//!
//! Each chunk becomes one batch job running the work's command form. The job
//! script records the command's exit code in `exit_status` inside the chunk
//! directory, which is the only reliable outcome signal once the scheduler
//! forgets the job.

use super::{ExecutionRequest, Executor, JobId, JobStatus};
use parking_lot::Mutex;
use sbsp_core::config::PbsConfig;
use sbsp_core::{SbspError, SbspResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

pub const JOB_SCRIPT: &str = "job.pbs";
pub const EXIT_STATUS_FILE: &str = "exit_status";

/// Consecutive unknown-state polls without an exit marker before giving up
const MAX_UNKNOWN_POLLS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Queued,
    Running,
    Finished,
    Unknown,
}

/// External batch scheduler
pub trait BatchSystem: Send + Sync {
    /// Submit a job script, returning the scheduler's job id
    fn submit(&self, script: &Path) -> SbspResult<String>;

    fn status(&self, job_id: &str) -> ClusterState;
}

/// `qsub` / `qstat` backed batch system
#[derive(Debug, Clone)]
pub struct PbsBatchSystem {
    qsub: String,
    qstat: String,
}

impl PbsBatchSystem {
    pub fn new(qsub: impl Into<String>, qstat: impl Into<String>) -> Self {
        Self {
            qsub: qsub.into(),
            qstat: qstat.into(),
        }
    }

    pub fn from_config(config: &PbsConfig) -> Self {
        Self::new(&config.qsub, &config.qstat)
    }
}

impl BatchSystem for PbsBatchSystem {
    fn submit(&self, script: &Path) -> SbspResult<String> {
        let output = Command::new(&self.qsub)
            .arg(script)
            .output()
            .map_err(|e| SbspError::Submission(format!("cannot run {}: {}", self.qsub, e)))?;

        if !output.status.success() {
            return Err(SbspError::Submission(format!(
                "{} rejected {}: {}",
                self.qsub,
                script.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(SbspError::Submission(format!(
                "{} returned no job id",
                self.qsub
            )));
        }
        Ok(id)
    }

    fn status(&self, job_id: &str) -> ClusterState {
        match Command::new(&self.qstat).arg("-f").arg(job_id).output() {
            Ok(output) if output.status.success() => {
                parse_job_state(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(_) => ClusterState::Unknown,
            Err(e) => {
                warn!("Cannot run {}: {}", self.qstat, e);
                ClusterState::Unknown
            }
        }
    }
}

/// Map the `job_state` line of `qstat -f` output
pub fn parse_job_state(qstat_output: &str) -> ClusterState {
    let state = qstat_output.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "job_state").then(|| value.trim().to_string())
    });

    match state.as_deref() {
        Some("Q") | Some("H") | Some("W") | Some("T") => ClusterState::Queued,
        Some("R") | Some("E") => ClusterState::Running,
        Some("C") | Some("F") => ClusterState::Finished,
        _ => ClusterState::Unknown,
    }
}

/// Job script running `command_line` in `workdir` and recording its exit code
pub fn render_job_script(
    config: &PbsConfig,
    job_name: &str,
    workdir: &Path,
    command_line: &str,
) -> String {
    let mut script = String::from("#!/bin/bash\n");
    script.push_str(&format!("#PBS -N {}\n", job_name));
    script.push_str(&format!("#PBS -o {}\n", workdir.join("pbs.out").display()));
    script.push_str(&format!("#PBS -e {}\n", workdir.join("pbs.err").display()));
    script.push_str(&format!("#PBS -l nodes={}:ppn={}\n", config.nodes, config.ppn));
    script.push_str(&format!("#PBS -l walltime={}\n", config.walltime));
    if let Some(queue) = &config.queue {
        script.push_str(&format!("#PBS -q {}\n", queue));
    }
    script.push('\n');
    script.push_str(&format!(
        "cd {}\n",
        crate::work::shell_quote(&workdir.to_string_lossy())
    ));
    script.push_str(command_line);
    script.push('\n');
    script.push_str(&format!("echo $? > {}\n", EXIT_STATUS_FILE));
    script
}

struct ClusterJob {
    batch_id: String,
    workdir: PathBuf,
    unknown_polls: u32,
}

/// Submits chunks to a [`BatchSystem`] and polls them
pub struct ClusterExecutor<B: BatchSystem> {
    batch: B,
    config: PbsConfig,
    interval: Duration,
    jobs: Mutex<HashMap<JobId, ClusterJob>>,
}

impl<B: BatchSystem> ClusterExecutor<B> {
    pub fn new(batch: B, config: PbsConfig, interval: Duration) -> Self {
        Self {
            batch,
            config,
            interval,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn batch_system(&self) -> &B {
        &self.batch
    }
}

/// Outcome recorded by the job script, if it got that far
fn read_exit_status(workdir: &Path) -> Option<JobStatus> {
    let content = fs::read_to_string(workdir.join(EXIT_STATUS_FILE)).ok()?;
    let status = match content.trim().parse::<i32>() {
        Ok(0) => JobStatus::Completed,
        Ok(code) => JobStatus::Failed(format!("job exited with code {}", code)),
        Err(_) => JobStatus::Failed(format!("unreadable exit status {:?}", content.trim())),
    };
    Some(status)
}

fn clear_exit_status(workdir: &Path) -> SbspResult<()> {
    let marker = workdir.join(EXIT_STATUS_FILE);
    match fs::remove_file(&marker) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SbspError::Submission(format!(
            "cannot clear stale exit status {:?}: {}",
            marker, e
        ))),
    }
}

impl<B: BatchSystem> Executor for ClusterExecutor<B> {
    fn submit(&self, request: ExecutionRequest) -> SbspResult<JobId> {
        let index = request.chunk.index;
        let spec = request.command_for("cluster")?;

        let workdir = request.context.workdir.clone();
        // A marker from an earlier attempt must not be mistaken for this one
        clear_exit_status(&workdir)?;

        let job_name = format!("sbsp_{}", index);
        let script = render_job_script(&self.config, &job_name, &workdir, &spec.to_shell_line());
        let script_path = workdir.join(JOB_SCRIPT);
        fs::write(&script_path, script)?;

        let batch_id = self.batch.submit(&script_path)?;
        debug!("Chunk {} submitted as batch job {}", index, batch_id);

        let id = JobId(batch_id.clone());
        self.jobs.lock().insert(
            id.clone(),
            ClusterJob {
                batch_id,
                workdir,
                unknown_polls: 0,
            },
        );
        Ok(id)
    }

    fn poll(&self, job: &JobId) -> JobStatus {
        let mut jobs = self.jobs.lock();
        let Some(entry) = jobs.get_mut(job) else {
            return JobStatus::Failed(format!("unknown job {}", job));
        };

        let status = match self.batch.status(&entry.batch_id) {
            ClusterState::Queued => {
                entry.unknown_polls = 0;
                JobStatus::Pending
            }
            ClusterState::Running => {
                entry.unknown_polls = 0;
                JobStatus::Running
            }
            ClusterState::Finished => read_exit_status(&entry.workdir).unwrap_or_else(|| {
                JobStatus::Failed("job finished without recording an exit status".to_string())
            }),
            ClusterState::Unknown => match read_exit_status(&entry.workdir) {
                Some(status) => status,
                None => {
                    entry.unknown_polls += 1;
                    if entry.unknown_polls >= MAX_UNKNOWN_POLLS {
                        JobStatus::Failed(format!(
                            "job state unknown for {} polls",
                            entry.unknown_polls
                        ))
                    } else {
                        JobStatus::Running
                    }
                }
            },
        };

        if status.is_terminal() {
            jobs.remove(job);
        }
        status
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn abandon(&self, job: &JobId) {
        if let Some(entry) = self.jobs.lock().remove(job) {
            warn!(
                "Abandoning batch job {}; it stays in the queue",
                entry.batch_id
            );
        }
    }

    fn name(&self) -> &str {
        "cluster"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Chunk;
    use crate::work::{CommandWork, FnWork, WorkArgs, WorkContext};
    use sbsp_core::Environment;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Replays a fixed sequence of states and optionally writes the exit marker
    struct FakeBatch {
        states: parking_lot::Mutex<VecDeque<ClusterState>>,
        reject: bool,
    }

    impl FakeBatch {
        fn new(states: Vec<ClusterState>) -> Self {
            Self {
                states: parking_lot::Mutex::new(states.into()),
                reject: false,
            }
        }
    }

    impl BatchSystem for FakeBatch {
        fn submit(&self, script: &Path) -> SbspResult<String> {
            if self.reject {
                return Err(SbspError::Submission("queue disabled".into()));
            }
            assert!(script.exists());
            Ok("4242.pbs-head".to_string())
        }

        fn status(&self, _job_id: &str) -> ClusterState {
            self.states.lock().pop_front().unwrap_or(ClusterState::Unknown)
        }
    }

    fn request(dir: &Path) -> ExecutionRequest {
        ExecutionRequest {
            chunk: Chunk {
                index: 5,
                args: BTreeMap::new(),
                output: dir.join("out_5"),
            },
            context: WorkContext {
                environment: Environment::new(
                    Some(dir.to_path_buf()),
                    Some(dir.to_path_buf()),
                    Some(dir.to_path_buf()),
                ),
                workdir: dir.to_path_buf(),
                manifest: dir.join("chunk.json"),
            },
            work: Arc::new(
                CommandWork::new("touch", vec!["touch".into(), "{output}".into()]).unwrap(),
            ),
            args: Arc::new(WorkArgs::new()),
        }
    }

    #[test]
    fn test_parse_job_state() {
        let output = "Job Id: 4242.pbs-head\n    Job_Name = sbsp_5\n    job_state = R\n";
        assert_eq!(parse_job_state(output), ClusterState::Running);
        assert_eq!(parse_job_state("    job_state = Q"), ClusterState::Queued);
        assert_eq!(parse_job_state("    job_state = C"), ClusterState::Finished);
        assert_eq!(parse_job_state("garbage"), ClusterState::Unknown);
    }

    #[test]
    fn test_job_script_resources() {
        let config = PbsConfig {
            queue: Some("batch".into()),
            ..PbsConfig::default()
        };
        let script = render_job_script(&config, "sbsp_0", Path::new("/w/compute_0"), "touch /w/o_0");

        assert!(script.starts_with("#!/bin/bash\n#PBS -N sbsp_0\n"));
        assert!(script.contains("#PBS -l nodes=1:ppn=8\n"));
        assert!(script.contains("#PBS -l walltime=07:00:00\n"));
        assert!(script.contains("#PBS -q batch\n"));
        assert!(script.contains("cd /w/compute_0\ntouch /w/o_0\necho $? > exit_status\n"));
    }

    #[test]
    fn test_finished_job_uses_exit_marker() {
        let temp = TempDir::new().unwrap();
        let batch = FakeBatch::new(vec![ClusterState::Queued, ClusterState::Running, ClusterState::Finished]);
        let executor = ClusterExecutor::new(batch, PbsConfig::default(), Duration::from_secs(60));

        let id = executor.submit(request(temp.path())).unwrap();
        assert_eq!(id.0, "4242.pbs-head");
        assert!(temp.path().join(JOB_SCRIPT).exists());

        assert_eq!(executor.poll(&id), JobStatus::Pending);
        assert_eq!(executor.poll(&id), JobStatus::Running);
        fs::write(temp.path().join(EXIT_STATUS_FILE), "1\n").unwrap();
        assert_eq!(
            executor.poll(&id),
            JobStatus::Failed("job exited with code 1".to_string())
        );
    }

    #[test]
    fn test_unknown_state_gives_up_after_three_polls() {
        let temp = TempDir::new().unwrap();
        let executor = ClusterExecutor::new(FakeBatch::new(vec![]), PbsConfig::default(), Duration::from_secs(60));
        let id = executor.submit(request(temp.path())).unwrap();

        assert_eq!(executor.poll(&id), JobStatus::Running);
        assert_eq!(executor.poll(&id), JobStatus::Running);
        assert!(matches!(executor.poll(&id), JobStatus::Failed(_)));
    }

    #[test]
    fn test_unknown_state_with_marker_completes() {
        let temp = TempDir::new().unwrap();
        let executor = ClusterExecutor::new(FakeBatch::new(vec![]), PbsConfig::default(), Duration::from_secs(60));
        let id = executor.submit(request(temp.path())).unwrap();

        fs::write(temp.path().join(EXIT_STATUS_FILE), "0\n").unwrap();
        assert_eq!(executor.poll(&id), JobStatus::Completed);
    }

    #[test]
    fn test_rejected_submission() {
        let temp = TempDir::new().unwrap();
        let batch = FakeBatch {
            states: parking_lot::Mutex::new(VecDeque::new()),
            reject: true,
        };
        let executor = ClusterExecutor::new(batch, PbsConfig::default(), Duration::from_secs(60));
        assert!(matches!(
            executor.submit(request(temp.path())),
            Err(SbspError::Submission(_))
        ));
    }

    #[test]
    fn test_inline_work_cannot_go_to_cluster() {
        let temp = TempDir::new().unwrap();
        let executor = ClusterExecutor::new(FakeBatch::new(vec![]), PbsConfig::default(), Duration::from_secs(60));
        let mut req = request(temp.path());
        req.work = Arc::new(FnWork::new("inline", |_: &WorkContext, _: &Chunk, _: &WorkArgs| Ok(())));
        assert!(executor.submit(req).is_err());
    }

    #[test]
    fn test_bad_placeholder_named_in_submission_error() {
        let temp = TempDir::new().unwrap();
        let executor = ClusterExecutor::new(FakeBatch::new(vec![]), PbsConfig::default(), Duration::from_secs(60));
        let mut req = request(temp.path());
        req.work = Arc::new(
            CommandWork::new("w", vec!["echo".into(), "{arg:missing}".into()]).unwrap(),
        );

        match executor.submit(req) {
            Err(SbspError::Submission(reason)) => {
                assert!(reason.contains("no argument missing"), "{}", reason);
                assert!(!reason.contains("no command form"));
            }
            other => panic!("expected submission error, got {:?}", other),
        }
        assert!(!temp.path().join(JOB_SCRIPT).exists());
    }

    #[test]
    fn test_stale_exit_marker_cleared_on_submit() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(EXIT_STATUS_FILE), "0\n").unwrap();
        let executor = ClusterExecutor::new(FakeBatch::new(vec![]), PbsConfig::default(), Duration::from_secs(60));

        let id = executor.submit(request(temp.path())).unwrap();
        assert!(!temp.path().join(EXIT_STATUS_FILE).exists());
        assert_eq!(executor.poll(&id), JobStatus::Running);
    }

    #[cfg(unix)]
    #[test]
    fn test_unremovable_exit_marker_rejects_submission() {
        // remove_file cannot unlink a directory
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(EXIT_STATUS_FILE)).unwrap();
        let executor = ClusterExecutor::new(FakeBatch::new(vec![]), PbsConfig::default(), Duration::from_secs(60));

        match executor.submit(request(temp.path())) {
            Err(SbspError::Submission(reason)) => assert!(reason.contains("stale exit status")),
            other => panic!("expected submission error, got {:?}", other),
        }
    }
}
