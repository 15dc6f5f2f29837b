/// Local execution: one named thread or one child process per chunk
use super::{panic_message, ExecutionRequest, Executor, JobId, JobStatus};
use crate::work::{STDERR_LOG, STDOUT_LOG};
use parking_lot::Mutex;
use sbsp_core::{ExecutionMode, SbspError, SbspResult};
use std::collections::HashMap;
use std::fs::File;
use std::process::{Child, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

enum LocalJob {
    Thread(JoinHandle<anyhow::Result<()>>),
    Process(Child),
}

pub struct LocalExecutor {
    isolated: bool,
    interval: Duration,
    jobs: Mutex<HashMap<JobId, LocalJob>>,
}

impl LocalExecutor {
    /// Run each chunk's work function on its own thread
    pub fn threads(interval: Duration) -> Self {
        Self {
            isolated: false,
            interval,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Run each chunk's command form as a child process
    pub fn subprocesses(interval: Duration) -> Self {
        Self {
            isolated: true,
            ..Self::threads(interval)
        }
    }

    pub fn for_mode(mode: ExecutionMode, interval: Duration) -> Self {
        match mode {
            ExecutionMode::Isolated => Self::subprocesses(interval),
            _ => Self::threads(interval),
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    fn spawn_thread(&self, request: ExecutionRequest) -> SbspResult<LocalJob> {
        let index = request.chunk.index;
        let handle = std::thread::Builder::new()
            .name(format!("sbsp-chunk-{}", index))
            .spawn(move || {
                request
                    .work
                    .run(&request.context, &request.chunk, &request.args)
            })
            .map_err(|e| SbspError::Submission(format!("cannot start thread for chunk {}: {}", index, e)))?;
        Ok(LocalJob::Thread(handle))
    }

    fn spawn_process(&self, request: &ExecutionRequest) -> SbspResult<LocalJob> {
        let index = request.chunk.index;
        let spec = request.command_for("isolated")?;

        let workdir = &request.context.workdir;
        let stdout = File::create(workdir.join(STDOUT_LOG))?;
        let stderr = File::create(workdir.join(STDERR_LOG))?;

        let child = spec
            .to_command()
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| {
                SbspError::Submission(format!("cannot start {} for chunk {}: {}", spec.program, index, e))
            })?;
        debug!("Chunk {} running as pid {}", index, child.id());
        Ok(LocalJob::Process(child))
    }
}

impl Executor for LocalExecutor {
    fn submit(&self, request: ExecutionRequest) -> SbspResult<JobId> {
        let id = JobId(format!("local-{}-{}", request.chunk.index, uuid::Uuid::new_v4().simple()));
        let job = if self.isolated {
            self.spawn_process(&request)?
        } else {
            self.spawn_thread(request)?
        };
        self.jobs.lock().insert(id.clone(), job);
        Ok(id)
    }

    fn poll(&self, job: &JobId) -> JobStatus {
        let mut jobs = self.jobs.lock();
        let finished = match jobs.get_mut(job) {
            None => return JobStatus::Failed(format!("unknown job {}", job)),
            Some(LocalJob::Thread(handle)) => Ok(handle.is_finished()),
            Some(LocalJob::Process(child)) => child.try_wait().map(|status| status.is_some()),
        };
        match finished {
            Ok(false) => return JobStatus::Running,
            Ok(true) => {}
            Err(e) => {
                jobs.remove(job);
                return JobStatus::Failed(format!("cannot query process: {}", e));
            }
        }

        // Terminal: the job leaves the table once its outcome is read
        match jobs.remove(job) {
            Some(LocalJob::Thread(handle)) => match handle.join() {
                Ok(Ok(())) => JobStatus::Completed,
                Ok(Err(e)) => JobStatus::Failed(format!("{:#}", e)),
                Err(payload) => JobStatus::Failed(panic_message(payload)),
            },
            Some(LocalJob::Process(mut child)) => match child.wait() {
                Ok(status) if status.success() => JobStatus::Completed,
                Ok(status) => JobStatus::Failed(format!("process exited with {}", status)),
                Err(e) => JobStatus::Failed(format!("cannot query process: {}", e)),
            },
            None => JobStatus::Failed(format!("unknown job {}", job)),
        }
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn abandon(&self, job: &JobId) {
        match self.jobs.lock().remove(job) {
            Some(LocalJob::Thread(_)) => {
                warn!("Abandoning {}; its thread keeps running detached", job);
            }
            Some(LocalJob::Process(mut child)) => {
                let pid = child.id();
                warn!("Abandoning {} (pid {}); the process is left running", job, pid);
                // Reap in the background so the exited child does not linger as a zombie
                let reaper = std::thread::Builder::new()
                    .name(format!("sbsp-reap-{}", pid))
                    .spawn(move || {
                        let _ = child.wait();
                    });
                if let Err(e) = reaper {
                    warn!("Cannot start reaper for pid {}: {}", pid, e);
                }
            }
            None => debug!("Abandon of unknown job {}", job),
        }
    }

    fn name(&self) -> &str {
        if self.isolated {
            "local-subprocess"
        } else {
            "local-thread"
        }
    }
}
