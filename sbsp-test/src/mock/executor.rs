//! Scripted executor for dispatcher tests

use parking_lot::Mutex;
use sbsp_core::{SbspError, SbspResult};
use sbsp_dispatch::{ExecutionRequest, Executor, JobId, JobStatus};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// How a scripted chunk behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Report Running for `n` polls, then run the work function and report its outcome
    CompleteAfter(usize),
    /// Report Running for `n` polls, then fail without running the work
    FailAfter(usize, String),
    /// Reject the submission
    Reject(String),
    /// Never reach a terminal state
    Never,
}

struct ScriptedJob {
    request: ExecutionRequest,
    script: Script,
    polls: usize,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, ScriptedJob>,
    submitted: Vec<usize>,
    abandoned: Vec<usize>,
    polls: usize,
    next_id: usize,
}

/// Executor whose per-chunk outcomes are fixed in advance
///
/// Work functions run synchronously on the polling thread when a
/// `CompleteAfter` chunk finishes, so outputs appear exactly when the
/// chunk turns Completed.
pub struct ScriptedExecutor {
    default: Script,
    scripts: HashMap<usize, Script>,
    interval: Duration,
    state: Mutex<State>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            default: Script::CompleteAfter(0),
            scripts: HashMap::new(),
            interval: Duration::from_secs(2),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_default(mut self, script: Script) -> Self {
        self.default = script;
        self
    }

    /// Script for the chunk with index `index`
    pub fn with_script(mut self, index: usize, script: Script) -> Self {
        self.scripts.insert(index, script);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Chunk indices in submission order (rejected ones included)
    pub fn submitted(&self) -> Vec<usize> {
        self.state.lock().submitted.clone()
    }

    /// Chunk indices the dispatcher gave up on
    pub fn abandoned(&self) -> Vec<usize> {
        self.state.lock().abandoned.clone()
    }

    /// Total number of polls answered
    pub fn polls(&self) -> usize {
        self.state.lock().polls
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ScriptedExecutor {
    fn submit(&self, request: ExecutionRequest) -> SbspResult<JobId> {
        let index = request.chunk.index;
        let script = self.scripts.get(&index).unwrap_or(&self.default).clone();

        let mut state = self.state.lock();
        state.submitted.push(index);
        if let Script::Reject(reason) = &script {
            return Err(SbspError::Submission(reason.clone()));
        }

        state.next_id += 1;
        let id = JobId(format!("scripted-{}", state.next_id));
        state.jobs.insert(
            id.clone(),
            ScriptedJob {
                request,
                script,
                polls: 0,
            },
        );
        Ok(id)
    }

    fn poll(&self, job: &JobId) -> JobStatus {
        let mut state = self.state.lock();
        state.polls += 1;
        let Some(entry) = state.jobs.get_mut(job) else {
            return JobStatus::Failed(format!("unknown job {}", job));
        };
        entry.polls += 1;

        let status = match &entry.script {
            Script::CompleteAfter(n) if entry.polls > *n => {
                let request = &entry.request;
                match request.work.run(&request.context, &request.chunk, &request.args) {
                    Ok(()) => JobStatus::Completed,
                    Err(e) => JobStatus::Failed(format!("{:#}", e)),
                }
            }
            Script::FailAfter(n, reason) if entry.polls > *n => JobStatus::Failed(reason.clone()),
            _ => JobStatus::Running,
        };

        debug!("{} poll {}: {:?}", job, entry.polls, status);
        if status.is_terminal() {
            state.jobs.remove(job);
        }
        status
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn abandon(&self, job: &JobId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.jobs.remove(job) {
            state.abandoned.push(entry.request.chunk.index);
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
