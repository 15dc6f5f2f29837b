//! Execution mechanisms a dispatcher submits chunks to
//!
//! Executors expose a narrow submit/poll interface. Status transitions are
//! driven only by polling the underlying thread, process or batch job.

pub mod cluster;
pub mod local;

pub use cluster::{BatchSystem, ClusterExecutor, ClusterState, PbsBatchSystem};
pub use local::LocalExecutor;

use crate::bundle::Chunk;
use crate::work::{CommandSpec, WorkArgs, WorkContext, WorkFn};
use sbsp_core::{SbspError, SbspResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier an executor hands out for a submitted chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }
}

/// Everything needed to run one chunk
#[derive(Clone)]
pub struct ExecutionRequest {
    pub chunk: Chunk,
    pub context: WorkContext,
    pub work: Arc<dyn WorkFn>,
    pub args: Arc<WorkArgs>,
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("chunk", &self.chunk.index)
            .field("work", &self.work.name())
            .field("workdir", &self.context.workdir)
            .finish()
    }
}

pub trait Executor: Send + Sync {
    /// Start the chunk; an error means the mechanism rejected it
    fn submit(&self, request: ExecutionRequest) -> SbspResult<JobId>;

    /// Non-blocking status check
    fn poll(&self, job: &JobId) -> JobStatus;

    /// Pause between polls of this mechanism
    fn poll_interval(&self) -> Duration;

    /// Stop tracking a job that ran past the time bound; it is not cancelled
    fn abandon(&self, _job: &JobId) {}

    fn name(&self) -> &str;
}

impl ExecutionRequest {
    /// Out-of-process command for this chunk, required by `mechanism`
    pub fn command_for(&self, mechanism: &str) -> SbspResult<CommandSpec> {
        match self.work.command(&self.context, &self.chunk, &self.args) {
            Ok(Some(spec)) => Ok(spec),
            Ok(None) => Err(SbspError::Submission(format!(
                "work {} has no command form for {} execution",
                self.work.name(),
                mechanism
            ))),
            Err(e) => Err(SbspError::Submission(format!(
                "cannot build command for chunk {} of work {}: {:#}",
                self.chunk.index,
                self.work.name(),
                e
            ))),
        }
    }
}

/// Render a thread panic payload as a failure reason
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
