//! Split, submit, wait, merge

use crate::bundle::{ArgValue, Chunk, WorkBundle};
use crate::executor::{
    ClusterExecutor, ExecutionRequest, Executor, JobId, JobStatus, LocalExecutor, PbsBatchSystem,
};
use crate::merge::{MergedOutput, Merger};
use crate::partition::Splitter;
use crate::wait::{SleepWait, WaitStrategy};
use crate::work::{list_file_path, WorkArgs, WorkContext, WorkFn};
use sbsp_core::config::{Config, DispatchConfig, PbsConfig};
use sbsp_core::{Environment, ExecutionMode, SbspError, SbspResult};
use sbsp_utils::{write_json_manifest, write_list_file, WorkLayout};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CHUNK_MANIFEST: &str = "chunk.json";

/// A chunk that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub output: PathBuf,
    pub reason: String,
}

/// Outcome of one dispatch round
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    /// Number of chunks the splitter produced
    pub chunks: usize,
    pub merged: MergedOutput,
    /// Indices of completed chunks, ascending
    pub completed: Vec<usize>,
    pub failures: Vec<ChunkFailure>,
}

impl DispatchResult {
    pub fn empty() -> Self {
        Self {
            chunks: 0,
            merged: MergedOutput::empty(),
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The merged output, or an error naming every failed chunk
    pub fn into_result(self) -> SbspResult<MergedOutput> {
        if self.failures.is_empty() {
            return Ok(self.merged);
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("chunk {}: {}", f.index, f.reason))
            .collect();
        Err(SbspError::WorkerFailed(format!(
            "{} of {} chunks failed ({})",
            self.failures.len(),
            self.chunks,
            details.join("; ")
        )))
    }
}

/// Submitted chunk and its last polled status
#[derive(Debug)]
struct JobHandle {
    index: usize,
    output: PathBuf,
    job: Option<JobId>,
    status: JobStatus,
}

pub struct Dispatcher {
    config: DispatchConfig,
    environment: Environment,
    executor: Arc<dyn Executor>,
    wait: Arc<dyn WaitStrategy>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, environment: Environment, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            environment,
            executor,
            wait: Arc::new(SleepWait::new()),
        }
    }

    /// Dispatcher rooted at the environment's working directory, with the
    /// executor selected by `dispatch.mode`
    pub fn from_config(config: &Config, environment: Environment) -> Self {
        let dispatch = config.dispatch.with_work_dir(&environment.pd_work);
        Self::with_mode(dispatch, &config.pbs, environment)
    }

    /// Executor selected by `dispatch.mode`, with `dispatch` used as given
    pub fn with_mode(dispatch: DispatchConfig, pbs: &PbsConfig, environment: Environment) -> Self {
        let executor: Arc<dyn Executor> = match dispatch.mode {
            ExecutionMode::Local | ExecutionMode::Isolated => Arc::new(LocalExecutor::for_mode(
                dispatch.mode,
                dispatch.local_poll_interval(),
            )),
            ExecutionMode::Cluster => Arc::new(ClusterExecutor::new(
                PbsBatchSystem::from_config(pbs),
                pbs.clone(),
                dispatch.cluster_poll_interval(),
            )),
        };
        Self::new(dispatch, environment, executor)
    }

    pub fn with_wait_strategy(mut self, wait: Arc<dyn WaitStrategy>) -> Self {
        self.wait = wait;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Split `bundle`, run every chunk through the executor, and merge the
    /// completed outputs
    ///
    /// Chunk failures are reported in the result. Only working-directory
    /// setup and merge IO are hard errors.
    pub fn run(
        &self,
        bundle: &WorkBundle,
        splitter: &dyn Splitter,
        merger: &dyn Merger,
        work: Arc<dyn WorkFn>,
        args: &WorkArgs,
    ) -> SbspResult<DispatchResult> {
        let chunks = splitter.split(bundle, self.config.num_jobs);
        if chunks.is_empty() {
            info!("No chunks to dispatch for {}", work.name());
            return Ok(DispatchResult::empty());
        }

        info!(
            "Dispatching {} as {} chunks ({} split, {} executor)",
            work.name(),
            chunks.len(),
            splitter.name(),
            self.executor.name()
        );

        let layout = WorkLayout::new(self.config.compute_root());
        let args = Arc::new(args.clone());
        let mut contexts = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            contexts.push(self.prepare_chunk(&layout, chunk)?);
        }

        let mut handles: Vec<JobHandle> = chunks
            .iter()
            .zip(contexts)
            .map(|(chunk, context)| self.submit(chunk, context, &work, &args))
            .collect();

        self.wait_for_all(&mut handles);

        let mut completed = Vec::new();
        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        for handle in handles {
            match handle.status {
                JobStatus::Completed => {
                    completed.push(handle.index);
                    outputs.push(handle.output);
                }
                JobStatus::Failed(reason) => failures.push(ChunkFailure {
                    index: handle.index,
                    output: handle.output,
                    reason,
                }),
                JobStatus::Pending | JobStatus::Running => failures.push(ChunkFailure {
                    index: handle.index,
                    output: handle.output,
                    reason: "did not finish".to_string(),
                }),
            }
        }

        let merged = merger.merge(&outputs)?;
        info!(
            "{}: {}/{} chunks completed, merged with {}",
            work.name(),
            completed.len(),
            chunks.len(),
            merger.name()
        );

        Ok(DispatchResult {
            chunks: chunks.len(),
            merged,
            completed,
            failures,
        })
    }

    /// Create `<root>/<dn_compute>_<i>/` with the chunk manifest and list files
    fn prepare_chunk(&self, layout: &WorkLayout, chunk: &Chunk) -> SbspResult<WorkContext> {
        let workdir = layout
            .create_unit_dir(&self.config.dn_compute, chunk.index)
            .map_err(|e| SbspError::Path(format!("{:#}", e)))?;
        let manifest = write_json_manifest(&workdir, CHUNK_MANIFEST, chunk)?;

        for (key, value) in &chunk.args {
            if let ArgValue::List(values) = value {
                write_list_file(&list_file_path(&workdir, key), values)?;
            }
        }

        Ok(WorkContext {
            environment: self.environment.with_work_dir(&workdir),
            workdir,
            manifest,
        })
    }

    fn submit(
        &self,
        chunk: &Chunk,
        context: WorkContext,
        work: &Arc<dyn WorkFn>,
        args: &Arc<WorkArgs>,
    ) -> JobHandle {
        let request = ExecutionRequest {
            chunk: chunk.clone(),
            context,
            work: Arc::clone(work),
            args: Arc::clone(args),
        };

        match self.executor.submit(request) {
            Ok(job) => {
                info!("Chunk {} submitted as {}", chunk.index, job);
                JobHandle {
                    index: chunk.index,
                    output: chunk.output.clone(),
                    job: Some(job),
                    status: JobStatus::Pending,
                }
            }
            Err(e) => {
                warn!("Chunk {} rejected: {}", chunk.index, e);
                JobHandle {
                    index: chunk.index,
                    output: chunk.output.clone(),
                    job: None,
                    status: JobStatus::Failed(e.to_string()),
                }
            }
        }
    }

    /// Poll until every handle is terminal or `max_wait` has elapsed
    fn wait_for_all(&self, handles: &mut [JobHandle]) {
        let started = self.wait.elapsed();
        let interval = self.executor.poll_interval();

        loop {
            for handle in handles.iter_mut().filter(|h| !h.status.is_terminal()) {
                let Some(job) = &handle.job else { continue };
                let status = self.executor.poll(job);
                match &status {
                    JobStatus::Completed => info!("Chunk {} completed", handle.index),
                    JobStatus::Failed(reason) => warn!("Chunk {} failed: {}", handle.index, reason),
                    _ => debug!("Chunk {} is {:?}", handle.index, status),
                }
                handle.status = status;
            }

            let remaining = handles.iter().filter(|h| !h.status.is_terminal()).count();
            if remaining == 0 {
                return;
            }

            if let Some(max_wait) = self.config.max_wait() {
                let waited = self.wait.elapsed().saturating_sub(started);
                if waited >= max_wait {
                    warn!(
                        "Giving up on {} chunks after {:?}",
                        remaining, waited
                    );
                    for handle in handles.iter_mut().filter(|h| !h.status.is_terminal()) {
                        if let Some(job) = &handle.job {
                            self.executor.abandon(job);
                        }
                        handle.status =
                            JobStatus::Failed(format!("timed out after {}s", waited.as_secs()));
                    }
                    return;
                }
            }

            debug!("{} chunks still running", remaining);
            self.wait.pause(interval);
        }
    }
}
