//! Ordered step pipeline over one query list
//!
//! Each configured step is one dispatch round. The first round partitions the
//! query genomes with the target database copied into every chunk; later
//! rounds partition the files the previous round produced.

use sbsp_core::config::{Config, MergeKind, SplitKind, StepConfig};
use sbsp_core::{Environment, GenomeInfoList, SbspResult};
use sbsp_dispatch::{
    CommandWork, ConcatMerger, Dispatcher, GroupSplitter, IdentityMerger, ListFileMerger,
    ListSplitter, MergedOutput, Merger, OutputTemplate, Splitter, WaitStrategy, WorkArgs,
    WorkBundle, WorkFn,
};
use sbsp_utils::{existing_files, format_elapsed, read_list_file, write_timings};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Bundle key of the query genome names
pub const QUERY_ARG: &str = "pf_q_list";
/// Bundle key of the target database, copied into every chunk
pub const TARGET_ARG: &str = "pf_t_db";
/// Bundle key of the previous step's output files
pub const DATA_ARG: &str = "pf_data";
pub const TIMINGS_FILE: &str = "time.csv";
pub const SUMMARY_FILE: &str = "pbs-summary.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum Step {
    FindOrthologs,
    ComputeFeatures,
    Filter,
    BuildMsa,
    Accuracy,
}

impl Step {
    /// Execution order
    pub const ALL: [Step; 5] = [
        Step::FindOrthologs,
        Step::ComputeFeatures,
        Step::Filter,
        Step::BuildMsa,
        Step::Accuracy,
    ];

    /// Name used for the `[steps.<name>]` table and the step directory
    pub fn name(&self) -> &'static str {
        match self {
            Step::FindOrthologs => "find-orthologs",
            Step::ComputeFeatures => "compute-features",
            Step::Filter => "filter",
            Step::BuildMsa => "build-msa",
            Step::Accuracy => "accuracy",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output files handed from one step to the next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineState {
    files: Vec<PathBuf>,
}

impl PipelineState {
    /// Keeps only the files that exist on disk
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: existing_files(files),
        }
    }

    /// State after a merge; a list-file merge hands on the files it lists
    pub fn from_merged(merged: &MergedOutput, merge: MergeKind) -> SbspResult<Self> {
        match (merge, merged) {
            (MergeKind::ListFile, MergedOutput::File(summary)) => {
                Ok(Self::new(read_list_file(summary)?))
            }
            _ => Ok(Self::new(merged.paths())),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn to_strings(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: Step,
    pub chunks: usize,
    pub outputs: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub state: PipelineState,
    pub executed: Vec<StepOutcome>,
    pub skipped: Vec<Step>,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    environment: Environment,
    steps: Vec<Step>,
    wait: Option<Arc<dyn WaitStrategy>>,
    run_id: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, environment: Environment) -> Self {
        Self {
            config,
            environment,
            steps: Step::ALL.to_vec(),
            wait: None,
            run_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Restrict to `selected`, keeping execution order; empty means every step
    pub fn with_steps(mut self, selected: &[Step]) -> Self {
        if !selected.is_empty() {
            self.steps = Step::ALL
                .into_iter()
                .filter(|s| selected.contains(s))
                .collect();
        }
        self
    }

    pub fn with_wait_strategy(mut self, wait: Arc<dyn WaitStrategy>) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the selected steps over the genomes in `query_list`
    ///
    /// A step whose chunks fail stops the pipeline with the dispatch error.
    pub fn run(&self, query_list: &Path, target_db: &Path) -> SbspResult<PipelineOutput> {
        let pd_work = &self.environment.pd_work;
        fs::create_dir_all(pd_work)?;

        let queries = GenomeInfoList::from_file(query_list)?.names();
        let target = target_db.to_string_lossy().into_owned();
        let args = self.work_args();

        let mut state: Option<PipelineState> = None;
        let mut executed = Vec::new();
        let mut skipped = Vec::new();
        let mut timings = Vec::new();

        for &step in &self.steps {
            let Some(step_config) = self
                .config
                .steps
                .get(step.name())
                .filter(|s| !s.command.is_empty())
            else {
                info!("Step {} has no command configured, skipping", step);
                skipped.push(step);
                continue;
            };

            let started = Instant::now();
            let step_env = self.environment.nested(step.name());
            fs::create_dir_all(&step_env.pd_work)?;

            let output = OutputTemplate::in_dir(
                &step_env.pd_work,
                &output_file_template(step, step_config),
            )?;
            let (bundle, splitter): (WorkBundle, Box<dyn Splitter>) = match &state {
                None => (
                    WorkBundle::new(output)
                        .with_list(QUERY_ARG, queries.clone())
                        .with_arg(TARGET_ARG, target.as_str()),
                    Box::new(GroupSplitter::new(QUERY_ARG, TARGET_ARG)),
                ),
                Some(previous) => {
                    let splitter: Box<dyn Splitter> = match step_config.split {
                        SplitKind::List => Box::new(ListSplitter::new(DATA_ARG)),
                        SplitKind::Group => Box::new(GroupSplitter::new(DATA_ARG, TARGET_ARG)),
                    };
                    (
                        WorkBundle::new(output)
                            .with_list(DATA_ARG, previous.to_strings())
                            .with_arg(TARGET_ARG, target.as_str()),
                        splitter,
                    )
                }
            };

            let merger = merger_for(step, step_config, &step_env.pd_work);
            let work: Arc<dyn WorkFn> =
                Arc::new(CommandWork::new(step.name(), step_config.command.clone())?);

            let result = self.dispatcher(step, step_env).run(
                &bundle,
                splitter.as_ref(),
                merger.as_ref(),
                work,
                &args,
            )?;
            let chunks = result.chunks;
            let merged = result.into_result()?;
            let next = PipelineState::from_merged(&merged, step_config.merge)?;

            let elapsed = started.elapsed();
            info!(
                "Step {} finished in {} ({} chunks, {} outputs)",
                step,
                format_elapsed(elapsed),
                chunks,
                next.len()
            );
            timings.push((format!("{}-{}", executed.len() + 1, step.name()), elapsed));
            executed.push(StepOutcome {
                step,
                chunks,
                outputs: next.len(),
                elapsed,
            });
            state = Some(next);
        }

        write_timings(&pd_work.join(TIMINGS_FILE), &timings)?;
        Ok(PipelineOutput {
            state: state.unwrap_or_default(),
            executed,
            skipped,
        })
    }

    /// Keyword arguments available to every command as `{arg:KEY}`
    fn work_args(&self) -> WorkArgs {
        let mut args = WorkArgs::new();
        let env = &self.environment;
        args.insert("pd_work".to_string(), env.pd_work.to_string_lossy().into_owned());
        args.insert("pd_data".to_string(), env.pd_data.to_string_lossy().into_owned());
        args.insert("pd_results".to_string(), env.pd_results.to_string_lossy().into_owned());
        args
    }

    /// Chunk directories go under the step directory, or under a
    /// run-specific subdirectory of `pd_root_compute` when one is configured
    fn dispatcher(&self, step: Step, step_env: Environment) -> Dispatcher {
        let mut dispatch = self.config.dispatch.with_work_dir(&step_env.pd_work);
        if let Some(root) = &self.config.dispatch.pd_root_compute {
            dispatch.pd_root_compute = Some(root.join(&self.run_id).join(step.name()));
        }
        debug!("Step {} computes under {}", step, dispatch.compute_root().display());

        let dispatcher = Dispatcher::with_mode(dispatch, &self.config.pbs, step_env);
        match &self.wait {
            Some(wait) => dispatcher.with_wait_strategy(Arc::clone(wait)),
            None => dispatcher,
        }
    }
}

/// `output` from the step table, with `_{}` appended when it has no placeholder
fn output_file_template(step: Step, config: &StepConfig) -> String {
    match &config.output {
        Some(output) if output.contains("{}") => output.clone(),
        Some(output) => format!("{}_{{}}", output),
        None => format!("{}_{{}}", step.name()),
    }
}

fn merger_for(step: Step, config: &StepConfig, step_dir: &Path) -> Box<dyn Merger> {
    match config.merge {
        MergeKind::Identity => Box::new(IdentityMerger),
        MergeKind::Concat => {
            let merged_name = output_file_template(step, config).replacen("{}", "all", 1);
            Box::new(ConcatMerger::new(step_dir.join(merged_name)).with_header(config.header))
        }
        MergeKind::ListFile => Box::new(ListFileMerger::new(step_dir.join(SUMMARY_FILE))),
    }
}
