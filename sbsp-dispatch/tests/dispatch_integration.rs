/// Integration tests for the dispatcher
use sbsp_core::config::{DispatchConfig, PbsConfig};
use sbsp_core::{Environment, SbspResult};
use sbsp_dispatch::executor::cluster::EXIT_STATUS_FILE;
use sbsp_dispatch::*;
use sbsp_test::{genome_names, init_test_logging, LineWork, Script, ScriptedExecutor};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(root: &Path, num_jobs: usize) -> DispatchConfig {
    DispatchConfig {
        num_jobs,
        ..DispatchConfig::default()
    }
    .with_work_dir(root)
}

fn environment(root: &Path) -> Environment {
    Environment::new(
        Some(root.to_path_buf()),
        Some(root.join("data")),
        Some(root.join("results")),
    )
}

fn genome_bundle(root: &Path, n: usize) -> WorkBundle {
    WorkBundle::new(OutputTemplate::in_dir(root, "orthologs_{}").unwrap())
        .with_list("pf_q_list", genome_names(n))
}

// ===== Scripted executor =====

#[test]
fn test_all_chunks_complete_after_polling() {
    init_test_logging();
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().with_default(Script::CompleteAfter(2)));
    let wait = Arc::new(ImmediateWait::new());
    let dispatcher = Dispatcher::new(config(temp.path(), 4), environment(temp.path()), executor.clone())
        .with_wait_strategy(wait.clone());

    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 10),
            &ListSplitter::new("pf_q_list"),
            &IdentityMerger,
            Arc::new(LineWork::new()),
            &WorkArgs::new(),
        )
        .unwrap();

    assert!(result.is_success());
    assert_eq!(executor.submitted(), vec![0, 1, 2, 3]);
    // Every chunk is polled three times; the loop pauses between rounds
    assert_eq!(executor.polls(), 12);
    assert_eq!(wait.pauses(), 2);
    assert_eq!(wait.elapsed(), Duration::from_secs(4));

    let outputs = result.merged.paths();
    assert_eq!(outputs.len(), 4);
    assert_eq!(
        fs::read_to_string(&outputs[0]).unwrap(),
        format!("{}\n", genome_names(3).join(","))
    );
}

#[test]
fn test_rejected_submission_does_not_affect_siblings() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(
        ScriptedExecutor::new().with_script(1, Script::Reject("queue full".to_string())),
    );
    let dispatcher = Dispatcher::new(config(temp.path(), 3), environment(temp.path()), executor.clone())
        .with_wait_strategy(Arc::new(ImmediateWait::new()));

    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 6),
            &ListSplitter::new("pf_q_list"),
            &IdentityMerger,
            Arc::new(LineWork::new()),
            &WorkArgs::new(),
        )
        .unwrap();

    assert_eq!(executor.submitted(), vec![0, 1, 2]);
    assert_eq!(result.completed, vec![0, 2]);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].index, 1);
    assert!(result.failures[0].reason.contains("queue full"));
    assert!(!temp.path().join("orthologs_1").exists());
    assert_eq!(result.merged.paths().len(), 2);
}

#[test]
fn test_unfinished_chunks_time_out() {
    let temp = TempDir::new().unwrap();
    let mut cfg = config(temp.path(), 2);
    cfg.max_wait_secs = Some(10);
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_script(0, Script::Never)
            .with_interval(Duration::from_secs(2)),
    );
    let wait = Arc::new(ImmediateWait::new());
    let dispatcher = Dispatcher::new(cfg, environment(temp.path()), executor.clone())
        .with_wait_strategy(wait.clone());

    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 2),
            &ListSplitter::new("pf_q_list"),
            &IdentityMerger,
            Arc::new(LineWork::new()),
            &WorkArgs::new(),
        )
        .unwrap();

    assert_eq!(result.completed, vec![1]);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].reason.starts_with("timed out"));
    assert!(wait.elapsed() >= Duration::from_secs(10));
    assert_eq!(executor.abandoned(), vec![0]);
    assert!(result.into_result().is_err());
}

#[test]
fn test_failed_worker_reported_not_merged() {
    let temp = TempDir::new().unwrap();
    let executor = Arc::new(
        ScriptedExecutor::new().with_script(0, Script::FailAfter(1, "exit code 137".to_string())),
    );
    let merged_path = temp.path().join("orthologs.csv");
    let dispatcher = Dispatcher::new(config(temp.path(), 2), environment(temp.path()), executor)
        .with_wait_strategy(Arc::new(ImmediateWait::new()));

    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 4),
            &ListSplitter::new("pf_q_list"),
            &ConcatMerger::new(&merged_path),
            Arc::new(LineWork::new()),
            &WorkArgs::new(),
        )
        .unwrap();

    assert_eq!(result.failures[0].reason, "exit code 137");
    let names = genome_names(4);
    assert_eq!(
        fs::read_to_string(&merged_path).unwrap(),
        format!("{},{}\n", names[2], names[3])
    );
}

#[test]
fn test_merge_is_idempotent_across_runs() {
    let temp = TempDir::new().unwrap();
    let merged_path = temp.path().join("merged.csv");
    let dispatcher = Dispatcher::new(
        config(temp.path(), 3),
        environment(temp.path()),
        Arc::new(ScriptedExecutor::new()),
    )
    .with_wait_strategy(Arc::new(ImmediateWait::new()));
    let bundle = genome_bundle(temp.path(), 7);
    let merger = ConcatMerger::new(&merged_path);

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        dispatcher
            .run(
                &bundle,
                &ListSplitter::new("pf_q_list"),
                &merger,
                Arc::new(LineWork::new()),
                &WorkArgs::new(),
            )
            .unwrap();
        snapshots.push(fs::read(&merged_path).unwrap());
    }
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(String::from_utf8(snapshots[0].clone()).unwrap().lines().count(), 3);
}

#[test]
fn test_group_split_replicates_target() {
    let temp = TempDir::new().unwrap();
    let dispatcher = Dispatcher::new(
        config(temp.path(), 3),
        environment(temp.path()),
        Arc::new(LocalExecutor::threads(Duration::from_millis(1))),
    )
    .with_wait_strategy(Arc::new(ImmediateWait::new()));

    let bundle = genome_bundle(temp.path(), 5).with_arg("pf_t_db", "/db/archaea.faa");
    let work = Arc::new(FnWork::new(
        "check-target",
        |ctx: &WorkContext, chunk: &Chunk, args: &WorkArgs| -> anyhow::Result<()> {
            anyhow::ensure!(chunk.value("pf_t_db") == Some("/db/archaea.faa"), "target missing");
            anyhow::ensure!(ctx.workdir.ends_with(format!("compute_{}", chunk.index)));
            anyhow::ensure!(ctx.environment.pd_work == ctx.workdir);
            fs::write(&chunk.output, format!("{}\n", args["mode"]))?;
            Ok(())
        },
    ));
    let mut args = WorkArgs::new();
    args.insert("mode".to_string(), "blast".to_string());

    let result = dispatcher
        .run(
            &bundle,
            &GroupSplitter::new("pf_q_list", "pf_t_db"),
            &IdentityMerger,
            work,
            &args,
        )
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    assert_eq!(result.completed.len(), 3);
}

#[test]
fn test_dispatcher_from_config_uses_work_dir() {
    let temp = TempDir::new().unwrap();
    let mut cfg = sbsp_core::Config::default();
    cfg.dispatch.num_jobs = 2;
    cfg.dispatch.dn_compute = "pbs".to_string();
    let dispatcher = Dispatcher::from_config(&cfg, environment(temp.path()))
        .with_wait_strategy(Arc::new(ImmediateWait::new()));

    assert_eq!(dispatcher.config().head_dir(), temp.path());
    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 2),
            &ListSplitter::new("pf_q_list"),
            &ListFileMerger::new(temp.path().join("pbs-summary.txt")),
            Arc::new(LineWork::with_line("ok")),
            &WorkArgs::new(),
        )
        .unwrap();

    assert!(result.is_success());
    assert!(temp.path().join("pbs_0").join(CHUNK_MANIFEST).exists());
    assert_eq!(
        fs::read_to_string(temp.path().join("pbs-summary.txt")).unwrap().lines().count(),
        2
    );
}

// ===== Out-of-process executors =====

#[cfg(unix)]
#[test]
fn test_isolated_subprocess_chunks() {
    let temp = TempDir::new().unwrap();
    let dispatcher = Dispatcher::new(
        config(temp.path(), 2),
        environment(temp.path()),
        Arc::new(LocalExecutor::subprocesses(Duration::from_millis(5))),
    );

    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 2),
            &ListSplitter::new("pf_q_list"),
            &IdentityMerger,
            Arc::new(LineWork::with_line("it's done")),
            &WorkArgs::new(),
        )
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    assert_eq!(
        fs::read_to_string(temp.path().join("orthologs_1")).unwrap(),
        "it's done\n"
    );
    assert!(temp.path().join("compute_0").join("stdout.log").exists());
}

/// Runs each job script immediately with bash and reports it finished
#[cfg(unix)]
struct InlineBatch;

#[cfg(unix)]
impl BatchSystem for InlineBatch {
    fn submit(&self, script: &Path) -> SbspResult<String> {
        std::process::Command::new("bash").arg(script).status()?;
        Ok(format!("{}.inline", script.display()))
    }

    fn status(&self, _job_id: &str) -> ClusterState {
        ClusterState::Finished
    }
}

#[cfg(unix)]
#[test]
fn test_cluster_job_script_runs_command() {
    let temp = TempDir::new().unwrap();
    let executor = ClusterExecutor::new(InlineBatch, PbsConfig::default(), Duration::from_secs(60));
    let dispatcher = Dispatcher::new(config(temp.path(), 2), environment(temp.path()), Arc::new(executor))
        .with_wait_strategy(Arc::new(ImmediateWait::new()));

    let result = dispatcher
        .run(
            &genome_bundle(temp.path(), 3),
            &ListSplitter::new("pf_q_list"),
            &IdentityMerger,
            Arc::new(LineWork::new()),
            &WorkArgs::new(),
        )
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    let chunk_dir = temp.path().join("compute_1");
    assert_eq!(fs::read_to_string(chunk_dir.join(EXIT_STATUS_FILE)).unwrap(), "0\n");
    assert_eq!(
        fs::read_to_string(temp.path().join("orthologs_1")).unwrap(),
        format!("{}\n", genome_names(3)[2])
    );
}
