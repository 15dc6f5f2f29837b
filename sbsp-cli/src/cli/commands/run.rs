use crate::cli::commands::CommonArgs;
use crate::cli::{output, GlobalOptions};
use crate::pipeline::Pipeline;
use anyhow::Result;
use clap::Args;
use sbsp_core::{generate_utc_timestamp, GenomeInfoList, SbspError};
use sbsp_dispatch::{DatabaseResolver, GenomeScheduler, ItemStatus, ScheduleReport};
use sbsp_utils::{format_elapsed, format_fraction};
use std::path::PathBuf;

#[derive(Args)]
pub struct RunArgs {
    /// Genome list (CSV with a `name` column and an `ancestor` column)
    #[arg(long = "pf-q-list", value_name = "FILE")]
    pub pf_q_list: PathBuf,

    /// Maximum number of genomes processed at once
    #[arg(long, value_name = "N")]
    pub simultaneous_genomes: Option<usize>,

    /// Name of the run directory created inside each genome's directory
    #[arg(long = "dn-run", value_name = "NAME")]
    pub dn_run: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn run(args: RunArgs, global: &GlobalOptions) -> Result<()> {
    let (mut config, environment) = args.common.load(global)?;
    if let Some(simultaneous) = args.simultaneous_genomes {
        config.scheduler.simultaneous_genomes = simultaneous;
    }
    if let Some(dn_run) = args.dn_run {
        config.scheduler.dn_run = dn_run;
    }
    config.validate()?;

    let genomes = GenomeInfoList::from_file(&args.pf_q_list)?.into_vec();

    output::section_header("Genome run");
    output::tree(&[
        ("Genomes", genomes.len().to_string()),
        ("At a time", config.scheduler.simultaneous_genomes.to_string()),
        ("Chunks per step", config.dispatch.num_jobs.to_string()),
        ("Mode", config.dispatch.mode.to_string()),
        ("Work", environment.pd_work.display().to_string()),
        ("Started", generate_utc_timestamp()),
    ]);

    let resolver =
        DatabaseResolver::new(config.databases.clone()).with_data_dir(&environment.pd_data);
    let scheduler = GenomeScheduler::from_config(&config.scheduler, &environment.pd_work)
        .with_progress(!global.is_verbose());
    let steps = &args.common.steps;

    let report = scheduler.run_all(
        &genomes,
        |genome| resolver.resolve(genome),
        |task| {
            Pipeline::new(&config, environment.with_work_dir(&task.workdir))
                .with_steps(steps)
                .run(&task.manifest, &task.resolved)
                .map(|_| ())
        },
    );

    print_summary(&report);

    if !report.is_success() {
        return Err(SbspError::WorkerFailed(format!(
            "{} of {} genomes did not complete",
            report.outcomes.len() - report.completed(),
            report.outcomes.len()
        ))
        .into());
    }
    Ok(())
}

fn print_summary(report: &ScheduleReport) {
    output::section_header("Summary");
    for outcome in &report.outcomes {
        match &outcome.status {
            ItemStatus::Completed => output::success(&format!(
                "{} ({})",
                outcome.name,
                format_elapsed(outcome.elapsed)
            )),
            ItemStatus::Failed(reason) => {
                output::error(&format!("{} failed: {}", outcome.name, reason))
            }
            ItemStatus::Unresolved(reason) => {
                output::warning(&format!("{} skipped: {}", outcome.name, reason))
            }
        }
    }
    output::tree(&[
        ("Completed", format_fraction(report.completed(), report.outcomes.len())),
        ("Failed", report.failed().to_string()),
        ("Unresolved", report.unresolved().to_string()),
        ("Peak active", report.peak_active.to_string()),
    ]);
}
