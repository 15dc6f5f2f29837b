use crate::cli::commands::CommonArgs;
use crate::cli::{output, GlobalOptions};
use crate::pipeline::{Pipeline, PipelineOutput};
use anyhow::Result;
use clap::Args;
use sbsp_utils::format_elapsed;
use std::path::PathBuf;

#[derive(Args)]
pub struct PipelineArgs {
    /// Query genome list (CSV with a `name` column)
    #[arg(long = "pf-q-list", value_name = "FILE")]
    pub pf_q_list: PathBuf,

    /// Target database searched by the first step
    #[arg(long = "pf-t-db", value_name = "PATH")]
    pub pf_t_db: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn run(args: PipelineArgs, global: &GlobalOptions) -> Result<()> {
    let (config, environment) = args.common.load(global)?;
    config.validate()?;

    let work_dir = environment.pd_work.display().to_string();
    let pipeline = Pipeline::new(&config, environment).with_steps(&args.common.steps);
    let steps: Vec<&str> = pipeline.steps().iter().map(|s| s.name()).collect();

    output::section_header("Pipeline");
    output::tree(&[
        ("Queries", args.pf_q_list.display().to_string()),
        ("Target", args.pf_t_db.display().to_string()),
        ("Steps", steps.join(", ")),
        ("Mode", config.dispatch.mode.to_string()),
        ("Work", work_dir),
    ]);

    let result = pipeline.run(&args.pf_q_list, &args.pf_t_db)?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &PipelineOutput) {
    output::section_header("Summary");
    for step in &result.executed {
        output::success(&format!(
            "{}: {} chunks, {} outputs in {}",
            step.step,
            step.chunks,
            step.outputs,
            format_elapsed(step.elapsed)
        ));
    }
    for step in &result.skipped {
        output::info(&format!("{}: no command configured", step));
    }
    if result.state.is_empty() {
        output::warning("No output files");
    }
    for file in result.state.files() {
        println!("  {}", file.display());
    }
}
