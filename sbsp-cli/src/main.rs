use clap::Parser;
use colored::*;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;
mod pipeline;

use crate::cli::{Cli, Commands};
use sbsp_core::SbspError;

fn main() {
    let cli = Cli::parse();
    let global = cli.global_options();

    // SBSP_LOG wins over -v
    let log_level = std::env::var("SBSP_LOG").unwrap_or_else(|_| global.log_level().to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => crate::cli::commands::run::run(args, &global),
        Commands::Pipeline(args) => crate::cli::commands::pipeline::run(args, &global),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

/// Exit status for an error that reached `main`
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<SbspError>() {
        Some(SbspError::Configuration(_)) => 2,
        Some(SbspError::Io(_)) => 3,
        Some(SbspError::Parse(_)) | Some(SbspError::Serialization(_)) => 4,
        Some(SbspError::Resolution(_)) => 5,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let code = |e: SbspError| exit_code(&anyhow::Error::from(e));
        assert_eq!(code(SbspError::Configuration("x".into())), 2);
        assert_eq!(code(SbspError::Io(std::io::Error::other("x"))), 3);
        assert_eq!(code(SbspError::Parse("x".into())), 4);
        assert_eq!(code(SbspError::Serialization("x".into())), 4);
        assert_eq!(code(SbspError::Resolution("x".into())), 5);
        assert_eq!(code(SbspError::WorkerFailed("x".into())), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("plain")), 1);
    }
}
