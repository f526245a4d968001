mod cli;

use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use imgfetch::config::Config;
use imgfetch::orchestrator;
use imgfetch::source::CsvTaskSource;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> ExitCode {
    let config = match args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    let source = CsvTaskSource::new(&config.source.file, &config.source.url_column);
    match orchestrator::run(&config, &source).await {
        Ok(summary) if summary.tripped => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
