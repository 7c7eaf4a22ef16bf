//! cybozu2gcal CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use cybozu2gcal_core::{TracingConfig, init_tracing};

use cybozu2gcal_cli::cli::{Cli, Command};
use cybozu2gcal_cli::commands;
use cybozu2gcal_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let tracing = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    init_tracing(tracing.with_format(cli.log_format))?;

    let config_dir = cli.config_dir();
    match cli.command {
        Command::Sync(ref args) => commands::sync::run(args, config_dir).await,
        Command::Auth(ref args) => commands::auth::google(args, &config_dir).await,
    }
}
