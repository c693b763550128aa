//! Workforce simulator CLI - entry point for the `workforce-sim` binary.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workforce_simulator_cli::commands::{checkpoint, run};
use workforce_simulator_cli::{Cli, Commands, LogFormat};
use workforce_simulator_core_rs::OrchestrationError;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match &cli.command {
        Commands::Run(args) => run::execute(args, &cli).map(|_| ()),
        Commands::Checkpoint(command) => checkpoint::execute(command, &cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<OrchestrationError>() {
            Some(orchestration) => {
                eprintln!("error: {orchestration}");
                eprintln!("hint: {}", orchestration.remediation());
                ExitCode::from(orchestration.exit_code())
            }
            None => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}
