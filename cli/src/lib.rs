//! # workforce-simulator-cli
//!
//! Command-line interface for the workforce simulation orchestrator.
//!
//! ## Commands
//!
//! - `workforce-sim run` - Execute (or resume) a multi-year simulation
//! - `workforce-sim checkpoint list` - List stored checkpoints
//! - `workforce-sim checkpoint status` - Show the latest checkpoint and whether it can be resumed
//! - `workforce-sim checkpoint cleanup` - Prune old checkpoints
//! - `workforce-sim checkpoint validate` - Integrity and resumability report per checkpoint
//!
//! Runs use a file-backed store under `--data-dir`, so a crashed or
//! interrupted run can be resumed by a later process.

#![forbid(unsafe_code)]
// Commands print their results
#![allow(clippy::print_stdout)]

pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use workforce_simulator_core_rs::{OrchestrationError, SimulationConfig};

/// Workforce simulator - resumable multi-year orchestration
#[derive(Debug, Parser)]
#[command(name = "workforce-sim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file (defaults apply when omitted).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the analytical store.
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory holding checkpoint records.
    #[arg(long, global = true, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Load the configuration file, or the defaults when none was given.
    ///
    /// # Errors
    ///
    /// Returns an `OrchestrationError::Config` if the file cannot be read,
    /// parsed or validated.
    pub fn load_config(&self) -> Result<SimulationConfig> {
        match &self.config {
            Some(path) => {
                let config =
                    SimulationConfig::from_json_file(path).map_err(OrchestrationError::from)?;
                tracing::debug!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            None => Ok(SimulationConfig::default()),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a multi-year simulation.
    Run(commands::run::RunArgs),
    /// Inspect and manage checkpoints.
    #[command(subcommand)]
    Checkpoint(commands::checkpoint::CheckpointCommand),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::checkpoint::CheckpointCommand;

    #[test]
    fn test_global_flags_and_defaults() {
        let cli = Cli::parse_from(["workforce-sim", "checkpoint", "list"]);
        assert_eq!(cli.data_dir, PathBuf::from("data"));
        assert_eq!(cli.checkpoint_dir, PathBuf::from("checkpoints"));
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(matches!(cli.command, Commands::Checkpoint(CheckpointCommand::List)));

        let cli = Cli::parse_from([
            "workforce-sim",
            "--log-format",
            "json",
            "checkpoint",
            "cleanup",
            "--keep",
            "3",
            "--data-dir",
            "/tmp/store",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/store"));
        assert!(matches!(
            cli.command,
            Commands::Checkpoint(CheckpointCommand::Cleanup { keep: 3 })
        ));
    }

    #[test]
    fn test_load_config_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"start_year": 2030, "end_year": 2025}"#).unwrap();
        let cli = Cli::parse_from([
            "workforce-sim",
            "--config",
            path.to_str().unwrap(),
            "checkpoint",
            "list",
        ]);

        let err = cli.load_config().unwrap_err();
        let orchestration = err.downcast_ref::<OrchestrationError>().unwrap();
        assert_eq!(orchestration.exit_code(), 2);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let cli = Cli::parse_from(["workforce-sim", "checkpoint", "status"]);
        assert_eq!(cli.load_config().unwrap(), SimulationConfig::default());
    }
}
