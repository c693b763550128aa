//! Checkpoint commands - list, status, cleanup and validate.

use anyhow::{bail, Result};
use clap::Subcommand;
use std::sync::Arc;
use workforce_simulator_core_rs::checkpoint::{CheckpointStatus, CheckpointValidation};
use workforce_simulator_core_rs::{CheckpointManager, RecoveryOrchestrator};

use crate::commands::open_store;
use crate::Cli;

/// Checkpoint subcommands.
#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    /// List stored checkpoints.
    List,
    /// Show the latest checkpoint and whether the current config can resume from it.
    Status,
    /// Remove all but the newest checkpoints.
    Cleanup {
        /// Number of newest checkpoints to keep.
        #[arg(long, default_value_t = 1)]
        keep: usize,
    },
    /// Check integrity and resumability of every checkpoint.
    Validate,
}

fn manager(cli: &Cli) -> Result<Arc<CheckpointManager>> {
    let store = open_store(cli)?;
    Ok(Arc::new(CheckpointManager::new(&cli.checkpoint_dir, store)?))
}

/// Execute a checkpoint subcommand.
///
/// # Errors
///
/// Returns an error if the checkpoint directory cannot be read, or if
/// `validate` finds a checkpoint that cannot be resumed.
pub fn execute(command: &CheckpointCommand, cli: &Cli) -> Result<()> {
    let checkpoints = manager(cli)?;
    match command {
        CheckpointCommand::List => list(&checkpoints),
        CheckpointCommand::Status => status(&checkpoints, cli),
        CheckpointCommand::Cleanup { keep } => {
            let removed = checkpoints.cleanup(*keep)?;
            if removed.is_empty() {
                println!("Nothing to remove");
            } else {
                println!("Removed checkpoints for years {removed:?}");
            }
            Ok(())
        }
        CheckpointCommand::Validate => {
            let report = validate(&checkpoints, cli)?;
            let failed = report
                .iter()
                .filter(|v| v.status != CheckpointStatus::Resumable)
                .count();
            if failed > 0 {
                bail!("{failed} of {} checkpoint(s) cannot be resumed", report.len());
            }
            Ok(())
        }
    }
}

fn list(checkpoints: &CheckpointManager) -> Result<()> {
    let infos = checkpoints.list_checkpoints()?;
    if infos.is_empty() {
        println!("No checkpoints in {}", checkpoints.dir().display());
        return Ok(());
    }
    println!("Checkpoints in {}:", checkpoints.dir().display());
    for info in infos {
        println!("  {}  {:>8} bytes  {}", info.year, info.size_bytes, info.path.display());
    }
    Ok(())
}

fn status(checkpoints: &Arc<CheckpointManager>, cli: &Cli) -> Result<()> {
    let Some(latest) = checkpoints.latest_pointer()? else {
        println!("No checkpoints; the next run starts fresh");
        return Ok(());
    };
    let config_hash = cli.load_config()?.config_hash()?;
    let recovery = RecoveryOrchestrator::new(Arc::clone(checkpoints));

    println!("Latest checkpoint: year {} (run {})", latest.year, latest.run_id);
    println!("  written at {}", latest.written_at);
    match recovery.check_resumable(latest.year, &config_hash) {
        Ok(checkpoint) => println!(
            "  resumable at stage {}; next year {}",
            checkpoint.stage,
            checkpoint.year + 1
        ),
        Err(e) => {
            println!("  not resumable: {e}");
            println!("  hint: {}", e.remediation());
        }
    }
    Ok(())
}

fn validate(checkpoints: &Arc<CheckpointManager>, cli: &Cli) -> Result<Vec<CheckpointValidation>> {
    let config_hash = cli.load_config()?.config_hash()?;
    let report = RecoveryOrchestrator::new(Arc::clone(checkpoints)).validate_all(&config_hash)?;
    if report.is_empty() {
        println!("No checkpoints to validate");
    }
    for entry in &report {
        println!("  {}: {}", entry.year, entry.status);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::run;
    use crate::Commands;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("workforce-sim").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cleanup_and_validate_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"start_year": 2025, "end_year": 2027, "checkpoint_retention": 3,
                "business": {"census_size": 30}}"#,
        )
        .unwrap();
        let data = dir.path().join("data");
        let checkpoint_dir = dir.path().join("checkpoints");
        let base = vec![
            "--config",
            config_path.to_str().unwrap(),
            "--data-dir",
            data.to_str().unwrap(),
            "--checkpoint-dir",
            checkpoint_dir.to_str().unwrap(),
        ];

        let mut run_argv = base.clone();
        run_argv.push("run");
        let cli = parse(&run_argv);
        let Commands::Run(args) = &cli.command else {
            panic!("expected run");
        };
        run::execute(args, &cli).unwrap();

        let cli = parse(&base.iter().copied().chain(["checkpoint", "validate"]).collect::<Vec<_>>());
        let checkpoints = manager(&cli).unwrap();
        let report = validate(&checkpoints, &cli).unwrap();
        assert_eq!(report.len(), 3);
        assert!(report.iter().all(|v| v.status == CheckpointStatus::Resumable));
        assert!(execute(&CheckpointCommand::Validate, &cli).is_ok());

        execute(&CheckpointCommand::Cleanup { keep: 1 }, &cli).unwrap();
        assert_eq!(checkpoints.checkpoint_years().unwrap(), vec![2027]);
        assert!(execute(&CheckpointCommand::Status, &cli).is_ok());
        assert!(execute(&CheckpointCommand::List, &cli).is_ok());
    }

    #[test]
    fn test_validate_fails_on_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let checkpoint_dir = dir.path().join("checkpoints");
        let cli = parse(&[
            "--data-dir",
            data.to_str().unwrap(),
            "--checkpoint-dir",
            checkpoint_dir.to_str().unwrap(),
            "checkpoint",
            "validate",
        ]);
        let checkpoints = manager(&cli).unwrap();
        checkpoints
            .save_checkpoint(2025, workforce_simulator_core_rs::WorkflowStage::Reporting, "x")
            .unwrap();
        std::fs::write(checkpoints.checkpoint_path(2025), b"garbage").unwrap();

        assert!(execute(&CheckpointCommand::Validate, &cli).is_err());
    }
}
