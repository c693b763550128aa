//! Run command - execute or resume a multi-year simulation.

use anyhow::Result;
use clap::Args;
use std::fmt;
use workforce_simulator_core_rs::{
    OptimizationLevel, Orchestrator, ResumeMode, RunSummary, SimulationConfig,
};

use crate::commands::open_store;
use crate::{Cli, LogFormat};

/// Inclusive range of simulation years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Parse `2025-2029`, or a single year such as `2025`.
pub fn parse_year_range(s: &str) -> Result<YearRange, String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<i32>()
            .map_err(|_| format!("'{part}' is not a year"))
    };
    let (start, end) = match s.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let year = parse(s)?;
            (year, year)
        }
    };
    if start > end {
        return Err(format!("year range {start}-{end} is inverted"));
    }
    Ok(YearRange { start, end })
}

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Years to simulate, e.g. `2025-2029` (overrides the config file).
    #[arg(long, value_parser = parse_year_range)]
    pub years: Option<YearRange>,

    /// Continue after the latest resumable checkpoint.
    #[arg(long, conflicts_with = "force_restart")]
    pub resume: bool,

    /// Discard existing checkpoints and start over.
    #[arg(long)]
    pub force_restart: bool,

    /// Maximum worker threads per stage.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Resource profile: low, medium or high.
    #[arg(long)]
    pub optimization: Option<OptimizationLevel>,
}

impl RunArgs {
    pub fn mode(&self) -> ResumeMode {
        if self.resume {
            ResumeMode::Resume
        } else if self.force_restart {
            ResumeMode::ForceRestart
        } else {
            ResumeMode::Fresh
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, mut config: SimulationConfig) -> SimulationConfig {
        if let Some(years) = self.years {
            config.start_year = years.start;
            config.end_year = years.end;
        }
        if let Some(threads) = self.threads {
            config.thread_count = threads;
        }
        if let Some(level) = self.optimization {
            config.optimization_level = level;
        }
        config
    }
}

/// Execute the run command.
///
/// With `--log-format json` the summary is printed as one JSON line.
///
/// # Errors
///
/// Returns the `OrchestrationError` that stopped the run.
pub fn execute(args: &RunArgs, cli: &Cli) -> Result<RunSummary> {
    let config = args.apply(cli.load_config()?);
    let store = open_store(cli)?;
    let orchestrator = Orchestrator::workforce(config, store, &cli.checkpoint_dir)?;

    let summary = orchestrator.run(args.mode())?;
    match cli.log_format {
        LogFormat::Json => println!("{}", serde_json::to_string(&summary)?),
        LogFormat::Text => print_summary(&summary),
    }
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("Run {} (config {})", summary.run_id, summary.config_hash);
    if let Some(year) = summary.resumed_from {
        println!("  resumed after checkpoint {year}");
    }
    if summary.years.is_empty() {
        println!("  nothing to do: every year through {} is checkpointed", summary.end_year);
    }
    for year in &summary.years {
        let headcount = year
            .accumulation
            .as_ref()
            .map(|a| a.current_count.to_string())
            .unwrap_or_else(|| "-".to_string());
        let rows: u64 = year.stages.iter().map(|s| s.rows_affected()).sum();
        println!(
            "  {}: headcount {}, {} rows, {} stages, {} ms",
            year.year,
            headcount,
            rows,
            year.stages.len(),
            year.duration_ms
        );
    }
    if !summary.pruned_checkpoints.is_empty() {
        println!("  pruned checkpoints: {:?}", summary.pruned_checkpoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Commands;
    use clap::Parser;
    use workforce_simulator_core_rs::OrchestrationError;

    fn run_args(args: &[&str]) -> (Cli, RunArgs) {
        let argv = || std::iter::once("workforce-sim").chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv()).unwrap();
        match Cli::try_parse_from(argv()).unwrap().command {
            Commands::Run(run) => (cli, run),
            Commands::Checkpoint(_) => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_year_range() {
        assert_eq!(parse_year_range("2025-2029"), Ok(YearRange { start: 2025, end: 2029 }));
        assert_eq!(parse_year_range("2026"), Ok(YearRange { start: 2026, end: 2026 }));
        assert!(parse_year_range("2029-2025").is_err());
        assert!(parse_year_range("twenty").is_err());
    }

    #[test]
    fn test_resume_and_force_restart_conflict() {
        assert!(Cli::try_parse_from(["workforce-sim", "run", "--resume", "--force-restart"]).is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let (_, args) = run_args(&[
            "run",
            "--years",
            "2030-2032",
            "--threads",
            "4",
            "--optimization",
            "high",
            "--resume",
        ]);
        let config = args.apply(SimulationConfig::default());

        assert_eq!(args.mode(), ResumeMode::Resume);
        assert_eq!((config.start_year, config.end_year), (2030, 2032));
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.optimization_level, OptimizationLevel::High);
    }

    #[test]
    fn test_run_then_resume_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"start_year": 2025, "end_year": 2026, "business": {"census_size": 40}}"#,
        )
        .unwrap();
        let data = dir.path().join("data");
        let checkpoints = dir.path().join("checkpoints");
        let base = [
            "--config",
            config_path.to_str().unwrap(),
            "--data-dir",
            data.to_str().unwrap(),
            "--checkpoint-dir",
            checkpoints.to_str().unwrap(),
        ];

        let mut first = base.to_vec();
        first.push("run");
        let (cli, args) = run_args(&first);
        let summary = execute(&args, &cli).unwrap();
        assert_eq!(summary.years.len(), 2);

        let err = execute(&args, &cli).unwrap_err();
        let orchestration = err.downcast_ref::<OrchestrationError>().unwrap();
        assert!(matches!(orchestration, OrchestrationError::ExistingCheckpoints { .. }));

        let mut resume = base.to_vec();
        resume.extend(["run", "--resume", "--years", "2025-2027"]);
        let (cli, args) = run_args(&resume);
        let summary = execute(&args, &cli).unwrap();
        assert_eq!(summary.resumed_from, Some(2026));
        assert_eq!(summary.years.len(), 1);
    }
}
