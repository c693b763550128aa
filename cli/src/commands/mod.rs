//! Subcommand implementations.

pub mod checkpoint;
pub mod run;

use anyhow::Result;
use std::sync::Arc;
use workforce_simulator_core_rs::{FileStore, OrchestrationError};

use crate::Cli;

/// File-backed store rooted at `--data-dir`.
pub(crate) fn open_store(cli: &Cli) -> Result<Arc<FileStore>> {
    let store = FileStore::open(&cli.data_dir).map_err(OrchestrationError::from)?;
    Ok(Arc::new(store))
}
