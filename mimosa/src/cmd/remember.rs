use anyhow::{Context, Result};
use clap::Parser;
use log::error;
use mimosa_core::registry::HttpRegistryClient;
use mimosa_core::{dispatch, DuctRunner};
use std::process;

/// Run a Docker build/bake command through the cache: on a hit, retag a
/// previously pushed image instead of rebuilding; on a miss, run the command
/// and record a cache marker for next time.
#[derive(Debug, Parser)]
pub(crate) struct Remember {
    /// Look up and report what would happen without mutating the registry
    /// or running the build.
    #[clap(long)]
    dry_run: bool,

    /// The Docker command to run, e.g. `build -t repo:tag .` or
    /// `buildx bake frontend`. Pass this after `--`.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Remember {
    pub(crate) async fn run(&self) -> Result<()> {
        let cwd = std::env::current_dir().context("failed to determine working directory")?;
        let registry = HttpRegistryClient::new();
        let runner = DuctRunner;

        match dispatch(&registry, &runner, &self.command, &cwd, self.dry_run).await {
            Ok(outcome) => process::exit(outcome.exit_code),
            Err(e) => {
                error!("{e}");
                process::exit(e.exit_code());
            }
        }
    }
}
