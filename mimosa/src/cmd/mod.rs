mod cache_inspect;
mod forget;
mod remember;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// A build-caching wrapper for `docker build`, `docker buildx build`, and
/// `docker buildx bake`.
#[derive(Debug, Parser)]
#[clap(about, long_about = None, version)]
pub(crate) struct Args {
    /// Set the logging level. One of [off|error|warn|info|debug|trace]. Defaults to info. You can
    /// also leave this unset and use the RUST_LOG env variable. See
    /// https://github.com/rust-cli/env_logger/
    #[clap(long = "log-level")]
    pub(crate) log_level: Option<LevelFilter>,

    #[clap(subcommand)]
    pub(crate) subcommand: Subcommand,
}

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    /// Run a Docker command through the cache, retagging a previous push
    /// when the command and build context are unchanged.
    Remember(remember::Remember),

    /// Delete a cache marker for a given tag, forcing the next matching
    /// command to rebuild.
    Forget(forget::Forget),

    /// Check whether a cache marker exists for a given tag without running
    /// anything.
    CacheInspect(cache_inspect::CacheInspect),
}

/// Entrypoint for the `mimosa` command line program.
pub(super) async fn run(args: Args) -> Result<()> {
    match args.subcommand {
        Subcommand::Remember(remember) => remember.run().await,
        Subcommand::Forget(forget) => forget.run().await,
        Subcommand::CacheInspect(cache_inspect) => cache_inspect.run().await,
    }
}

/// use `level` if present, or else use `RUST_LOG` if present, or else use a default.
pub(super) fn init_logger(level: Option<LevelFilter>) {
    match (std::env::var(env_logger::DEFAULT_FILTER_ENV).ok(), level) {
        (Some(_), None) => {
            // RUST_LOG exists and level does not; use the environment variable.
            Builder::from_default_env().init();
        }
        _ => {
            // use provided log level or default for this crate only.
            Builder::new()
                .filter(
                    Some(env!("CARGO_CRATE_NAME")),
                    level.unwrap_or(DEFAULT_LEVEL_FILTER),
                )
                .init();
        }
    }
}
