use snafu::Snafu;

/// Every pre-build variant carries the exit code the fallback execution of
/// the user's original command produced, since the spec requires that exit
/// code to reach the caller even though the cache path failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to parse command, ran plain fallback (exit {}): {}", exit_code, source))]
    Parse {
        source: crate::parse::error::Error,
        exit_code: i32,
    },

    #[snafu(display("Cache lookup failed, ran plain fallback (exit {}): {}", exit_code, source))]
    Lookup {
        source: crate::registry::cache::CacheError,
        exit_code: i32,
    },

    #[snafu(display("Retag failed, ran plain fallback (exit {}): {}", exit_code, source))]
    Retag {
        source: crate::registry::cache::CacheError,
        exit_code: i32,
    },

    #[snafu(display("Build command exited with status {}", code))]
    RunnerFailed { code: i32 },

    #[snafu(display("Failed to run build command: {}", source))]
    RunnerError { source: std::io::Error },
}

impl Error {
    /// The exit code the host process should return for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse { exit_code, .. }
            | Error::Lookup { exit_code, .. }
            | Error::Retag { exit_code, .. } => *exit_code,
            Error::RunnerFailed { code } => *code,
            Error::RunnerError { .. } => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
