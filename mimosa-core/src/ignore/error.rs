use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to read ignore file '{}': {}", path.display(), source))]
    IgnoreFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid pattern '{}' on line {}: {}", pattern, line, source))]
    InvalidPattern {
        pattern: String,
        line: usize,
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
