use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Build context '{}' does not exist or is not a directory", path.display()))]
    ContextNotFound { path: PathBuf },

    #[snafu(display("Failed to read ignore file '{}': {}", path.display(), source))]
    IgnoreFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid ignore file '{}': {}", path.display(), source))]
    IgnoreFileParse {
        path: PathBuf,
        source: crate::ignore::error::Error,
    },

    #[snafu(display("Failed to walk build context '{}': {}", root.display(), source))]
    ContextWalk {
        root: PathBuf,
        source: walkdir::Error,
    },

    #[snafu(display("Failed to read file '{}': {}", path.display(), source))]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Path '{}' is not contained within context root '{}'", path.display(), root.display()))]
    PathEscapesRoot { path: PathBuf, root: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
